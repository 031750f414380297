//! # Records
//!
//! Rows as the hosted backend stores them. Field names on the wire keep the
//! backend's column names (`idMeal`, `strMeal`, ...); the Rust side uses plain names.
//!
//! ## Tables
//! - `meals`: recipes, keyed by `idMeal` (a string holding a decimal integer)
//! - `ingredients`: catalog, keyed by `idIngredient`, image path in `strStorageimg`
//! - `shared_recipes`: cooking sessions, joined to `meals` and `shared_recipes_events`
//! - `shared_recipes_events`: one row per completed step per user, append only
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub const MEALS: &str = "meals";
pub const MEAL_ID: &str = "idMeal";

pub const INGREDIENTS: &str = "ingredients";
pub const INGREDIENT_ID: &str = "idIngredient";

pub const SHARED_RECIPES: &str = "shared_recipes";
pub const SHARED_RECIPE_EVENTS: &str = "shared_recipes_events";
pub const SHARED_RECIPE_KEY: &str = "shared_recipe";

pub const DEFAULT_ID_FIELD: &str = "id";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    #[serde(rename = "idMeal", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "strMeal", default, deserialize_with = "null_as_default")]
    pub title: String,

    #[serde(rename = "strInstructions", default, deserialize_with = "null_as_default")]
    pub instructions: String,

    #[serde(rename = "idIngredients", default, deserialize_with = "null_as_default")]
    pub ingredient_ids: Vec<Option<String>>,

    /// Remaining columns, carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Reads a `null` column as the field's default; `default` alone only covers a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Recipe {
    /// Ingredient references with the unfilled slots dropped, order kept.
    pub fn filled_ingredient_ids(&self) -> impl Iterator<Item = &str> {
        self.ingredient_ids.iter().filter_map(|id| id.as_deref())
    }
}

/// Downloaded image bytes, held only in memory for display.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageHandle {
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

impl ImageHandle {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    #[serde(rename = "idIngredient")]
    pub id: String,

    #[serde(rename = "strIngredient", default, deserialize_with = "null_as_default")]
    pub name: String,

    #[serde(rename = "strDescription", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(rename = "strStorageimg", default, skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<String>,

    #[serde(skip)]
    pub image: Option<ImageHandle>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedRecipe {
    pub id: i64,

    #[serde(rename = "idMeal", default)]
    pub recipe_id: Option<String>,

    #[serde(rename = "meals", default)]
    pub recipe: Option<Recipe>,

    #[serde(rename = "shared_recipes_events", default)]
    pub events: Vec<SharedRecipeEvent>,
}

impl SharedRecipe {
    /// Highest step `user` has logged in this session.
    pub fn latest_step(&self, user: &str) -> Option<i64> {
        self.events
            .iter()
            .filter(|event| event.user == user)
            .map(|event| event.step)
            .max()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedRecipeEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    pub shared_recipe: i64,
    pub step: i64,
    pub user: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl SharedRecipeEvent {
    pub fn new(shared_recipe: i64, step: i64, user: impl Into<String>) -> Self {
        Self {
            id: None,
            shared_recipe,
            step,
            user: user.into(),
            created_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,

    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,

    #[serde(default)]
    pub refresh_token: Option<String>,

    #[serde(default)]
    pub user: Option<User>,
}

/// What sign-in and sign-up hand back: a user, and a session when one was opened.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthData {
    pub user: Option<User>,
    pub session: Option<AuthSession>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_recipe_wire_names() {
        let recipe: Recipe = serde_json::from_value(json!({
            "idMeal": "52772",
            "strMeal": "Teriyaki Chicken Casserole",
            "strInstructions": "Preheat oven to 350",
            "idIngredients": [null, "3", null, "7"],
            "strArea": "Japanese"
        }))
        .unwrap();

        assert_eq!(recipe.id.as_deref(), Some("52772"));
        assert_eq!(recipe.filled_ingredient_ids().collect::<Vec<_>>(), ["3", "7"]);
        assert_eq!(recipe.extra.get("strArea"), Some(&json!("Japanese")));

        let value = serde_json::to_value(&recipe).unwrap();
        assert_eq!(value["strArea"], "Japanese");
        assert_eq!(value["idIngredients"], json!([null, "3", null, "7"]));
    }

    #[test]
    fn test_recipe_null_columns() {
        let recipe: Recipe = serde_json::from_value(json!({
            "idMeal": "9",
            "strMeal": null,
            "strInstructions": null,
            "idIngredients": null
        }))
        .unwrap();

        assert_eq!(recipe.id.as_deref(), Some("9"));
        assert!(recipe.title.is_empty());
        assert!(recipe.instructions.is_empty());
        assert!(recipe.ingredient_ids.is_empty());
        assert!(recipe.extra.is_empty());

        let ingredient: Ingredient =
            serde_json::from_value(json!({ "idIngredient": "1", "strIngredient": null })).unwrap();
        assert!(ingredient.name.is_empty());
    }

    #[test]
    fn test_recipe_without_id_omits_key() {
        let recipe = Recipe {
            title: "Soup".to_string(),
            instructions: "Boil".to_string(),
            ..Default::default()
        };

        let value = serde_json::to_value(&recipe).unwrap();
        assert!(value.get("idMeal").is_none());
    }

    #[test]
    fn test_ingredient_image_not_serialized() {
        let ingredient = Ingredient {
            id: "1".to_string(),
            name: "Chicken".to_string(),
            storage_path: Some("ingredients/chicken.png".to_string()),
            image: Some(ImageHandle {
                bytes: Bytes::from_static(b"png"),
                content_type: None,
            }),
            ..Default::default()
        };

        let value = serde_json::to_value(&ingredient).unwrap();
        assert_eq!(value, json!({
            "idIngredient": "1",
            "strIngredient": "Chicken",
            "strStorageimg": "ingredients/chicken.png"
        }));
    }

    #[test]
    fn test_latest_step() {
        let shared: SharedRecipe = serde_json::from_value(json!({
            "id": 4,
            "idMeal": "1",
            "meals": { "idMeal": "1", "strMeal": "Soup", "strInstructions": "Boil" },
            "shared_recipes_events": [
                { "id": 1, "shared_recipe": 4, "step": 1, "user": "ana" },
                { "id": 2, "shared_recipe": 4, "step": 3, "user": "ana" },
                { "id": 3, "shared_recipe": 4, "step": 2, "user": "bo" }
            ]
        }))
        .unwrap();

        assert_eq!(shared.latest_step("ana"), Some(3));
        assert_eq!(shared.latest_step("bo"), Some(2));
        assert_eq!(shared.latest_step("cy"), None);
        assert_eq!(shared.recipe.unwrap().title, "Soup");
    }
}
