use std::sync::Arc;

use gateway::{
    models::{Ingredient, Recipe},
    Backend, Gateway,
};
use tracing::{debug, error, info};

use crate::{
    error::EditorError,
    form::{Control, ListRule, RecipeForm},
    navigator::{Navigator, LANDING_ROUTE},
};

#[derive(Debug, Clone)]
pub struct EditorOptions {
    /// Reject submissions with no ingredient slots at all.
    pub require_ingredient: bool,
    pub landing_route: String,
}

impl Default for EditorOptions {
    fn default() -> Self {
        Self {
            require_ingredient: false,
            landing_route: LANDING_ROUTE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// The form did not validate; nothing was sent.
    Invalid,
    Created(Recipe),
    Updated(Recipe),
}

/// Create/edit workflow for one recipe.
///
/// With a recipe id the editor loads that recipe and saves by updating it;
/// without one it saves by inserting under the next free id.
pub struct RecipeEditor<B, N> {
    gateway: Arc<Gateway<B>>,
    navigator: N,
    recipe_id: Option<String>,
    form: RecipeForm,
    catalog: Vec<Ingredient>,
    options: EditorOptions,
}

impl<B: Backend, N: Navigator> RecipeEditor<B, N> {
    pub fn new(gateway: Arc<Gateway<B>>, navigator: N, recipe_id: Option<String>) -> Self {
        Self {
            gateway,
            navigator,
            recipe_id,
            form: RecipeForm::new(),
            catalog: Vec::new(),
            options: EditorOptions::default(),
        }
    }

    /// Applies `options`; a form already loaded or edited keeps its values.
    pub fn with_options(mut self, options: EditorOptions) -> Self {
        self.form
            .set_ingredient_rule(ListRule::AtLeastOne, options.require_ingredient);
        self.options = options;
        self
    }

    pub fn recipe_id(&self) -> Option<&str> {
        self.recipe_id.as_deref()
    }

    pub fn form(&self) -> &RecipeForm {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut RecipeForm {
        &mut self.form
    }

    /// Ingredients offered for selection.
    pub fn catalog(&self) -> &[Ingredient] {
        &self.catalog
    }

    pub fn title_valid(&self) -> bool {
        self.form.title_valid()
    }

    pub fn ingredients(&self) -> &[Control] {
        self.form.ingredients()
    }

    pub fn add_ingredient(&mut self) {
        self.form.add_ingredient();
    }

    pub fn remove_ingredient(&mut self, index: usize) -> bool {
        self.form.remove_ingredient(index)
    }

    /// Loads the catalog and, when editing, the recipe. Both requests run
    /// together and neither depends on the other; a failure in one still lets
    /// the other apply. Dropping the returned future cancels both.
    pub async fn init(&mut self) -> Result<(), EditorError> {
        let gateway = Arc::clone(&self.gateway);
        let recipe_id = self.recipe_id.clone();

        let load_recipe = async {
            match recipe_id.as_deref() {
                Some(id) => gateway.get_meals(Some(id)).await.map(Some),
                None => Ok(None),
            }
        };

        let (catalog, recipe) = tokio::join!(gateway.get_all_ingredients(), load_recipe);

        let mut failure = None;

        match catalog {
            Ok(catalog) => self.catalog = catalog,
            Err(e) => {
                error!("Error loading the ingredient catalog: {e}");
                failure = Some(EditorError::from(e));
            }
        }

        match recipe {
            Ok(Some(meals)) => match meals.into_iter().next() {
                Some(recipe) => {
                    debug!("Loaded recipe {:?}", recipe.id);
                    self.form.reset_from(&recipe);
                }
                None => {
                    let id = recipe_id.unwrap_or_default();
                    error!("Recipe {id} not found");
                    failure = Some(EditorError::RecipeNotFound(id));
                }
            },
            Ok(None) => {}
            Err(e) => {
                error!("Error loading recipe: {e}");
                failure = Some(EditorError::from(e));
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Saves the form. An invalid form sends nothing. On success the editor
    /// navigates to the landing route; on failure the form is left as it was.
    ///
    /// New recipes take `max id + 1` (0 for an empty table), read then written,
    /// so concurrent creators can collide; the table's unique constraint
    /// decides which insert wins.
    pub async fn submit(&mut self) -> Result<Submission, EditorError> {
        if !self.form.is_valid() {
            debug!("Form invalid: {:?}", self.form.errors());
            return Ok(Submission::Invalid);
        }

        let submission = match self.recipe_id.as_deref() {
            Some(id) => self.update(id).await?,
            None => self.create().await?,
        };

        self.navigator.navigate(&self.options.landing_route);
        Ok(submission)
    }

    async fn update(&self, id: &str) -> Result<Submission, EditorError> {
        let recipe = self.form.value(Some(id));

        let updated = self.gateway.update_recipe(id, &recipe).await.map_err(|e| {
            error!("Error updating recipe {id}: {e}");
            e
        })?;

        info!("Recipe {id} updated");
        Ok(Submission::Updated(updated))
    }

    async fn create(&self) -> Result<Submission, EditorError> {
        let max = self.gateway.max_recipe_id().await.map_err(|e| {
            error!("Error getting the last recipe id: {e}");
            e
        })?;

        let id = next_recipe_id(max).map_err(|e| {
            error!("Error choosing the next recipe id: {e}");
            e
        })?;
        let recipe = self.form.value(Some(&id));

        let created = self.gateway.create_recipe(&recipe).await.map_err(|e| {
            error!("Error creating recipe {id}: {e}");
            e
        })?;

        info!("Recipe {id} created");
        Ok(Submission::Created(created))
    }
}

/// `max + 1`, or 0 when there are no recipes yet.
pub fn next_recipe_id(max: Option<i64>) -> Result<String, EditorError> {
    match max {
        None => Ok("0".to_string()),
        Some(max) => max
            .checked_add(1)
            .map(|id| id.to_string())
            .ok_or(EditorError::IdsExhausted(max)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_recipe_id() {
        assert_eq!(next_recipe_id(None).unwrap(), "0");
        assert_eq!(next_recipe_id(Some(0)).unwrap(), "1");
        assert_eq!(next_recipe_id(Some(41)).unwrap(), "42");
    }

    #[test]
    fn test_next_recipe_id_at_max() {
        let err = next_recipe_id(Some(i64::MAX)).unwrap_err();
        assert!(matches!(err, EditorError::IdsExhausted(i64::MAX)));
    }
}
