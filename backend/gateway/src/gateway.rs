use std::time::Duration;

use futures::{stream, Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::{
    sync::watch,
    time::{interval, Interval},
};
use tracing::{debug, error, info, warn};

use crate::{
    backend::Backend,
    config::Config,
    error::{GatewayError, GatewayResult},
    models::{
        AuthData, Ingredient, Recipe, SharedRecipe, SharedRecipeEvent, User, DEFAULT_ID_FIELD,
        INGREDIENTS, INGREDIENT_ID, MEALS, MEAL_ID, SHARED_RECIPES, SHARED_RECIPE_EVENTS,
        SHARED_RECIPE_KEY,
    },
    query::{Direction, Embed, Filter, Select},
};

/// The only component that talks to the hosted backend.
///
/// Reads come back as typed records, writes expect exactly one row back, and
/// every remote error is handed to the caller. The one exception is image
/// downloads while enriching ingredients: a missing image is not worth failing
/// a recipe over.
pub struct Gateway<B> {
    backend: B,
    bucket: String,
    download_concurrency: usize,
    logged: watch::Sender<bool>,
}

impl<B: Backend> Gateway<B> {
    pub fn new(backend: B, config: &Config) -> Self {
        let (logged, _) = watch::channel(false);

        Self {
            backend,
            bucket: config.bucket.clone(),
            download_concurrency: config.download_concurrency.max(1),
            logged,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Rows of `table` matching every entry of `search` and, when `ids` is
    /// given, whose `id_field` (default `id`) is one of them.
    pub async fn get_data<T: DeserializeOwned>(
        &self,
        table: &str,
        search: Option<&Filter>,
        ids: Option<&[String]>,
        id_field: Option<&str>,
    ) -> GatewayResult<Vec<T>> {
        let mut select = Select::all();

        if let Some(search) = search {
            select = select.matching(search);
        }

        if let Some(ids) = ids {
            select = select.within(id_field.unwrap_or(DEFAULT_ID_FIELD), ids.to_vec());
        }

        self.fetch(table, &select).await
    }

    async fn fetch<T: DeserializeOwned>(&self, table: &str, select: &Select) -> GatewayResult<Vec<T>> {
        let rows = self.backend.select(table, select).await.map_err(|e| {
            error!("Error fetching data from {table}: {e}");
            e
        })?;

        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(GatewayError::from))
            .collect::<GatewayResult<Vec<T>>>()
            .map_err(|e| {
                error!("Error decoding rows from {table}: {e}");
                e
            })
    }

    /// One recipe when `id` is given, the whole table otherwise.
    pub async fn get_meals(&self, id: Option<&str>) -> GatewayResult<Vec<Recipe>> {
        let search = id.map(|id| Filter::from([(MEAL_ID.to_string(), id.to_string())]));
        self.get_data(MEALS, search.as_ref(), None, None).await
    }

    /// Ingredients for a recipe, each yielded once its image download settles.
    ///
    /// Unfilled (`None`) references are dropped before the query. Items arrive in
    /// completion order. A failed download yields the ingredient without an
    /// image. Dropping the stream cancels the downloads still in flight.
    pub async fn get_ingredients(
        &self,
        ids: &[Option<String>],
    ) -> GatewayResult<impl Stream<Item = Ingredient> + '_> {
        let ids: Vec<String> = ids.iter().flatten().cloned().collect();
        let ingredients: Vec<Ingredient> = self
            .get_data(INGREDIENTS, None, Some(&ids), Some(INGREDIENT_ID))
            .await?;

        Ok(stream::iter(ingredients)
            .map(move |ingredient| self.attach_image(ingredient))
            .buffer_unordered(self.download_concurrency))
    }

    async fn attach_image(&self, mut ingredient: Ingredient) -> Ingredient {
        let Some(path) = ingredient.storage_path.as_deref() else {
            return ingredient;
        };

        match self.backend.download(&self.bucket, path).await {
            Ok(image) => ingredient.image = Some(image),
            Err(e) => debug!("No image for ingredient {}: {e}", ingredient.id),
        }

        ingredient
    }

    /// The whole catalog, without images.
    pub async fn get_all_ingredients(&self) -> GatewayResult<Vec<Ingredient>> {
        self.get_data(INGREDIENTS, None, None, None).await
    }

    pub async fn login(&self, email: &str, password: &str) -> GatewayResult<AuthData> {
        let result = self.backend.sign_in(email, password).await;
        self.recheck().await;
        result
    }

    pub async fn logout(&self) -> GatewayResult<()> {
        let result = self.backend.sign_out().await;
        self.recheck().await;
        result
    }

    pub async fn registration(&self, email: &str, password: &str) -> GatewayResult<AuthData> {
        info!("Registering {email}");
        self.backend.sign_up(email, password).await
    }

    /// Asks the auth service who is signed in and publishes the answer.
    pub async fn is_logged(&self) -> GatewayResult<bool> {
        let logged = self.backend.current_user().await?.is_some();
        self.logged.send_replace(logged);
        Ok(logged)
    }

    async fn recheck(&self) {
        if let Err(e) = self.is_logged().await {
            warn!("Could not refresh login status: {e}");
            self.logged.send_replace(false);
        }
    }

    /// Last published login status. Only [`Gateway::is_logged`], login and
    /// logout change it.
    pub fn logged_in(&self) -> watch::Receiver<bool> {
        self.logged.subscribe()
    }

    pub async fn get_user_info(&self) -> GatewayResult<Option<User>> {
        self.backend.current_user().await
    }

    /// Every shared recipe with its recipe and full event history.
    pub async fn get_shared_recipes(&self) -> GatewayResult<Vec<SharedRecipe>> {
        let select = Select::all()
            .embed(Embed::one(MEALS, MEAL_ID, MEAL_ID))
            .embed(Embed::many(SHARED_RECIPE_EVENTS, DEFAULT_ID_FIELD, SHARED_RECIPE_KEY));

        self.fetch(SHARED_RECIPES, &select).await
    }

    /// Appends one progress event. Repeated step/user pairs are accepted.
    pub async fn create_shared_recipe_event(
        &self,
        shared_recipe: i64,
        step: i64,
        user: &str,
    ) -> GatewayResult<()> {
        let event = SharedRecipeEvent::new(shared_recipe, step, user);
        self.backend
            .insert(SHARED_RECIPE_EVENTS, vec![serde_json::to_value(event)?])
            .await
    }

    pub async fn update_recipe(&self, id: &str, updates: &Recipe) -> GatewayResult<Recipe> {
        let row = self
            .backend
            .update_single(MEALS, MEAL_ID, id, serde_json::to_value(updates)?)
            .await?;

        Ok(serde_json::from_value(row)?)
    }

    pub async fn create_recipe(&self, recipe: &Recipe) -> GatewayResult<Recipe> {
        let row = self
            .backend
            .insert_single(MEALS, serde_json::to_value(recipe)?)
            .await?;

        Ok(serde_json::from_value(row)?)
    }

    /// Highest recipe id by the remote ordering of `idMeal`, `None` for an
    /// empty table. An id that does not parse counts as 0.
    pub async fn max_recipe_id(&self) -> GatewayResult<Option<i64>> {
        let select = Select::all()
            .columns(&[MEAL_ID])
            .order(MEAL_ID, Direction::Descending)
            .limit(1);

        let rows = self.backend.select(MEALS, &select).await.map_err(|e| {
            error!("Error fetching the last recipe id: {e}");
            e
        })?;

        Ok(rows.first().map(|row| parse_id(row.get(MEAL_ID))))
    }

    /// Highest recipe id, 0 when there is none.
    pub async fn get_last_recipe_id(&self) -> GatewayResult<i64> {
        Ok(self.max_recipe_id().await?.unwrap_or(0))
    }

    /// One tick per second, first tick immediately. Paces a shared cooking session.
    pub fn tick_interval(&self) -> Interval {
        interval(Duration::from_secs(1))
    }
}

fn parse_id(value: Option<&Value>) -> i64 {
    let parsed = match value {
        Some(Value::String(s)) => leading_integer(s),
        Some(Value::Number(n)) => n.as_i64(),
        _ => None,
    };

    parsed.unwrap_or_else(|| {
        warn!("Unparseable {MEAL_ID} {}, counting it as 0", value.unwrap_or(&json!(null)));
        0
    })
}

/// Integer prefix of `s` after leading whitespace, like a lenient `parseInt`.
fn leading_integer(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let end = s
        .char_indices()
        .take_while(|(i, c)| c.is_ascii_digit() || (*i == 0 && (*c == '-' || *c == '+')))
        .map(|(i, c)| i + c.len_utf8())
        .last()?;

    s[..end].parse().ok()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::memory::{Call, MemoryBackend};

    fn gateway(backend: MemoryBackend) -> Gateway<MemoryBackend> {
        Gateway::new(backend, &Config::new("http://localhost", "anon"))
    }

    fn meal(id: &str) -> Value {
        json!({ "idMeal": id, "strMeal": format!("Meal {id}"), "strInstructions": "Cook", "idIngredients": [] })
    }

    #[test]
    fn test_leading_integer() {
        assert_eq!(leading_integer("42"), Some(42));
        assert_eq!(leading_integer("  7abc"), Some(7));
        assert_eq!(leading_integer("-3"), Some(-3));
        assert_eq!(leading_integer("abc"), None);
        assert_eq!(leading_integer(""), None);
        assert_eq!(leading_integer("-"), None);
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id(Some(&json!("42"))), 42);
        assert_eq!(parse_id(Some(&json!(42))), 42);
        assert_eq!(parse_id(Some(&json!("soup"))), 0);
        assert_eq!(parse_id(None), 0);
    }

    #[tokio::test]
    async fn test_last_recipe_id_empty() {
        let gateway = gateway(MemoryBackend::new());
        assert_eq!(gateway.get_last_recipe_id().await.unwrap(), 0);
        assert_eq!(gateway.max_recipe_id().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_last_recipe_id_max() {
        let backend = MemoryBackend::new().with_rows(MEALS, vec![meal("13"), meal("42"), meal("4")]);
        let gateway = gateway(backend);

        assert_eq!(gateway.get_last_recipe_id().await.unwrap(), 42);

        let calls = gateway.backend().calls();
        let Call::Select { select, .. } = &calls[0] else {
            panic!("expected a select, got {calls:?}");
        };
        assert_eq!(select.limit, Some(1));
        assert_eq!(select.order, Some((MEAL_ID.to_string(), Direction::Descending)));
    }

    #[tokio::test]
    async fn test_last_recipe_id_query_error() {
        let backend = MemoryBackend::new();
        backend.fail_query(MEALS, "permission denied");
        let gateway = gateway(backend);

        let err = gateway.get_last_recipe_id().await.unwrap_err();
        assert!(matches!(err, GatewayError::Query { .. }));
    }

    #[tokio::test]
    async fn test_get_meals_filter() {
        let backend = MemoryBackend::new().with_rows(MEALS, vec![meal("1"), meal("2")]);
        let gateway = gateway(backend);

        let one = gateway.get_meals(Some("2")).await.unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].title, "Meal 2");

        let all = gateway.get_meals(None).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_get_data_propagates_query_error() {
        let backend = MemoryBackend::new();
        backend.fail_query(INGREDIENTS, "relation does not exist");
        let gateway = gateway(backend);

        let err = gateway.get_all_ingredients().await.unwrap_err();
        assert!(matches!(err, GatewayError::Query { table, .. } if table == INGREDIENTS));
    }

    #[tokio::test]
    async fn test_get_data_custom_id_field() {
        let backend = MemoryBackend::new().with_rows(
            INGREDIENTS,
            vec![
                json!({ "idIngredient": "1", "strIngredient": "Salt" }),
                json!({ "idIngredient": "2", "strIngredient": "Pepper" }),
            ],
        );
        let gateway = gateway(backend);

        let ids = vec!["2".to_string()];
        let rows: Vec<Ingredient> = gateway
            .get_data(INGREDIENTS, None, Some(&ids), Some(INGREDIENT_ID))
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "Pepper");
    }

    #[tokio::test]
    async fn test_ingredients_download_failure_is_swallowed() {
        let backend = MemoryBackend::new()
            .with_rows(
                INGREDIENTS,
                vec![
                    json!({ "idIngredient": "1", "strIngredient": "Salt", "strStorageimg": "salt.png" }),
                    json!({ "idIngredient": "2", "strIngredient": "Pepper", "strStorageimg": "pepper.png" }),
                ],
            )
            .with_object("recipes", "salt.png", b"salt")
            .with_object("recipes", "pepper.png", b"pepper");
        backend.fail_download("pepper.png");
        let gateway = gateway(backend);

        let ids = vec![Some("1".to_string()), Some("2".to_string())];
        let mut ingredients: Vec<Ingredient> = gateway
            .get_ingredients(&ids)
            .await
            .unwrap()
            .collect()
            .await;
        ingredients.sort_by(|a, b| a.id.cmp(&b.id));

        assert_eq!(ingredients.len(), 2);
        assert_eq!(ingredients[0].image.as_ref().map(|i| i.len()), Some(4));
        assert!(ingredients[1].image.is_none());
    }

    #[tokio::test]
    async fn test_ingredients_strip_nulls_and_skip_missing_paths() {
        let backend = MemoryBackend::new().with_rows(
            INGREDIENTS,
            vec![json!({ "idIngredient": "3", "strIngredient": "Rice" })],
        );
        let gateway = gateway(backend);

        let ids = vec![None, Some("3".to_string()), None];
        let ingredients: Vec<Ingredient> = gateway
            .get_ingredients(&ids)
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(ingredients.len(), 1);

        let calls = gateway.backend().calls();
        assert_eq!(calls.len(), 1, "no download without a stored path");
        let Call::Select { select, .. } = &calls[0] else {
            panic!("expected a select, got {calls:?}");
        };
        assert_eq!(
            select.within,
            Some((INGREDIENT_ID.to_string(), vec!["3".to_string()]))
        );
    }

    #[tokio::test]
    async fn test_login_failure_rechecks_status() {
        let backend = MemoryBackend::new().with_account("ana@example.com", "secret");
        let gateway = gateway(backend);
        let logged = gateway.logged_in();

        let err = gateway.login("ana@example.com", "wrong").await.unwrap_err();
        assert!(matches!(err, GatewayError::Auth { .. }));
        assert!(!*logged.borrow());
        assert!(gateway.backend().calls().contains(&Call::CurrentUser));
    }

    #[tokio::test]
    async fn test_login_logout_status() {
        let backend = MemoryBackend::new().with_account("ana@example.com", "secret");
        let gateway = gateway(backend);
        let logged = gateway.logged_in();

        let data = gateway.login("ana@example.com", "secret").await.unwrap();
        assert_eq!(data.user.unwrap().email.as_deref(), Some("ana@example.com"));
        assert!(*logged.borrow());

        gateway.logout().await.unwrap();
        assert!(!*logged.borrow());
    }

    #[tokio::test]
    async fn test_registration_does_not_recheck() {
        let gateway = gateway(MemoryBackend::new());

        gateway.registration("bo@example.com", "secret").await.unwrap();
        let err = gateway.registration("bo@example.com", "secret").await.unwrap_err();

        assert!(matches!(err, GatewayError::Auth { .. }));
        assert!(!gateway.backend().calls().contains(&Call::CurrentUser));
    }

    #[tokio::test]
    async fn test_shared_recipes_join() {
        let backend = MemoryBackend::new()
            .with_rows(MEALS, vec![meal("1")])
            .with_rows(SHARED_RECIPES, vec![json!({ "id": 9, "idMeal": "1" })]);
        let gateway = gateway(backend);

        gateway.create_shared_recipe_event(9, 1, "ana").await.unwrap();
        gateway.create_shared_recipe_event(9, 1, "ana").await.unwrap();

        let shared = gateway.get_shared_recipes().await.unwrap();
        assert_eq!(shared.len(), 1);
        assert_eq!(shared[0].recipe.as_ref().unwrap().title, "Meal 1");
        assert_eq!(shared[0].events.len(), 2, "duplicates are kept");
        assert_eq!(shared[0].latest_step("ana"), Some(1));
    }

    #[tokio::test]
    async fn test_create_and_update_recipe() {
        let backend = MemoryBackend::new().with_unique(MEALS, MEAL_ID);
        let gateway = gateway(backend);

        let recipe = Recipe {
            id: Some("0".to_string()),
            title: "Soup".to_string(),
            instructions: "Boil".to_string(),
            ingredient_ids: vec![Some("1".to_string())],
            ..Default::default()
        };

        let created = gateway.create_recipe(&recipe).await.unwrap();
        assert_eq!(created, recipe);

        let duplicate = gateway.create_recipe(&recipe).await.unwrap_err();
        assert!(matches!(duplicate, GatewayError::Write { .. }));

        let changed = Recipe {
            title: "Stew".to_string(),
            ..recipe.clone()
        };
        let updated = gateway.update_recipe("0", &changed).await.unwrap();
        assert_eq!(updated.title, "Stew");

        let missing = gateway.update_recipe("5", &changed).await.unwrap_err();
        assert!(matches!(missing, GatewayError::Write { .. }));
    }

    #[tokio::test]
    async fn test_get_meals_tolerates_null_columns() {
        let backend = MemoryBackend::new().with_rows(
            MEALS,
            vec![
                json!({ "idMeal": "1", "strMeal": "Soup", "strInstructions": "Boil", "idIngredients": ["3"] }),
                json!({ "idMeal": "2", "strMeal": null, "strInstructions": null, "idIngredients": null }),
            ],
        );
        let gateway = gateway(backend);

        let meals = gateway.get_meals(None).await.unwrap();
        assert_eq!(meals.len(), 2);

        let bare = gateway.get_meals(Some("2")).await.unwrap();
        assert!(bare[0].title.is_empty());
        assert!(bare[0].ingredient_ids.is_empty());
    }

    #[tokio::test]
    async fn test_logout_failure_rechecks_status() {
        let backend = MemoryBackend::new().with_account("ana@example.com", "secret");
        let gateway = gateway(backend);
        let logged = gateway.logged_in();

        gateway.login("ana@example.com", "secret").await.unwrap();
        gateway.backend().fail_sign_out("network down");
        gateway.backend().clear_calls();

        let err = gateway.logout().await.unwrap_err();

        assert!(matches!(err, GatewayError::Auth { ref message } if message == "network down"));
        assert_eq!(gateway.backend().calls(), vec![Call::SignOut, Call::CurrentUser]);
        assert!(*logged.borrow(), "session survives a failed sign-out");
    }

    #[tokio::test]
    async fn test_tick_interval() {
        let gateway = gateway(MemoryBackend::new());
        let mut ticker = gateway.tick_interval();

        assert_eq!(ticker.period(), Duration::from_secs(1));

        let start = tokio::time::Instant::now();
        ticker.tick().await;
        assert!(start.elapsed() < Duration::from_millis(500), "first tick is immediate");
    }
}
