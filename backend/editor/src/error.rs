use gateway::GatewayError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EditorError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Recipe {0} not found")]
    RecipeNotFound(String),

    #[error("No recipe id after {0} is available")]
    IdsExhausted(i64),
}
