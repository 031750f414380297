use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Query on {table} failed: {message}")]
    Query { table: String, message: String },

    #[error("{message}")]
    Write { message: String },

    #[error("Auth error: {message}")]
    Auth { message: String },

    #[error("Download of {path} failed: {message}")]
    Download { path: String, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Malformed payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl GatewayError {
    pub fn query(table: &str, message: impl Into<String>) -> Self {
        Self::Query {
            table: table.to_string(),
            message: message.into(),
        }
    }

    pub fn write(message: impl Into<String>) -> Self {
        Self::Write {
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable {0} is not set")]
    Missing(String),

    #[error("Invalid {key} value: {message}")]
    Invalid { key: String, message: String },
}

pub type GatewayResult<T> = Result<T, GatewayError>;
