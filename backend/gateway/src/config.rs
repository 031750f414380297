use std::{env, fmt::Display, fs::read_to_string, str::FromStr, time::Duration};

use tracing::{info, warn};

use crate::error::ConfigError;

pub const DEFAULT_BUCKET: &str = "recipes";

#[derive(Debug, Clone)]
pub struct Config {
    pub url: String,
    pub key: String,
    pub bucket: String,
    pub timeout: Duration,
    pub download_concurrency: usize,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Ok(Self {
            url: require("SUPABASE_URL")?,
            key: read_secret("SUPABASE_KEY")?,
            bucket: try_load("RECIPES_BUCKET", DEFAULT_BUCKET)?,
            timeout: Duration::from_secs(try_load("REQUEST_TIMEOUT_SECS", "10")?),
            download_concurrency: try_load("DOWNLOAD_CONCURRENCY", "8")?,
        })
    }

    /// Config pointing at `url` with defaults for everything else. Used by tests and tooling.
    pub fn new(url: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            key: key.into(),
            bucket: DEFAULT_BUCKET.to_string(),
            timeout: Duration::from_secs(10),
            download_concurrency: 8,
        }
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn require(key: &str) -> Result<String, ConfigError> {
    var(key).ok_or_else(|| ConfigError::Missing(key.to_string()))
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e: T::Err| {
            warn!("Invalid {key} value: {e}");
            ConfigError::Invalid {
                key: key.to_string(),
                message: e.to_string(),
            }
        })
}

/// Docker secret first, then the plain environment variable.
fn read_secret(secret_name: &str) -> Result<String, ConfigError> {
    let path = format!("/run/secrets/{secret_name}");

    match read_to_string(&path) {
        Ok(secret) => Ok(secret.trim().to_string()),
        Err(e) => {
            warn!("Failed to read {secret_name} from file: {e}");
            require(secret_name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_load_default() {
        let value: u64 = try_load("RECIPES_TEST_UNSET_TIMEOUT", "10").unwrap();
        assert_eq!(value, 10);
    }

    #[test]
    fn test_try_load_invalid_default() {
        let result: Result<usize, _> = try_load("RECIPES_TEST_UNSET_CONCURRENCY", "many");
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_require_missing() {
        let result = require("RECIPES_TEST_UNSET_URL");
        assert!(matches!(result, Err(ConfigError::Missing(key)) if key == "RECIPES_TEST_UNSET_URL"));
    }

    #[test]
    fn test_new_defaults() {
        let config = Config::new("http://localhost:54321", "anon");
        assert_eq!(config.bucket, "recipes");
        assert_eq!(config.download_concurrency, 8);
    }
}
