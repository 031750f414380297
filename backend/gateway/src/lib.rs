//! # Recipe Gateway
//!
//! Single point of contact with the hosted backend (auth, relational tables,
//! file storage). Everything else in the workspace sees typed records, streams
//! and a watch channel, never an HTTP client.
//!
//! ## Layers
//!
//! - [`Backend`]: raw platform access, rows as JSON
//!   - [`RemoteBackend`]: reqwest against the platform's REST, auth and storage APIs
//!   - `MemoryBackend` (feature `test-utils`): same semantics, in memory
//! - [`Gateway`]: record shaping on top of a backend
//!   - drops unfilled ingredient references before querying
//!   - attaches downloaded images to ingredients, failures ignored
//!   - derives the next recipe id from an ordered query
//!   - mirrors a logged-in flag, refreshed after login/logout/explicit checks
//!
//! ## Failure Policy
//!
//! - Query errors are logged, then returned
//! - Write and auth errors are returned with the remote message
//! - Image download errors are swallowed, the ingredient comes back without an image
//! - Nothing is retried
//!
//! ## Recipe Ids
//!
//! New ids are `max(idMeal) + 1`, read then written. Two creators racing will
//! both compute the same id; whichever insert lands second is rejected by the
//! table's unique constraint (or overwrites, if the table has none). Nothing
//! here prevents that.
pub mod backend;
pub mod config;
pub mod error;
pub mod gateway;
pub mod models;
pub mod query;
pub mod remote;

#[cfg(any(test, feature = "test-utils"))]
pub mod memory;

pub use backend::Backend;
pub use config::Config;
pub use error::{ConfigError, GatewayError, GatewayResult};
pub use gateway::Gateway;
pub use remote::RemoteBackend;

/// Gateway over the hosted backend described by `config`.
pub fn connect(config: &Config) -> GatewayResult<Gateway<RemoteBackend>> {
    let backend = RemoteBackend::new(config)?;
    Ok(Gateway::new(backend, config))
}
