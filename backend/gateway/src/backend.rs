use async_trait::async_trait;
use serde_json::Value;

use crate::{
    error::GatewayResult,
    models::{AuthData, ImageHandle, User},
    query::Select,
};

/// Raw access to the hosted platform: tables, file storage and auth.
///
/// Rows cross this boundary as JSON; [`crate::Gateway`] turns them into records.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn select(&self, table: &str, select: &Select) -> GatewayResult<Vec<Value>>;

    /// Inserts one row and returns it as stored. Anything other than exactly one
    /// returned row is a write error.
    async fn insert_single(&self, table: &str, row: Value) -> GatewayResult<Value>;

    /// Inserts rows without reading them back.
    async fn insert(&self, table: &str, rows: Vec<Value>) -> GatewayResult<()>;

    /// Updates the rows where `field` equals `value` and returns the single
    /// updated row.
    async fn update_single(
        &self,
        table: &str,
        field: &str,
        value: &str,
        changes: Value,
    ) -> GatewayResult<Value>;

    async fn download(&self, bucket: &str, path: &str) -> GatewayResult<ImageHandle>;

    async fn sign_in(&self, email: &str, password: &str) -> GatewayResult<AuthData>;

    async fn sign_up(&self, email: &str, password: &str) -> GatewayResult<AuthData>;

    async fn sign_out(&self) -> GatewayResult<()>;

    /// The signed-in user, `None` when there is no session.
    async fn current_user(&self) -> GatewayResult<Option<User>>;
}
