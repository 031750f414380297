//! # Hosted backend over HTTP
//!
//! - Tables: `{url}/rest/v1/{table}` (PostgREST)
//! - Auth: `{url}/auth/v1/...`
//! - Storage: `{url}/storage/v1/object/{bucket}/{path}`
//!
//! Every request carries the project key as `apikey`. The bearer token is the
//! session's access token once signed in, the project key otherwise.
use async_trait::async_trait;
use reqwest::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    Client, Method, RequestBuilder, Response, StatusCode, Url,
};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::{
    backend::Backend,
    config::Config,
    error::{GatewayError, GatewayResult},
    models::{AuthData, AuthSession, ImageHandle, User},
    query::Select,
};

const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";
const RETURN_REPRESENTATION: &str = "return=representation";
const RETURN_MINIMAL: &str = "return=minimal";

pub struct RemoteBackend {
    client: Client,
    url: String,
    key: String,
    session: RwLock<Option<AuthSession>>,
}

impl RemoteBackend {
    pub fn new(config: &Config) -> GatewayResult<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            key: config.key.clone(),
            session: RwLock::new(None),
        })
    }

    pub async fn session(&self) -> Option<AuthSession> {
        self.session.read().await.clone()
    }

    fn rest(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.url)
    }

    fn auth(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.url)
    }

    /// Storage URL with each segment of `path` percent-encoded, so `?` and `#`
    /// in stored names stay part of the path.
    fn object(&self, bucket: &str, path: &str) -> GatewayResult<Url> {
        let invalid = |message: String| GatewayError::Download {
            path: path.to_string(),
            message,
        };

        let mut url = Url::parse(&self.url).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| invalid(format!("{} cannot hold a path", self.url)))?
            .pop_if_empty()
            .extend(["storage", "v1", "object", bucket])
            .extend(path.split('/').filter(|segment| !segment.is_empty()));

        Ok(url)
    }

    async fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let token = match self.session.read().await.as_ref() {
            Some(session) => session.access_token.clone(),
            None => self.key.clone(),
        };

        debug!("{method} {url}");

        self.client
            .request(method, url)
            .header("apikey", &self.key)
            .header(AUTHORIZATION, format!("Bearer {token}"))
    }

    async fn single(&self, request: RequestBuilder) -> GatewayResult<Value> {
        let response = request
            .header(ACCEPT, SINGLE_OBJECT)
            .header("Prefer", RETURN_REPRESENTATION)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GatewayError::write(failure_message(response).await));
        }

        Ok(response.json().await?)
    }

    async fn open_session(&self, session: AuthSession) -> AuthData {
        let user = session.user.clone();
        *self.session.write().await = Some(session.clone());

        AuthData {
            user,
            session: Some(session),
        }
    }
}

#[async_trait]
impl Backend for RemoteBackend {
    async fn select(&self, table: &str, select: &Select) -> GatewayResult<Vec<Value>> {
        let response = self
            .request(Method::GET, &self.rest(table))
            .await
            .query(&select.to_params())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GatewayError::query(table, failure_message(response).await));
        }

        Ok(response.json().await?)
    }

    async fn insert_single(&self, table: &str, row: Value) -> GatewayResult<Value> {
        let request = self.request(Method::POST, &self.rest(table)).await.json(&row);
        self.single(request).await
    }

    async fn insert(&self, table: &str, rows: Vec<Value>) -> GatewayResult<()> {
        let response = self
            .request(Method::POST, &self.rest(table))
            .await
            .header("Prefer", RETURN_MINIMAL)
            .json(&rows)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GatewayError::write(failure_message(response).await));
        }

        Ok(())
    }

    async fn update_single(
        &self,
        table: &str,
        field: &str,
        value: &str,
        changes: Value,
    ) -> GatewayResult<Value> {
        let request = self
            .request(Method::PATCH, &self.rest(table))
            .await
            .query(&[(field, format!("eq.{value}"))])
            .json(&changes);

        self.single(request).await
    }

    async fn download(&self, bucket: &str, path: &str) -> GatewayResult<ImageHandle> {
        let url = self.object(bucket, path)?;
        let response = self
            .request(Method::GET, url.as_str())
            .await
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GatewayError::Download {
                path: path.to_string(),
                message: failure_message(response).await,
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        Ok(ImageHandle {
            bytes: response.bytes().await?,
            content_type,
        })
    }

    async fn sign_in(&self, email: &str, password: &str) -> GatewayResult<AuthData> {
        let response = self
            .request(Method::POST, &self.auth("token"))
            .await
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GatewayError::auth(failure_message(response).await));
        }

        let session: AuthSession = response.json().await?;
        Ok(self.open_session(session).await)
    }

    async fn sign_up(&self, email: &str, password: &str) -> GatewayResult<AuthData> {
        let response = self
            .request(Method::POST, &self.auth("signup"))
            .await
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GatewayError::auth(failure_message(response).await));
        }

        let body: Value = response.json().await?;

        // Projects with auto-confirm answer with a session, the rest with the bare user.
        if body.get("access_token").is_some() {
            let session: AuthSession = serde_json::from_value(body)?;
            return Ok(self.open_session(session).await);
        }

        let user = match body.get("user") {
            Some(user) => serde_json::from_value(user.clone())?,
            None => serde_json::from_value(body)?,
        };

        Ok(AuthData {
            user: Some(user),
            session: None,
        })
    }

    async fn sign_out(&self) -> GatewayResult<()> {
        if self.session.read().await.is_none() {
            return Ok(());
        }

        let response = self
            .request(Method::POST, &self.auth("logout"))
            .await
            .send()
            .await?;

        let status = response.status();
        let stale = matches!(
            status,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND
        );

        if !status.is_success() && !stale {
            return Err(GatewayError::auth(failure_message(response).await));
        }

        *self.session.write().await = None;
        Ok(())
    }

    async fn current_user(&self) -> GatewayResult<Option<User>> {
        if self.session.read().await.is_none() {
            return Ok(None);
        }

        let response = self
            .request(Method::GET, &self.auth("user"))
            .await
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(Some(response.json().await?)),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                warn!("Session rejected by the auth service");
                Ok(None)
            }
            _ => Err(GatewayError::auth(failure_message(response).await)),
        }
    }
}

/// Best human-readable message from an error response.
async fn failure_message(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|value| {
            ["message", "msg", "error_description", "error"]
                .iter()
                .find_map(|key| value.get(*key).and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or_else(|| format!("HTTP {status}: {body}"))
}
