//! Authentication transport: the two backend endpoints the session
//! manager depends on.
//!
//! The trait seam exists so the session state machine can be exercised
//! against a scripted backend in tests; production uses `HttpAuthApi`
//! over reqwest.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::error::ApiError;
use crate::config::AuthConfig;
use crate::session::User;

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

/// Successful response from `POST <auth-base>/login/`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access: String,
    pub refresh: String,
    pub user: User,
    /// Access token lifetime in seconds, when the server states one.
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// Successful response from `POST <auth-base>/refresh/`.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    pub access: String,
    /// Present only when the server rotates the refresh credential.
    #[serde(default)]
    pub refresh: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// The backend calls the session manager issues.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError>;
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, ApiError>;
}

/// reqwest-backed transport against the configured auth base URL.
pub struct HttpAuthApi {
    client: reqwest::Client,
    config: Arc<AuthConfig>,
}

impl HttpAuthApi {
    pub fn new(config: Arc<AuthConfig>) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ApiError::Client(e.to_string()))?;
        Ok(Self::with_client(client, config))
    }

    /// Share an existing client (and its connection pool).
    pub fn with_client(client: reqwest::Client, config: Arc<AuthConfig>) -> Self {
        Self { client, config }
    }

    async fn post_json<T, B>(&self, url: &str, body: &B) -> Result<T, ApiError>
    where
        T: serde::de::DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(ApiError::from)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(url, status = %status, "Auth endpoint rejected request");
            return Err(ApiError::from_status(status, &body));
        }

        response
            .json()
            .await
            .map_err(|e| ApiError::Client(format!("Failed to parse auth response: {}", e)))
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError> {
        self.post_json(&self.config.login_url(), &LoginRequest { email, password })
            .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, ApiError> {
        self.post_json(
            &self.config.refresh_url(),
            &RefreshRequest { refresh: refresh_token },
        )
        .await
    }
}
