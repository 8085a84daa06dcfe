//! The request pipeline: every outgoing data request passes through three
//! stages in a fixed order.
//!
//! 1. credential attachment - skipped for allow-listed unauthenticated
//!    paths, otherwise the current access credential goes on as a bearer
//!    header;
//! 2. in-flight counter - incremented on dispatch, decremented on settle,
//!    driving the global loading indicator; a request opts out with a
//!    marker header that is consumed and stripped before transmission;
//! 3. refresh-and-retry - a 401 on a non-allow-listed request triggers one
//!    `refresh_access_token` call and at most one retry with the new
//!    credential.
//!
//! The pipeline is also the single place mapping transport and HTTP
//! outcomes onto the `ApiError` taxonomy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::api::error::ApiError;
use crate::config::AuthConfig;
use crate::session::SessionManager;

/// Outgoing-request marker that suppresses the loading-indicator stage.
/// Consumed and stripped before the request leaves the pipeline.
pub const SILENT_REQUEST_HEADER: &str = "x-silent-request";

/// One outgoing request as the pipeline sees it.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    body: Option<serde_json::Value>,
    headers: Vec<(String, String)>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn json<B: Serialize>(mut self, body: &B) -> Result<Self, ApiError> {
        self.body = Some(
            serde_json::to_value(body)
                .map_err(|e| ApiError::Client(format!("Failed to serialize body: {}", e)))?,
        );
        Ok(self)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Mark the request as exempt from the loading indicator.
    pub fn silent(self) -> Self {
        self.header(SILENT_REQUEST_HEADER, "1")
    }
}

/// Remove the marker header, reporting whether it was present.
fn strip_marker(headers: &mut Vec<(String, String)>) -> bool {
    let before = headers.len();
    headers.retain(|(name, _)| !name.eq_ignore_ascii_case(SILENT_REQUEST_HEADER));
    headers.len() != before
}

/// Decrements the in-flight counter when the request settles, success or
/// failure.
struct InFlightGuard(Arc<AtomicUsize>);

impl InFlightGuard {
    fn acquire(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Pipeline-wrapped HTTP client for the data API.
/// Clone is cheap - the inner client and counters are shared.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    session: Arc<SessionManager>,
    config: Arc<AuthConfig>,
    in_flight: Arc<AtomicUsize>,
}

impl ApiClient {
    pub fn new(session: Arc<SessionManager>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(session.config().request_timeout_secs))
            .build()
            .map_err(|e| ApiError::Client(e.to_string()))?;
        Ok(Self::with_client(http, session))
    }

    /// Share an existing client (and its connection pool).
    pub fn with_client(http: reqwest::Client, session: Arc<SessionManager>) -> Self {
        let config = Arc::new(session.config().clone());
        Self {
            http,
            session,
            config,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Whether any request that participates in the loading indicator is
    /// still outstanding.
    pub fn is_loading(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Run a request through the three pipeline stages.
    pub async fn execute(&self, mut req: ApiRequest) -> Result<reqwest::Response, ApiError> {
        let url = self.config.api_url(&req.path);
        let public = self.config.is_public_path(&req.path);
        let silent = strip_marker(&mut req.headers);

        let _guard = (!silent).then(|| InFlightGuard::acquire(self.in_flight.clone()));

        let token = if public { None } else { self.session.access_token() };
        let response = self.dispatch(&url, &req, token).await?;

        if response.status() == StatusCode::UNAUTHORIZED && !public {
            debug!(path = %req.path, "Credential rejected, attempting refresh");
            return match self.session.refresh_access_token().await {
                Some(new_token) => {
                    // One retry with the fresh credential; a second 401
                    // surfaces as Unauthorized below.
                    let retry = self.dispatch(&url, &req, Some(new_token)).await?;
                    Self::into_result(&req.path, retry).await
                }
                None => Err(ApiError::Unauthorized),
            };
        }

        Self::into_result(&req.path, response).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.fetch_json(ApiRequest::get(path)).await
    }

    pub async fn post_json<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        self.fetch_json(ApiRequest::post(path).json(body)?).await
    }

    pub async fn fetch_json<T: DeserializeOwned>(&self, req: ApiRequest) -> Result<T, ApiError> {
        let path = req.path.clone();
        let response = self.execute(req).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::Client(format!("Failed to parse response from {}: {}", path, e)))
    }

    async fn dispatch(
        &self,
        url: &str,
        req: &ApiRequest,
        bearer: Option<String>,
    ) -> Result<reqwest::Response, ApiError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &req.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ApiError::Client(format!("Invalid header name: {}", e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ApiError::Client(format!("Invalid header value: {}", e)))?;
            headers.insert(name, value);
        }

        let mut builder = self
            .http
            .request(req.method.clone(), url)
            .headers(headers);
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(ref body) = req.body {
            builder = builder.json(body);
        }

        builder.send().await.map_err(ApiError::from)
    }

    /// Map a settled response onto the taxonomy, logging the technical
    /// detail separately from the user-facing message.
    async fn into_result(
        path: &str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let error = ApiError::from_status(status, &body);
        warn!(path, status = %status, error = %error, "Request failed");
        Err(error)
    }
}
