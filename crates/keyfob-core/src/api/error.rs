//! Closed error taxonomy surfaced to consumers of the request pipeline.
//!
//! The pipeline is the single place mapping transport and HTTP outcomes to
//! these kinds. Guards and the session layer never see raw transport
//! errors; the technical detail is logged where the error is produced and
//! the variants carry only what the UI layer needs.

use thiserror::Error;

/// Maximum length for response bodies carried inside error values.
/// Keeps logs and error chains bounded.
const MAX_ERROR_BODY_LENGTH: usize = 500;

#[derive(Error, Debug)]
pub enum ApiError {
    /// The request never produced a response.
    #[error("Network error: {0}")]
    Network(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Credential rejected. Handled silently by the refresh-or-logout
    /// flow; never shown as a toast.
    #[error("Unauthorized - credential rejected")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    Server(String),

    #[error("Service unavailable")]
    ServiceUnavailable,

    /// Uncaught local failure (serialization, bad header value, ...).
    #[error("Client error: {0}")]
    Client(String),
}

impl ApiError {
    /// Truncate a response body to avoid carrying excessive data.
    /// The cut lands on a char boundary so multibyte bodies cannot panic.
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut cut = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        format!(
            "{}... (truncated, {} total bytes)",
            &body[..cut],
            body.len()
        )
    }

    /// Map an HTTP status and response body onto the taxonomy.
    ///
    /// A 400 whose body is a JSON object of field errors (anything beyond a
    /// bare `detail` key) is classified as a validation failure.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = detail_from_body(body).unwrap_or_else(|| Self::truncate_body(body));
        match status.as_u16() {
            400 | 422 if is_field_error_body(body) => ApiError::Validation(message),
            400 => ApiError::BadRequest(message),
            401 => ApiError::Unauthorized,
            403 => ApiError::Forbidden(message),
            404 => ApiError::NotFound(message),
            422 => ApiError::Validation(message),
            429 => ApiError::RateLimited,
            503 => ApiError::ServiceUnavailable,
            500..=599 => ApiError::Server(message),
            _ => ApiError::BadRequest(format!("Status {}: {}", status, message)),
        }
    }

    /// User-presentable message, distinct from the technical detail that
    /// gets logged.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Network(_) => {
                "Could not reach the server. Check your connection and try again.".to_string()
            }
            ApiError::BadRequest(msg) | ApiError::Validation(msg) => msg.clone(),
            ApiError::Unauthorized => "Your session has expired. Please sign in again.".to_string(),
            ApiError::Forbidden(_) => "You do not have access to this resource.".to_string(),
            ApiError::NotFound(_) => "The requested resource was not found.".to_string(),
            ApiError::RateLimited => "Too many requests. Please wait a moment.".to_string(),
            ApiError::Server(_) | ApiError::ServiceUnavailable => {
                "The server had a problem. Please try again later.".to_string()
            }
            ApiError::Client(msg) => msg.clone(),
        }
    }

    /// Whether the UI should suppress this error from user-visible toasts.
    /// Unauthorized is already resolved by the refresh-or-logout flow.
    pub fn is_silent(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() || e.is_request() {
            ApiError::Network(e.to_string())
        } else {
            ApiError::Client(e.to_string())
        }
    }
}

/// Extract the `detail` field the backend puts on error bodies.
pub(crate) fn detail_from_body(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value.get("detail")?.as_str().map(|s| s.to_string())
}

/// A JSON object carrying keys other than `detail` is a per-field
/// validation error map.
fn is_field_error_body(body: &str) -> bool {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(map)) => map.keys().any(|k| k != "detail"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn status_mapping_covers_the_taxonomy() {
        assert!(matches!(
            ApiError::from_status(StatusCode::BAD_REQUEST, "oops"),
            ApiError::BadRequest(_)
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::UNAUTHORIZED, ""),
            ApiError::Unauthorized
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::FORBIDDEN, ""),
            ApiError::Forbidden(_)
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::NOT_FOUND, ""),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, ""),
            ApiError::RateLimited
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR, ""),
            ApiError::Server(_)
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::SERVICE_UNAVAILABLE, ""),
            ApiError::ServiceUnavailable
        ));
    }

    #[test]
    fn field_error_bodies_classify_as_validation() {
        let err = ApiError::from_status(
            StatusCode::BAD_REQUEST,
            r#"{"email": ["This field is required."]}"#,
        );
        assert!(matches!(err, ApiError::Validation(_)));

        // A bare detail message stays a bad request.
        let err = ApiError::from_status(StatusCode::BAD_REQUEST, r#"{"detail": "nope"}"#);
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn detail_field_is_preferred_over_raw_body() {
        let err = ApiError::from_status(
            StatusCode::NOT_FOUND,
            r#"{"detail": "No such widget."}"#,
        );
        assert!(matches!(err, ApiError::NotFound(msg) if msg == "No such widget."));
    }

    #[test]
    fn oversized_bodies_are_truncated() {
        let body = "x".repeat(2000);
        let err = ApiError::from_status(reqwest::StatusCode::INTERNAL_SERVER_ERROR, &body);
        let text = err.to_string();
        assert!(text.len() < 700);
        assert!(text.contains("truncated"));
    }

    #[test]
    fn multibyte_bodies_truncate_on_a_char_boundary() {
        // 600 bytes of three-byte characters: byte 500 falls mid-character.
        let body = "€".repeat(200);
        let err = ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR, &body);
        let text = err.to_string();
        assert!(text.contains("truncated"));
        assert!(text.contains("600 total bytes"));
    }

    #[test]
    fn only_unauthorized_is_silent() {
        assert!(ApiError::Unauthorized.is_silent());
        assert!(!ApiError::RateLimited.is_silent());
        assert!(!ApiError::Network("down".into()).is_silent());
    }
}
