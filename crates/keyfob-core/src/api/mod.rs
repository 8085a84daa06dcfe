//! Backend transport and the request pipeline.
//!
//! `AuthApi`/`HttpAuthApi` cover the two authentication endpoints the
//! session manager calls directly. `ApiClient` wraps every other outgoing
//! request in the three pipeline stages (credential attachment, in-flight
//! counter, refresh-and-retry) and owns the error taxonomy mapping.

pub mod auth;
pub mod client;
pub mod error;

pub use auth::{AuthApi, HttpAuthApi, LoginResponse, RefreshResponse};
pub use client::{ApiClient, ApiRequest, SILENT_REQUEST_HEADER};
pub use error::ApiError;
