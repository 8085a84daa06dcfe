//! keyfob-core - session and credential lifecycle management for REST
//! clients.
//!
//! The library holds the one piece of a CRUD dashboard client that is not
//! view plumbing: storing bearer credentials across two expiry-aware
//! storage tiers, classifying and tolerating token expiry, transparently
//! refreshing the access credential when the backend rejects it, and
//! answering the role/permission queries navigation guards need.
//!
//! Construction is explicit: build an [`AuthConfig`], open a
//! [`SessionManager`] from it, call [`SessionManager::hydrate`] once at
//! startup, and hand `Arc<SessionManager>` to the [`ApiClient`] pipeline
//! and the guard predicates. There is exactly one session manager per
//! running application, by construction rather than by global state.

pub mod api;
pub mod config;
pub mod guard;
pub mod session;
pub mod store;
pub mod token;

pub use api::{ApiClient, ApiError, ApiRequest, AuthApi, HttpAuthApi, SILENT_REQUEST_HEADER};
pub use config::AuthConfig;
pub use guard::{
    require_anonymous, require_authenticated, require_permission, require_role, GuardOutcome,
};
pub use session::{SessionManager, SessionSnapshot, User};
pub use store::CredentialStore;
