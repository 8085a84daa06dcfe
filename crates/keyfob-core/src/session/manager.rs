//! Session state machine: login, logout, refresh, hydration and the
//! derived queries everything else reads.
//!
//! The manager is the single source of truth for "who is logged in, with
//! what token, expiring when". All mutations happen between network
//! suspension points while no lock is held across an await; readers always
//! observe a fully-applied state, never a partial write. Concurrent
//! operations settle last-write-wins.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::{ApiError, AuthApi, HttpAuthApi, LoginResponse};
use crate::config::AuthConfig;
use crate::session::User;
use crate::store::{CredentialStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_DATA_KEY};
use crate::token;

/// Fallback access-token lifetime when neither the server nor the token
/// itself states one. Matches the backend's 30-minute session window.
const DEFAULT_ACCESS_TTL_SECS: i64 = 30 * 60;

/// Fallback refresh-token lifetime: 7 days.
const DEFAULT_REFRESH_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// The authoritative session aggregate.
///
/// Invariant: `authenticated` implies `access_token` is present and was
/// unexpired the last time it was validated. Invariant: `loading` and
/// `last_error` are never both set - they are mutually exclusive phases of
/// one in-flight operation.
#[derive(Debug, Default)]
struct SessionState {
    user: Option<User>,
    access_token: Option<String>,
    refresh_token: Option<String>,
    authenticated: bool,
    loading: bool,
    last_error: Option<String>,
    /// Which tier the credentials were persisted to ("remember me").
    remember: bool,
}

/// Cheap copy of the derived state, published after every completed
/// mutation for subscribe-based consumers (shell layout, bundle loader).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub authenticated: bool,
    pub loading: bool,
    pub user_id: Option<i64>,
}

/// Process-wide session and credential lifecycle manager.
///
/// Constructed once at startup and passed by `Arc` to the request
/// pipeline, the route guards and the UI shell.
pub struct SessionManager {
    config: Arc<AuthConfig>,
    store: CredentialStore,
    api: Arc<dyn AuthApi>,
    state: RwLock<SessionState>,
    events: watch::Sender<SessionSnapshot>,
}

impl SessionManager {
    pub fn new(config: Arc<AuthConfig>, store: CredentialStore, api: Arc<dyn AuthApi>) -> Self {
        let (events, _) = watch::channel(SessionSnapshot::default());
        Self {
            config,
            store,
            api,
            state: RwLock::new(SessionState::default()),
            events,
        }
    }

    /// Convenience composition: open the store under the configured
    /// directory and talk to the real backend.
    pub fn with_http(config: AuthConfig) -> Result<Self, ApiError> {
        let config = Arc::new(config);
        let store = CredentialStore::open(
            config.storage_namespace.clone(),
            config.storage_dir.clone(),
        );
        let api = Arc::new(HttpAuthApi::new(config.clone())?);
        Ok(Self::new(config, store, api))
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    // ===== Lifecycle operations =====

    /// Authenticate against the backend. On success both credentials, the
    /// user record and `authenticated = true` are installed atomically and
    /// persisted to the tier chosen by `remember`. On failure the prior
    /// session state is untouched apart from the error message, and false
    /// is returned.
    ///
    /// Concurrent calls are not deduplicated; the last call to settle
    /// wins. Callers are expected to disable the triggering control while
    /// `is_loading()` is true.
    pub async fn login(&self, email: &str, password: &str, remember: bool) -> bool {
        {
            let mut s = self.state.write();
            s.loading = true;
            s.last_error = None;
        }
        self.publish();

        match self.api.login(email, password).await {
            Ok(resp) => {
                self.persist_credentials(&resp, remember);
                {
                    let mut s = self.state.write();
                    s.user = Some(resp.user);
                    s.access_token = Some(resp.access);
                    s.refresh_token = Some(resp.refresh);
                    s.authenticated = true;
                    s.loading = false;
                    s.last_error = None;
                    s.remember = remember;
                }
                self.publish();
                info!(email, remember, "Login succeeded");
                true
            }
            Err(e) => {
                warn!(email, error = %e, "Login failed");
                {
                    let mut s = self.state.write();
                    s.loading = false;
                    s.last_error = Some(e.user_message());
                }
                self.publish();
                false
            }
        }
    }

    /// Reset the session to its empty initial state and clear every
    /// persisted record in both tiers. Idempotent. The published snapshot
    /// flipping to unauthenticated is the signal to navigate back to the
    /// entry point.
    pub fn logout(&self) {
        self.store.clear_all();
        {
            let mut s = self.state.write();
            *s = SessionState::default();
        }
        self.publish();
        info!("Logged out, session cleared");
    }

    /// Mint a new access credential from the refresh credential.
    ///
    /// Returns the new access token, or `None` after forcing a logout.
    /// No network call is made when no refresh credential exists or when
    /// it is itself expired - a refresh token cannot refresh itself.
    ///
    /// Safe to await from multiple call sites: every caller observes
    /// either the new token or the effects of logout, never a
    /// half-updated session.
    pub async fn refresh_access_token(&self) -> Option<String> {
        let (state_token, remember) = {
            let s = self.state.read();
            (s.refresh_token.clone(), s.remember)
        };
        let refresh = state_token.or_else(|| self.store.get_token(REFRESH_TOKEN_KEY, true));

        let Some(refresh) = refresh else {
            debug!("No refresh credential, skipping refresh");
            return None;
        };

        if token::is_expired_with_skew(&refresh, self.config.clock_skew_secs) {
            debug!("Refresh credential expired, forcing logout");
            self.logout();
            return None;
        }

        match self.api.refresh(&refresh).await {
            Ok(resp) => {
                let access_ttl = resp
                    .expires_in
                    .or_else(|| token::seconds_until_expiry(&resp.access))
                    .unwrap_or(DEFAULT_ACCESS_TTL_SECS);
                self.store
                    .set_token(ACCESS_TOKEN_KEY, &resp.access, access_ttl, remember);

                if let Some(ref rotated) = resp.refresh {
                    let refresh_ttl = token::seconds_until_expiry(rotated)
                        .unwrap_or(DEFAULT_REFRESH_TTL_SECS);
                    self.store
                        .set_token(REFRESH_TOKEN_KEY, rotated, refresh_ttl, remember);
                }

                {
                    let mut s = self.state.write();
                    s.access_token = Some(resp.access.clone());
                    if let Some(rotated) = resp.refresh {
                        s.refresh_token = Some(rotated);
                    }
                    s.authenticated = true;
                    s.last_error = None;
                }
                self.publish();
                debug!("Access credential refreshed");
                Some(resp.access)
            }
            Err(e) => {
                warn!(error = %e, "Refresh failed, forcing logout");
                self.logout();
                None
            }
        }
    }

    /// Reconstruct session state from persisted storage at startup.
    ///
    /// A live access token restores the session with no network call. A
    /// dead access token with a live refresh token restores a provisional
    /// state that a subsequent `refresh_access_token` resolves. Otherwise
    /// storage is cleared and the session starts unauthenticated.
    pub fn hydrate(&self) {
        self.migrate_legacy();

        let access = self.store.get_token(ACCESS_TOKEN_KEY, true);
        let refresh = self.store.get_token(REFRESH_TOKEN_KEY, true);
        let user: Option<User> = self
            .store
            .get_token(USER_DATA_KEY, true)
            .and_then(|json| serde_json::from_str(&json).ok());
        let remember = self.store.tier_has(REFRESH_TOKEN_KEY, true)
            || self.store.tier_has(ACCESS_TOKEN_KEY, true);

        match access {
            Some(access) if !token::is_expired_with_skew(&access, self.config.clock_skew_secs) => {
                {
                    let mut s = self.state.write();
                    s.access_token = Some(access);
                    s.refresh_token = refresh;
                    s.user = user;
                    s.authenticated = true;
                    s.remember = remember;
                }
                info!("Session restored from storage");
            }
            _ => match refresh {
                Some(refresh)
                    if !token::is_expired_with_skew(&refresh, self.config.clock_skew_secs) =>
                {
                    {
                        let mut s = self.state.write();
                        s.refresh_token = Some(refresh);
                        s.user = user;
                        s.authenticated = false;
                        s.remember = remember;
                    }
                    debug!("Access credential dead, provisional session awaiting refresh");
                }
                _ => {
                    debug!("No usable credentials, starting unauthenticated");
                    self.store.clear_all();
                }
            },
        }
        self.publish();
    }

    /// One-shot migration of the previous release's unprefixed storage
    /// keys into the namespaced format. The legacy keys are deleted as
    /// they are read, so this runs at most once.
    fn migrate_legacy(&self) {
        let app = &self.config.app_name;
        let mut migrated = false;

        if let Some(access) = self.store.take_legacy(&format!("{}_auth_token", app)) {
            let ttl = token::seconds_until_expiry(&access).unwrap_or(DEFAULT_ACCESS_TTL_SECS);
            self.store.set_token(ACCESS_TOKEN_KEY, &access, ttl, true);
            migrated = true;
        }
        if let Some(refresh) = self.store.take_legacy(&format!("{}_refresh_token", app)) {
            let ttl = token::seconds_until_expiry(&refresh).unwrap_or(DEFAULT_REFRESH_TTL_SECS);
            self.store.set_token(REFRESH_TOKEN_KEY, &refresh, ttl, true);
            migrated = true;
        }
        if let Some(user) = self.store.take_legacy(&format!("{}_user", app)) {
            self.store
                .set_token(USER_DATA_KEY, &user, DEFAULT_REFRESH_TTL_SECS, true);
            migrated = true;
        }

        if migrated {
            info!("Migrated legacy credential records");
        }
    }

    fn persist_credentials(&self, resp: &LoginResponse, remember: bool) {
        let access_ttl = resp
            .expires_in
            .or_else(|| token::seconds_until_expiry(&resp.access))
            .unwrap_or(DEFAULT_ACCESS_TTL_SECS);
        let refresh_ttl =
            token::seconds_until_expiry(&resp.refresh).unwrap_or(DEFAULT_REFRESH_TTL_SECS);

        self.store
            .set_token(ACCESS_TOKEN_KEY, &resp.access, access_ttl, remember);
        self.store
            .set_token(REFRESH_TOKEN_KEY, &resp.refresh, refresh_ttl, remember);
        if let Ok(json) = serde_json::to_string(&resp.user) {
            self.store.set_token(USER_DATA_KEY, &json, refresh_ttl, remember);
        }
    }

    fn publish(&self) {
        let snapshot = {
            let s = self.state.read();
            SessionSnapshot {
                authenticated: s.authenticated,
                loading: s.loading,
                user_id: s.user.as_ref().map(|u| u.id),
            }
        };
        self.events.send_replace(snapshot);
    }

    // ===== Derived queries (side-effect-free, synchronous) =====

    pub fn is_authenticated(&self) -> bool {
        self.state.read().authenticated
    }

    pub fn access_token(&self) -> Option<String> {
        self.state.read().access_token.clone()
    }

    pub fn user(&self) -> Option<User> {
        self.state.read().user.clone()
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.state
            .read()
            .user
            .as_ref()
            .is_some_and(|u| u.has_role(role))
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.state
            .read()
            .user
            .as_ref()
            .is_some_and(|u| u.has_permission(permission))
    }

    pub fn is_admin(&self) -> bool {
        self.state.read().user.as_ref().is_some_and(User::is_admin)
    }

    pub fn roles(&self) -> Vec<String> {
        self.state
            .read()
            .user
            .as_ref()
            .map(|u| u.roles.clone())
            .unwrap_or_default()
    }

    pub fn organization(&self) -> Option<String> {
        self.state
            .read()
            .user
            .as_ref()
            .and_then(|u| u.organization.clone())
    }

    pub fn error(&self) -> Option<String> {
        self.state.read().last_error.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.read().loading
    }

    pub fn has_valid_session(&self) -> bool {
        self.store.has_valid_session()
    }

    /// Subscribe to session snapshots; a new value is published after
    /// every completed mutation.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.events.subscribe()
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("authenticated", &self.is_authenticated())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
