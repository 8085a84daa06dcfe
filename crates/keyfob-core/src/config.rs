//! Authentication configuration.
//!
//! `AuthConfig` is built once at startup and passed by reference (behind an
//! `Arc`) to the session manager, the request pipeline and the route guards.
//! There is no ambient lookup - construction is the composition root.

use std::path::PathBuf;

use anyhow::Result;

use crate::token::CLOCK_SKEW_SECS;

/// Directory name under the platform data dir holding the durable tier.
const APP_DIR: &str = "keyfob";

/// HTTP request timeout in seconds.
/// 30s allows for slow backends while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Path prefixes that never get a credential attached and never trigger
/// refresh-on-401. The refresh endpoint itself must be listed, otherwise a
/// rejected refresh could recurse.
const PUBLIC_PREFIXES: &[&str] = &[
    "/login",
    "/register",
    "/forgot-password",
    "/reset-password",
    "/refresh",
];

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Base URL for the authentication endpoints (`<auth-base>/login/` etc).
    pub auth_base_url: String,
    /// Base URL for data endpoints the request pipeline targets.
    pub api_base_url: String,
    /// Namespace prefixed to every storage key.
    pub storage_namespace: String,
    /// Application name, used only for the legacy unprefixed key set.
    pub app_name: String,
    /// Directory backing the durable storage tier.
    pub storage_dir: PathBuf,
    /// Path prefixes exempt from credential attachment and refresh-on-401.
    pub public_prefixes: Vec<String>,
    /// Skew window for token expiry checks, in seconds.
    pub clock_skew_secs: i64,
    /// Transport-level request timeout, in seconds.
    pub request_timeout_secs: u64,
    /// Router path of the login page (guard redirect target).
    pub login_path: String,
    /// Router path of the default landing page (guard redirect target).
    pub landing_path: String,
}

impl AuthConfig {
    /// Build a config with platform defaults for everything but the URLs.
    pub fn new(auth_base_url: impl Into<String>, api_base_url: impl Into<String>) -> Result<Self> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find platform data directory"))?;

        Ok(Self::with_storage_dir(
            auth_base_url,
            api_base_url,
            data_dir.join(APP_DIR),
        ))
    }

    /// Build a config with an explicit durable-tier directory.
    pub fn with_storage_dir(
        auth_base_url: impl Into<String>,
        api_base_url: impl Into<String>,
        storage_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            auth_base_url: auth_base_url.into().trim_end_matches('/').to_string(),
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
            storage_namespace: APP_DIR.to_string(),
            app_name: APP_DIR.to_string(),
            storage_dir: storage_dir.into(),
            public_prefixes: PUBLIC_PREFIXES.iter().map(|p| p.to_string()).collect(),
            clock_skew_secs: CLOCK_SKEW_SECS,
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
            login_path: "/login".to_string(),
            landing_path: "/dashboard".to_string(),
        }
    }

    pub fn login_url(&self) -> String {
        format!("{}/login/", self.auth_base_url)
    }

    pub fn refresh_url(&self) -> String {
        format!("{}/refresh/", self.auth_base_url)
    }

    /// Join a request path onto the API base URL.
    pub fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base_url, path.trim_start_matches('/'))
    }

    /// Whether a request path is on the unauthenticated allow-list.
    ///
    /// Matched by whole path segments so that versioned or mounted
    /// variants (`/api/v1/auth/login/`) are recognized while paths that
    /// merely embed an allow-listed word (`/users/registered/`) are not.
    pub fn is_public_path(&self, path: &str) -> bool {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        self.public_prefixes.iter().any(|prefix| {
            let wanted: Vec<&str> = prefix.split('/').filter(|s| !s.is_empty()).collect();
            !wanted.is_empty()
                && segments
                    .windows(wanted.len())
                    .any(|window| window == wanted.as_slice())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AuthConfig {
        AuthConfig::with_storage_dir(
            "https://api.example.com/auth/",
            "https://api.example.com/api/v1/",
            "/tmp/keyfob-test",
        )
    }

    #[test]
    fn trailing_slashes_are_normalized() {
        let c = config();
        assert_eq!(c.login_url(), "https://api.example.com/auth/login/");
        assert_eq!(c.refresh_url(), "https://api.example.com/auth/refresh/");
        assert_eq!(c.api_url("/widgets/"), "https://api.example.com/api/v1/widgets/");
    }

    #[test]
    fn public_paths_match_by_whole_segment() {
        let c = config();
        assert!(c.is_public_path("/login/"));
        assert!(c.is_public_path("/api/v1/auth/refresh/"));
        assert!(c.is_public_path("/auth/forgot-password/"));
        assert!(!c.is_public_path("/widgets/"));
        assert!(!c.is_public_path("/users/me/"));
    }

    #[test]
    fn embedded_words_do_not_make_a_path_public() {
        let c = config();
        // Authenticated endpoints whose path contains an allow-listed word
        // as part of a longer segment keep their credential.
        assert!(!c.is_public_path("/users/registered/"));
        assert!(!c.is_public_path("/audit/login-history/"));
        assert!(!c.is_public_path("/jobs/refreshable/"));
    }
}
