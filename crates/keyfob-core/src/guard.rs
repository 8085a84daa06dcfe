//! Route guards: pure predicates the router consults at navigation time.
//!
//! Guards only read the session manager's derived state; they never
//! mutate it and never see raw transport errors. A rejection carries the
//! redirect target and its query markers.

use crate::session::SessionManager;

/// Query marker attached when an unauthenticated or under-privileged user
/// is bounced off a role-guarded route.
const ERROR_UNAUTHORIZED: &str = "unauthorized";
/// Query marker for a missing fine-grained permission.
const ERROR_FORBIDDEN: &str = "forbidden";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    Allow,
    Redirect {
        to: String,
        query: Vec<(String, String)>,
    },
}

impl GuardOutcome {
    fn redirect(to: impl Into<String>, query: &[(&str, &str)]) -> Self {
        GuardOutcome::Redirect {
            to: to.into(),
            query: query
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, GuardOutcome::Allow)
    }

    /// Full redirect location including the query string, if denied.
    pub fn location(&self) -> Option<String> {
        match self {
            GuardOutcome::Allow => None,
            GuardOutcome::Redirect { to, query } => {
                if query.is_empty() {
                    return Some(to.clone());
                }
                let qs = query
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect::<Vec<_>>()
                    .join("&");
                Some(format!("{}?{}", to, qs))
            }
        }
    }
}

/// Allow iff authenticated; otherwise redirect to the login page carrying
/// the attempted path as the return target.
pub fn require_authenticated(session: &SessionManager, attempted: &str) -> GuardOutcome {
    if session.is_authenticated() {
        GuardOutcome::Allow
    } else {
        GuardOutcome::redirect(
            session.config().login_path.clone(),
            &[("returnUrl", attempted)],
        )
    }
}

/// Allow iff NOT authenticated; a logged-in user is sent to the landing
/// page instead of login/register.
pub fn require_anonymous(session: &SessionManager) -> GuardOutcome {
    if session.is_authenticated() {
        GuardOutcome::redirect(session.config().landing_path.clone(), &[])
    } else {
        GuardOutcome::Allow
    }
}

/// Allow iff the user's role set intersects `allowed` (any-of). An empty
/// allow set admits every authenticated user.
pub fn require_role(session: &SessionManager, allowed: &[&str]) -> GuardOutcome {
    if !session.is_authenticated() {
        return GuardOutcome::redirect(
            session.config().landing_path.clone(),
            &[("error", ERROR_UNAUTHORIZED)],
        );
    }
    if allowed.is_empty() || allowed.iter().any(|role| session.has_role(role)) {
        GuardOutcome::Allow
    } else {
        GuardOutcome::redirect(
            session.config().landing_path.clone(),
            &[("error", ERROR_UNAUTHORIZED)],
        )
    }
}

/// Allow iff the user holds *all* listed permissions.
pub fn require_permission(session: &SessionManager, required: &[&str]) -> GuardOutcome {
    if !session.is_authenticated() {
        return GuardOutcome::redirect(
            session.config().landing_path.clone(),
            &[("error", ERROR_UNAUTHORIZED)],
        );
    }
    if required.iter().all(|p| session.has_permission(p)) {
        GuardOutcome::Allow
    } else {
        GuardOutcome::redirect(
            session.config().landing_path.clone(),
            &[("error", ERROR_FORBIDDEN)],
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
