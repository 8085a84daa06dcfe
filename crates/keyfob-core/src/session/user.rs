//! Authenticated user identity and authorization facts.

use serde::{Deserialize, Serialize};

/// Roles that grant administrative access.
const ADMIN_ROLES: &[&str] = &["admin", "super_admin"];

/// Identity attached to a session by login or hydration. Read-only to all
/// consumers; replaced wholesale by a fresh login or profile refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub email: String,
    #[serde(default, alias = "full_name", alias = "name")]
    pub display_name: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub organization: Option<String>,
}

impl User {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }

    pub fn is_admin(&self) -> bool {
        ADMIN_ROLES.iter().any(|r| self.has_role(r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(roles: &[&str]) -> User {
        User {
            id: 1,
            email: "kim@example.com".into(),
            display_name: "Kim".into(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            permissions: vec!["reports.view".into()],
            organization: Some("acme".into()),
        }
    }

    #[test]
    fn role_and_permission_membership() {
        let u = user(&["student"]);
        assert!(u.has_role("student"));
        assert!(!u.has_role("admin"));
        assert!(u.has_permission("reports.view"));
        assert!(!u.has_permission("reports.edit"));
    }

    #[test]
    fn both_admin_roles_count() {
        assert!(user(&["admin"]).is_admin());
        assert!(user(&["super_admin", "student"]).is_admin());
        assert!(!user(&["student"]).is_admin());
    }

    #[test]
    fn parses_with_missing_optional_fields() {
        let u: User = serde_json::from_str(r#"{"id": 9}"#).expect("parse");
        assert_eq!(u.id, 9);
        assert!(u.roles.is_empty());
        assert!(u.organization.is_none());
    }
}
