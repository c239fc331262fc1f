//! Caller identity and role-based approval rights
//!
//! Identity is a username plus a role string taken from request headers and
//! resolved against a small demo directory. Only the admin role may approve
//! high-risk runs.

mod middleware;

pub use middleware::{ROLE_HEADER, USER_HEADER};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::warn;

/// User roles for authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Can approve any run, including high-risk ones
    Admin,
    /// Can request runs and approve low/medium risk runs
    #[default]
    Operator,
    /// Read-only intent, but not blocked from requesting dry-runs
    Viewer,
}

impl Role {
    /// Parse a role string, degrading unknown values to the default role
    pub fn parse_lenient(value: &str) -> Role {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Role::Admin,
            "operator" => Role::Operator,
            "viewer" => Role::Viewer,
            _ => Role::default(),
        }
    }

    pub fn can_approve_high_risk(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Operator => write!(f, "operator"),
            Role::Viewer => write!(f, "viewer"),
        }
    }
}

/// The caller of an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    pub username: String,
    pub role: Role,
}

impl UserContext {
    pub fn new(username: impl Into<String>, role: Role) -> Self {
        Self {
            username: username.into(),
            role,
        }
    }

    /// Identity used by automated integrations (webhooks, uploads)
    pub fn service(name: &str) -> Self {
        Self::new(name, Role::Operator)
    }
}

impl Default for UserContext {
    fn default() -> Self {
        Self::new("operator", Role::Operator)
    }
}

#[derive(Debug, Deserialize)]
struct DirectoryEntry {
    #[serde(default)]
    role: Option<String>,
}

/// Known demo users and their configured roles
#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
    roles: HashMap<String, Role>,
}

impl UserDirectory {
    /// Load from JSON shaped like `{"admin": {"role": "admin"}}`.
    ///
    /// Malformed JSON yields an empty directory; header roles are then used as-is.
    pub fn from_json(raw: &str) -> Self {
        match serde_json::from_str::<HashMap<String, DirectoryEntry>>(raw) {
            Ok(entries) => Self {
                roles: entries
                    .into_iter()
                    .filter_map(|(name, entry)| entry.role.map(|r| (name, Role::parse_lenient(&r))))
                    .collect(),
            },
            Err(e) => {
                warn!("⚠️  Ignoring malformed demo user directory: {}", e);
                Self::default()
            }
        }
    }

    /// Resolve a caller from header values; a directory role overrides the header
    pub fn resolve(&self, username: Option<&str>, role: Option<&str>) -> UserContext {
        let username = username
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or("operator");

        let role = match self.roles.get(username) {
            Some(role) => *role,
            None => role.map(Role::parse_lenient).unwrap_or_default(),
        };

        UserContext::new(username, role)
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEMO: &str = r#"{"admin": {"role": "admin"}, "operator": {"role": "operator"}, "viewer": {"role": "viewer"}}"#;

    #[test]
    fn test_directory_role_overrides_header() {
        let directory = UserDirectory::from_json(DEMO);
        let user = directory.resolve(Some("viewer"), Some("admin"));
        assert_eq!(user.role, Role::Viewer);
    }

    #[test]
    fn test_unknown_user_keeps_header_role() {
        let directory = UserDirectory::from_json(DEMO);
        let user = directory.resolve(Some("alice"), Some("admin"));
        assert_eq!(user, UserContext::new("alice", Role::Admin));
    }

    #[test]
    fn test_missing_headers_default_to_operator() {
        let directory = UserDirectory::from_json(DEMO);
        assert_eq!(directory.resolve(None, None), UserContext::default());
    }

    #[test]
    fn test_unknown_role_degrades_to_operator() {
        let directory = UserDirectory::default();
        let user = directory.resolve(Some("bob"), Some("superuser"));
        assert_eq!(user.role, Role::Operator);
    }

    #[test]
    fn test_malformed_directory_is_empty() {
        let directory = UserDirectory::from_json("{not json");
        assert_eq!(directory.len(), 0);
    }

    #[test]
    fn test_only_admin_approves_high_risk() {
        assert!(Role::Admin.can_approve_high_risk());
        assert!(!Role::Operator.can_approve_high_risk());
        assert!(!Role::Viewer.can_approve_high_risk());
    }
}
