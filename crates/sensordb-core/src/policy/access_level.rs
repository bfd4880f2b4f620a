//! Access levels: coarse operation flags plus the names of a read mask and a
//! write mask.

use serde::{Deserialize, Serialize};

/// Name of the built-in level and mask that deny everything.
pub const NONE: &str = "none";

/// Name of the built-in level and mask that allow everything.
pub const FULL: &str = "full";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessLevel {
    pub can_create_user: bool,
    pub can_delete_user: bool,
    pub can_list_users: bool,
    pub can_count: bool,
    /// Name of the [`RwAccess`](super::RwAccess) applied to reads.
    pub read_access: String,
    /// Name of the [`RwAccess`](super::RwAccess) applied to writes.
    pub write_access: String,
}

impl AccessLevel {
    pub fn none() -> Self {
        Self {
            can_create_user: false,
            can_delete_user: false,
            can_list_users: false,
            can_count: false,
            read_access: NONE.to_string(),
            write_access: NONE.to_string(),
        }
    }

    pub fn full() -> Self {
        Self {
            can_create_user: true,
            can_delete_user: true,
            can_list_users: true,
            can_count: true,
            read_access: FULL.to_string(),
            write_access: FULL.to_string(),
        }
    }

    /// A level with no coarse flags and the given masks.
    pub fn with_masks(read_access: impl Into<String>, write_access: impl Into<String>) -> Self {
        Self {
            read_access: read_access.into(),
            write_access: write_access.into(),
            ..Self::none()
        }
    }

    pub fn with_list_users(mut self, allowed: bool) -> Self {
        self.can_list_users = allowed;
        self
    }

    pub fn with_create_user(mut self, allowed: bool) -> Self {
        self.can_create_user = allowed;
        self
    }

    pub fn with_delete_user(mut self, allowed: bool) -> Self {
        self.can_delete_user = allowed;
        self
    }

    pub fn with_count(mut self, allowed: bool) -> Self {
        self.can_count = allowed;
        self
    }
}

impl Default for AccessLevel {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_json_fields_default_to_none() {
        let level: AccessLevel = serde_json::from_str(r#"{"can_count": true}"#).unwrap();
        assert!(level.can_count);
        assert!(!level.can_list_users);
        assert_eq!(level.read_access, NONE);
        assert_eq!(level.write_access, NONE);
    }

    #[test]
    fn test_builders() {
        let level = AccessLevel::with_masks("publicread", NONE).with_list_users(true);
        assert!(level.can_list_users);
        assert!(!level.can_create_user);
        assert_eq!(level.read_access, "publicread");
    }
}
