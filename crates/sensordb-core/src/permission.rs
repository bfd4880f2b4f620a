//! The permission lattice.
//!
//! Levels are totally ordered: `Nobody < Device < Family < User < Root`.
//! Every check is an "at least" comparison against a required level.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How much authority a caller device holds over a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    /// No access at all.
    Nobody = 0,
    /// The exact device that is, or owns, the target.
    Device = 1,
    /// A sibling device under the same account. Read-only.
    Family = 2,
    /// Full account control: the primary device or one acting as the user.
    User = 3,
    /// Global administrator.
    Root = 4,
}

impl PermissionLevel {
    pub const ALL: [PermissionLevel; 5] = [
        PermissionLevel::Nobody,
        PermissionLevel::Device,
        PermissionLevel::Family,
        PermissionLevel::User,
        PermissionLevel::Root,
    ];

    pub fn rank(self) -> u8 {
        self as u8
    }

    /// Non-strict comparison against a required level.
    pub fn at_least(self, required: PermissionLevel) -> bool {
        self >= required
    }

    /// `Ok` if this level satisfies `required`, otherwise a uniform denial.
    pub fn require(self, required: PermissionLevel) -> Result<()> {
        if self.at_least(required) {
            Ok(())
        } else {
            tracing::debug!(held = %self, %required, "permission level too low");
            Err(Error::AccessDenied)
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PermissionLevel::Nobody => "nobody",
            PermissionLevel::Device => "device",
            PermissionLevel::Family => "family",
            PermissionLevel::User => "user",
            PermissionLevel::Root => "root",
        }
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        PermissionLevel::ALL
            .into_iter()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| Error::InvalidConfig(format!("unknown permission level '{}'", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_order() {
        for window in PermissionLevel::ALL.windows(2) {
            assert!(window[0] < window[1]);
            assert!(window[1].at_least(window[0]));
            assert!(!window[0].at_least(window[1]));
        }
    }

    #[test]
    fn test_at_least_is_reflexive() {
        for level in PermissionLevel::ALL {
            assert!(level.at_least(level));
            assert!(level.require(level).is_ok());
        }
    }

    #[test]
    fn test_require_denies_uniformly() {
        let err = PermissionLevel::Family
            .require(PermissionLevel::User)
            .unwrap_err();
        assert!(err.is_access_denied());
    }

    #[test]
    fn test_parse_and_display() {
        for level in PermissionLevel::ALL {
            assert_eq!(level.to_string().parse::<PermissionLevel>().unwrap(), level);
        }
        assert!("admin".parse::<PermissionLevel>().is_err());
        assert_eq!(PermissionLevel::Root.rank(), 4);
    }
}
