//! Role-based field access policy.
//!
//! A [`Policy`] is loaded once, validated eagerly and then shared immutably
//! (usually as `Arc<Policy>`). It is made of four tables:
//!
//! - account roles and device roles, mapping a [`QueryContext`] to an access
//!   level name;
//! - access levels, holding coarse operation flags and the names of a read
//!   mask and a write mask;
//! - read/write masks ([`RwAccess`]) over the policy key vocabulary.
//!
//! The access level and mask names `none` and `full` are built in.

pub mod access_level;
mod default;
pub mod role;
pub mod rw_access;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use access_level::{AccessLevel, FULL, NONE};
pub use role::{QueryContext, Role, RoleKind};
pub use rw_access::{vocabulary, RwAccess, STREAM_DATA_KEY};

/// Current policy file format version.
pub const POLICY_VERSION: u32 = 1;

/// Source string that selects the built-in policy.
pub const DEFAULT_POLICY_SOURCE: &str = "default";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub version: u32,
    /// Names that cannot be used for new accounts.
    #[serde(default, rename = "disallow_names")]
    pub disallowed_names: Vec<String>,
    /// When non-empty, new account emails must end with one of these.
    #[serde(default)]
    pub allowed_email_suffixes: Vec<String>,
    /// Maximum number of accounts. -1 is unlimited.
    #[serde(default = "unlimited_users")]
    pub max_users: i64,
    pub user_roles: BTreeMap<String, Role>,
    pub device_roles: BTreeMap<String, Role>,
    #[serde(default)]
    pub access_levels: BTreeMap<String, AccessLevel>,
    #[serde(default)]
    pub rw_access: BTreeMap<String, RwAccess>,
}

fn unlimited_users() -> i64 {
    -1
}

fn builtin_level(name: &str) -> Option<&'static AccessLevel> {
    static LEVELS: OnceLock<[AccessLevel; 2]> = OnceLock::new();
    let [none, full] = LEVELS.get_or_init(|| [AccessLevel::none(), AccessLevel::full()]);
    match name {
        NONE => Some(none),
        FULL => Some(full),
        _ => None,
    }
}

fn builtin_mask(name: &str) -> Option<&'static RwAccess> {
    static MASKS: OnceLock<[RwAccess; 2]> = OnceLock::new();
    let [none, full] = MASKS.get_or_init(|| [RwAccess::none(), RwAccess::full()]);
    match name {
        NONE => Some(none),
        FULL => Some(full),
        _ => None,
    }
}

impl Policy {
    /// Load and validate a policy from a JSON file, or the built-in policy
    /// when `source` is `"default"`.
    pub fn load(source: impl AsRef<Path>) -> Result<Self> {
        let source = source.as_ref();
        if source == Path::new(DEFAULT_POLICY_SOURCE) {
            let policy = Self::default();
            policy.validate()?;
            return Ok(policy);
        }
        let json = std::fs::read_to_string(source)?;
        let policy = Self::from_json(&json)?;
        tracing::info!(path = %source.display(), "loaded access policy");
        Ok(policy)
    }

    /// Parse and validate a policy.
    pub fn from_json(json: &str) -> Result<Self> {
        let policy: Policy = serde_json::from_str(json)?;
        policy.validate()?;
        Ok(policy)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the policy as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Check that every name referenced by the tables resolves and every
    /// mask defines the full key vocabulary.
    pub fn validate(&self) -> Result<()> {
        if self.version != POLICY_VERSION {
            return Err(Error::InvalidConfig(format!(
                "unsupported policy version {} (expected {})",
                self.version, POLICY_VERSION
            )));
        }
        if self.max_users < -1 {
            return Err(Error::InvalidConfig(format!(
                "max_users must be -1 or greater, got {}",
                self.max_users
            )));
        }

        for builtin in [NONE, FULL] {
            if self.access_levels.contains_key(builtin) || self.rw_access.contains_key(builtin) {
                return Err(Error::InvalidConfig(format!(
                    "'{}' is built in and cannot be redefined",
                    builtin
                )));
            }
        }

        for kind in [RoleKind::Account, RoleKind::Device] {
            if !self.roles(kind).contains_key(kind.default_role()) {
                return Err(Error::corruption(format!(
                    "default {} role '{}' is not defined",
                    kind.as_str(),
                    kind.default_role()
                )));
            }
            for (name, role) in self.roles(kind) {
                for level in role.access_level_names() {
                    if self.access_level(level).is_none() {
                        return Err(Error::corruption(format!(
                            "{} role '{}' refers to unknown access level '{}'",
                            kind.as_str(),
                            name,
                            level
                        )));
                    }
                }
            }
        }

        for (name, level) in &self.access_levels {
            for mask in [&level.read_access, &level.write_access] {
                if self.rw_access(mask).is_none() {
                    return Err(Error::corruption(format!(
                        "access level '{}' refers to unknown rw_access '{}'",
                        name, mask
                    )));
                }
            }
        }

        for (name, mask) in &self.rw_access {
            let missing = mask.missing_keys();
            if !missing.is_empty() {
                return Err(Error::corruption(format!(
                    "rw_access '{}' is missing keys: {}",
                    name,
                    missing.join(", ")
                )));
            }
            let unknown = mask.unknown_keys();
            if !unknown.is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "rw_access '{}' has unrecognized keys: {}",
                    name,
                    unknown.join(", ")
                )));
            }
        }

        Ok(())
    }

    pub fn roles(&self, kind: RoleKind) -> &BTreeMap<String, Role> {
        match kind {
            RoleKind::Account => &self.user_roles,
            RoleKind::Device => &self.device_roles,
        }
    }

    pub fn has_role(&self, kind: RoleKind, name: &str) -> bool {
        self.roles(kind).contains_key(name)
    }

    /// Look up an access level, including the built-ins.
    pub fn access_level(&self, name: &str) -> Option<&AccessLevel> {
        builtin_level(name).or_else(|| self.access_levels.get(name))
    }

    /// Look up a mask, including the built-ins.
    pub fn rw_access(&self, name: &str) -> Option<&RwAccess> {
        builtin_mask(name).or_else(|| self.rw_access.get(name))
    }

    /// The access level a role grants in the given context.
    ///
    /// An unregistered role falls back to the kind's default role.
    pub fn resolve_access_level(
        &self,
        kind: RoleKind,
        role: &str,
        is_self: bool,
        is_owner: bool,
        is_public: bool,
    ) -> Result<&AccessLevel> {
        let table = self.roles(kind);
        let resolved = match table.get(role) {
            Some(resolved) => resolved,
            None => {
                tracing::warn!(
                    kind = kind.as_str(),
                    role,
                    fallback = kind.default_role(),
                    "unknown role, using default"
                );
                table.get(kind.default_role()).ok_or_else(|| {
                    Error::corruption(format!(
                        "default {} role '{}' is not defined",
                        kind.as_str(),
                        kind.default_role()
                    ))
                })?
            }
        };

        let context = QueryContext::classify(is_self, is_owner, is_public);
        let name = resolved.access_level_name(context);
        self.access_level(name)
            .ok_or_else(|| Error::corruption(format!("access level '{}' is not defined", name)))
    }

    pub fn read_mask(&self, level: &AccessLevel) -> Result<&RwAccess> {
        self.mask(&level.read_access)
    }

    pub fn write_mask(&self, level: &AccessLevel) -> Result<&RwAccess> {
        self.mask(&level.write_access)
    }

    fn mask(&self, name: &str) -> Result<&RwAccess> {
        self.rw_access(name)
            .ok_or_else(|| Error::corruption(format!("rw_access '{}' is not defined", name)))
    }

    pub fn is_allowed_name(&self, name: &str) -> bool {
        !self
            .disallowed_names
            .iter()
            .any(|disallowed| disallowed.eq_ignore_ascii_case(name))
    }

    pub fn is_allowed_email(&self, email: &str) -> bool {
        self.allowed_email_suffixes.is_empty()
            || self
                .allowed_email_suffixes
                .iter()
                .any(|suffix| email.ends_with(suffix.as_str()))
    }

    /// Whether another account fits under `max_users`.
    pub fn accepts_new_user(&self, current_users: u64) -> bool {
        match u64::try_from(self.max_users) {
            Ok(max) => current_users < max,
            Err(_) => true,
        }
    }
}

impl Default for Policy {
    fn default() -> Self {
        default::default_policy()
    }
}
