//! Roles map a query context to an access level name.

use serde::{Deserialize, Serialize};

/// The relationship between a caller and the record being queried.
///
/// When several apply, the most specific wins: self, then owner, then
/// public, then private.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryContext {
    /// The caller is the record (or acts as the account being queried).
    SelfRecord,
    /// The record belongs to the caller's account.
    Owner,
    /// A public record of another account.
    Public,
    /// A private record of another account.
    Private,
}

impl QueryContext {
    pub fn classify(is_self: bool, is_owner: bool, is_public: bool) -> Self {
        if is_self {
            QueryContext::SelfRecord
        } else if is_owner {
            QueryContext::Owner
        } else if is_public {
            QueryContext::Public
        } else {
            QueryContext::Private
        }
    }
}

/// Which role table a role name belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleKind {
    Account,
    Device,
}

impl RoleKind {
    /// Role used when an entity names a role that is not configured.
    pub fn default_role(self) -> &'static str {
        match self {
            RoleKind::Account => "nobody",
            RoleKind::Device => "none",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RoleKind::Account => "account",
            RoleKind::Device => "device",
        }
    }
}

/// Access level names per query context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    #[serde(rename = "self")]
    pub self_access: String,
    pub owner: String,
    pub public: String,
    pub private: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl Role {
    pub fn new(
        self_access: impl Into<String>,
        owner: impl Into<String>,
        public: impl Into<String>,
        private: impl Into<String>,
    ) -> Self {
        Self {
            self_access: self_access.into(),
            owner: owner.into(),
            public: public.into(),
            private: private.into(),
            description: String::new(),
        }
    }

    /// The same access level in every context.
    pub fn uniform(level: &str) -> Self {
        Self::new(level, level, level, level)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn access_level_name(&self, context: QueryContext) -> &str {
        match context {
            QueryContext::SelfRecord => &self.self_access,
            QueryContext::Owner => &self.owner,
            QueryContext::Public => &self.public,
            QueryContext::Private => &self.private,
        }
    }

    /// Every access level name the role refers to.
    pub fn access_level_names(&self) -> [&str; 4] {
        [&self.self_access, &self.owner, &self.public, &self.private]
    }
}
