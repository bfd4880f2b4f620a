//! The identity a request is made as.

use sensordb_proto::{path, Device, Stream, User};

use crate::error::Result;
use crate::field_access::{get_access_levels, AccessLevels};
use crate::permission::PermissionLevel;
use crate::policy::Policy;
use crate::relation;

/// The acting device together with its owning account, as read at the start
/// of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerContext {
    pub user: User,
    pub device: Device,
}

impl CallerContext {
    pub fn new(user: User, device: Device) -> Self {
        Self { user, device }
    }

    /// `user/device` path of the acting device.
    pub fn path(&self) -> String {
        path::device_path(&self.user.name, &self.device.name)
    }

    pub fn is_root(&self) -> bool {
        self.device.enabled && self.device.admin
    }

    pub fn relation_to_user(&self, target: &User) -> PermissionLevel {
        relation::relation_to_user(&self.device, target)
    }

    pub fn relation_to_device(&self, target: &Device) -> PermissionLevel {
        relation::relation_to_device(&self.device, target)
    }

    pub fn relation_to_stream(&self, target: &Stream, owner: &Device) -> PermissionLevel {
        relation::relation_to_stream(&self.device, target, owner)
    }

    /// Whether the caller speaks for the given account.
    pub fn is_account(&self, user_id: i64) -> bool {
        self.user.user_id == user_id && self.device.acts_as_user()
    }

    pub fn is_device(&self, device_id: i64) -> bool {
        self.device.device_id == device_id
    }

    /// Access levels for a record owned by `account_id`.
    pub fn access_levels<'p>(
        &self,
        policy: &'p Policy,
        account_id: i64,
        is_public: bool,
        is_self: bool,
    ) -> Result<AccessLevels<'p>> {
        get_access_levels(
            policy,
            &self.user,
            &self.device,
            account_id,
            is_public,
            is_self,
        )
    }

    /// Access levels for account-wide operations that have no target record.
    pub fn global_access_levels<'p>(&self, policy: &'p Policy) -> Result<AccessLevels<'p>> {
        self.access_levels(policy, -1, false, false)
    }
}
