//! Account operations.

use std::collections::BTreeMap;

use sensordb_proto::{EntityKind, FieldValue, NewUser, Updates, User};

use super::{collect_visible, denied, AuthOperator};
use crate::audit::{AuditCommand, AuditRecord};
use crate::context::CallerContext;
use crate::error::{Error, Result};
use crate::field_access::{check_field_update_permitted, mask_unreadable_fields, readable_fields};
use crate::operator::BaseOperator;
use crate::permission::PermissionLevel;
use crate::policy::RoleKind;

impl<O: BaseOperator> AuthOperator<O> {
    pub fn count_users(&self) -> Result<u64> {
        let caller = self.caller()?;
        self.require_count(&caller)?;
        self.db.count_users()
    }

    /// All accounts for administrators and levels granting `can_list_users`;
    /// otherwise only the caller's own account.
    pub fn read_all_users(&self) -> Result<Vec<User>> {
        let caller = self.caller()?;
        if caller.is_root() || caller.global_access_levels(&self.policy)?.can_list_users() {
            let users = self.db.read_all_users()?;
            return collect_visible(users, |user| self.visible_user(&caller, user));
        }
        let own = caller.user.clone();
        Ok(vec![self.visible_user(&caller, own)?])
    }

    pub fn create_user(&self, user: &NewUser) -> Result<()> {
        let caller = self.caller()?;
        let levels = caller.access_levels(&self.policy, -1, user.public, false)?;
        if !caller.is_root() {
            if !levels.can_create_user() {
                tracing::debug!(caller = %self.device_path, "account creation not permitted");
                return Err(Error::AccessDenied);
            }
            if user.role != caller.user.role {
                let mut role = Updates::new();
                role.insert("role".to_string(), FieldValue::from(user.role.as_str()));
                check_field_update_permitted(&self.policy, &levels, EntityKind::User, &role)?;
            }
        }

        if !self.policy.is_allowed_name(&user.name) {
            return Err(Error::InvalidRequest(format!(
                "the name '{}' is not available",
                user.name
            )));
        }
        if !self.policy.is_allowed_email(&user.email) {
            return Err(Error::InvalidRequest(format!(
                "the email '{}' is not from an allowed domain",
                user.email
            )));
        }
        if !self.policy.has_role(RoleKind::Account, &user.role) {
            return Err(Error::InvalidRequest(format!(
                "unknown account role '{}'",
                user.role
            )));
        }
        if !self.policy.accepts_new_user(self.db.count_users()?) {
            return Err(Error::InvalidRequest(
                "the maximum number of accounts has been reached".to_string(),
            ));
        }

        self.mutate(
            AuditRecord::new(AuditCommand::CreateUser, &user.name),
            || self.db.create_user(user),
        )
    }

    pub fn read_user(&self, name: &str) -> Result<User> {
        let caller = self.caller()?;
        let user = self.db.read_user(name).map_err(denied)?;
        self.visible_user(&caller, user)
    }

    pub fn read_user_by_id(&self, user_id: i64) -> Result<User> {
        let caller = self.caller()?;
        let user = self.db.read_user_by_id(user_id).map_err(denied)?;
        self.visible_user(&caller, user)
    }

    /// The fields of an account the caller may read.
    pub fn read_user_fields(&self, name: &str) -> Result<BTreeMap<String, FieldValue>> {
        let caller = self.caller()?;
        let user = self.db.read_user(name).map_err(denied)?;
        self.require_user_visible(&caller, &user)?;
        let levels = caller.access_levels(
            &self.policy,
            user.user_id,
            user.public,
            caller.is_account(user.user_id),
        )?;
        readable_fields(&self.policy, &levels, &user)
    }

    pub fn update_user(&self, name: &str, updates: &Updates) -> Result<()> {
        let user = self.db.read_user(name).map_err(denied)?;
        self.update_user_by_id(user.user_id, updates)
    }

    pub fn update_user_by_id(&self, user_id: i64, updates: &Updates) -> Result<()> {
        let caller = self.caller()?;
        let target = self.db.read_user_by_id(user_id).map_err(denied)?;
        caller
            .relation_to_user(&target)
            .require(PermissionLevel::User)?;

        let levels = caller.access_levels(
            &self.policy,
            target.user_id,
            target.public,
            caller.is_account(target.user_id),
        )?;
        check_field_update_permitted(&self.policy, &levels, EntityKind::User, updates)?;
        if let Some(role) = updates.get("role") {
            self.require_role(RoleKind::Account, role)?;
        }

        self.mutate(
            AuditRecord::new(AuditCommand::UpdateUser, &target.name),
            || self.db.update_user_by_id(user_id, updates),
        )
    }

    pub fn delete_user(&self, name: &str) -> Result<()> {
        let user = self.db.read_user(name).map_err(denied)?;
        self.delete_user_by_id(user.user_id)
    }

    /// Requires full control of the account, or levels granting
    /// `can_delete_user`.
    pub fn delete_user_by_id(&self, user_id: i64) -> Result<()> {
        let caller = self.caller()?;
        let target = self.db.read_user_by_id(user_id).map_err(denied)?;
        let allowed = caller
            .relation_to_user(&target)
            .at_least(PermissionLevel::User)
            || caller
                .access_levels(
                    &self.policy,
                    target.user_id,
                    target.public,
                    caller.is_account(target.user_id),
                )?
                .can_delete_user();
        if !allowed {
            return Err(Error::AccessDenied);
        }

        self.mutate(
            AuditRecord::new(AuditCommand::DeleteUser, &target.name),
            || self.db.delete_user_by_id(user_id),
        )?;
        if target.user_id != self.log.account_id {
            self.journal.forget(target.user_id);
        }
        Ok(())
    }

    fn require_user_visible(&self, caller: &CallerContext, user: &User) -> Result<()> {
        if caller
            .relation_to_user(user)
            .at_least(PermissionLevel::Device)
            || user.public
        {
            Ok(())
        } else {
            Err(Error::AccessDenied)
        }
    }

    pub(super) fn visible_user(&self, caller: &CallerContext, mut user: User) -> Result<User> {
        self.require_user_visible(caller, &user)?;
        let levels = caller.access_levels(
            &self.policy,
            user.user_id,
            user.public,
            caller.is_account(user.user_id),
        )?;
        mask_unreadable_fields(&self.policy, &levels, &mut user)?;
        Ok(user)
    }
}
