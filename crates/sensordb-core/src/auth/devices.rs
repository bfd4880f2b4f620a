//! Device operations.

use sensordb_proto::path::{device_path, split_device_path};
use sensordb_proto::{Device, EntityKind, Updates};

use super::{collect_visible, denied, AuthOperator};
use crate::audit::{AuditCommand, AuditRecord};
use crate::context::CallerContext;
use crate::error::{Error, Result};
use crate::field_access::{check_field_update_permitted, mask_unreadable_fields};
use crate::operator::BaseOperator;
use crate::permission::PermissionLevel;
use crate::policy::RoleKind;

impl<O: BaseOperator> AuthOperator<O> {
    pub fn count_devices(&self) -> Result<u64> {
        let caller = self.caller()?;
        self.require_count(&caller)?;
        self.db.count_devices()
    }

    /// Devices of an account. Devices of the same account see all of them;
    /// anyone else sees only what passes the per-device check.
    pub fn read_all_devices_by_user_id(&self, user_id: i64) -> Result<Vec<Device>> {
        let caller = self.caller()?;
        let user = self.db.read_user_by_id(user_id).map_err(denied)?;
        let devices = self.db.read_all_devices_by_user_id(user_id)?;
        if caller
            .relation_to_user(&user)
            .at_least(PermissionLevel::Family)
        {
            return devices
                .into_iter()
                .map(|device| self.mask_device(&caller, device))
                .collect();
        }
        collect_visible(devices, |device| self.visible_device(&caller, device))
    }

    pub fn read_all_devices(&self, user: &str) -> Result<Vec<Device>> {
        let user = self.db.read_user(user).map_err(denied)?;
        self.read_all_devices_by_user_id(user.user_id)
    }

    pub fn create_device_by_user_id(&self, user_id: i64, name: &str) -> Result<()> {
        let caller = self.caller()?;
        let user = self.db.read_user_by_id(user_id).map_err(denied)?;
        caller
            .relation_to_user(&user)
            .require(PermissionLevel::User)?;

        self.mutate(
            AuditRecord::new(AuditCommand::CreateDevice, device_path(&user.name, name)),
            || self.db.create_device_by_user_id(user_id, name),
        )
    }

    /// Create a device by `user/device` path.
    pub fn create_device(&self, path: &str) -> Result<()> {
        let (user, name) = split_device_path(path)?;
        let user = self.db.read_user(user).map_err(denied)?;
        self.create_device_by_user_id(user.user_id, name)
    }

    pub fn read_device_by_id(&self, device_id: i64) -> Result<Device> {
        let caller = self.caller()?;
        let device = self.db.read_device_by_id(device_id).map_err(denied)?;
        self.visible_device(&caller, device)
    }

    pub fn read_device_by_user_id(&self, user_id: i64, name: &str) -> Result<Device> {
        let caller = self.caller()?;
        let device = self
            .db
            .read_device_by_user_id(user_id, name)
            .map_err(denied)?;
        self.visible_device(&caller, device)
    }

    pub fn read_device(&self, path: &str) -> Result<Device> {
        let caller = self.caller()?;
        let device = self.db.read_device(path).map_err(denied)?;
        self.visible_device(&caller, device)
    }

    pub fn update_device_by_id(&self, device_id: i64, updates: &Updates) -> Result<()> {
        let caller = self.caller()?;
        let target = self.db.read_device_by_id(device_id).map_err(denied)?;
        caller
            .relation_to_device(&target)
            .require(PermissionLevel::User)?;

        let owner = self.db.read_user_by_id(target.user_id).map_err(denied)?;
        let levels = caller.access_levels(
            &self.policy,
            target.user_id,
            target.public,
            caller.is_device(target.device_id),
        )?;
        check_field_update_permitted(&self.policy, &levels, EntityKind::Device, updates)?;
        if let Some(role) = updates.get("role") {
            self.require_role(RoleKind::Device, role)?;
        }
        if target.is_primary() && updates.get("enabled").and_then(|v| v.as_bool()) == Some(false) {
            return Err(Error::InvalidRequest(
                "the primary device cannot be disabled".to_string(),
            ));
        }

        self.mutate(
            AuditRecord::new(
                AuditCommand::UpdateDevice,
                device_path(&owner.name, &target.name),
            ),
            || self.db.update_device_by_id(device_id, updates),
        )
    }

    pub fn update_device(&self, path: &str, updates: &Updates) -> Result<()> {
        let device = self.db.read_device(path).map_err(denied)?;
        self.update_device_by_id(device.device_id, updates)
    }

    /// Delete a device and its streams. The primary device goes only with
    /// its account.
    pub fn delete_device_by_id(&self, device_id: i64) -> Result<()> {
        let caller = self.caller()?;
        let target = self.db.read_device_by_id(device_id).map_err(denied)?;
        caller
            .relation_to_device(&target)
            .require(PermissionLevel::User)?;
        if target.is_primary() {
            return Err(Error::InvalidRequest(
                "the primary device cannot be deleted".to_string(),
            ));
        }

        let owner = self.db.read_user_by_id(target.user_id).map_err(denied)?;
        self.mutate(
            AuditRecord::new(
                AuditCommand::DeleteDevice,
                device_path(&owner.name, &target.name),
            ),
            || self.db.delete_device_by_id(device_id),
        )
    }

    pub fn delete_device(&self, path: &str) -> Result<()> {
        let device = self.db.read_device(path).map_err(denied)?;
        self.delete_device_by_id(device.device_id)
    }

    /// A device is visible to its own account and, when public, to anyone.
    fn visible_device(&self, caller: &CallerContext, device: Device) -> Result<Device> {
        if !caller
            .relation_to_device(&device)
            .at_least(PermissionLevel::Device)
            && !device.public
        {
            return Err(Error::AccessDenied);
        }
        self.mask_device(caller, device)
    }

    fn mask_device(&self, caller: &CallerContext, mut device: Device) -> Result<Device> {
        let levels = caller.access_levels(
            &self.policy,
            device.user_id,
            device.public,
            caller.is_device(device.device_id),
        )?;
        mask_unreadable_fields(&self.policy, &levels, &mut device)?;
        Ok(device)
    }
}
