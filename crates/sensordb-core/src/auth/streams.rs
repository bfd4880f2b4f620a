//! Stream operations.

use sensordb_proto::path::{split_stream_path, stream_path};
use sensordb_proto::{Device, EntityKind, Stream, Updates};

use super::{collect_visible, denied, AuthOperator};
use crate::audit::{AuditCommand, AuditRecord};
use crate::context::CallerContext;
use crate::error::{Error, Result};
use crate::field_access::{check_field_update_permitted, mask_unreadable_fields};
use crate::operator::BaseOperator;
use crate::permission::PermissionLevel;

impl<O: BaseOperator> AuthOperator<O> {
    pub fn count_streams(&self) -> Result<u64> {
        let caller = self.caller()?;
        self.require_count(&caller)?;
        self.db.count_streams()
    }

    pub fn read_all_streams_by_device_id(&self, device_id: i64) -> Result<Vec<Stream>> {
        let caller = self.caller()?;
        let owner = self.db.read_device_by_id(device_id).map_err(denied)?;
        let streams = self.db.read_all_streams_by_device_id(device_id)?;
        if caller
            .relation_to_device(&owner)
            .at_least(PermissionLevel::Family)
        {
            return streams
                .into_iter()
                .map(|stream| self.mask_stream(&caller, &owner, stream))
                .collect();
        }
        collect_visible(streams, |stream| self.visible_stream(&caller, &owner, stream))
    }

    pub fn read_all_streams(&self, device: &str) -> Result<Vec<Stream>> {
        let device = self.db.read_device(device).map_err(denied)?;
        self.read_all_streams_by_device_id(device.device_id)
    }

    pub fn create_stream_by_device_id(
        &self,
        device_id: i64,
        name: &str,
        schema: &str,
    ) -> Result<()> {
        let caller = self.caller()?;
        let owner = self.db.read_device_by_id(device_id).map_err(denied)?;
        caller
            .relation_to_device(&owner)
            .require(PermissionLevel::User)?;

        let path = self.stream_path_of(&owner, name)?;
        self.mutate(AuditRecord::new(AuditCommand::CreateStream, path), || {
            self.db.create_stream_by_device_id(device_id, name, schema)
        })
    }

    /// Create a stream by `user/device/stream` path.
    pub fn create_stream(&self, path: &str, schema: &str) -> Result<()> {
        let (user, device, name) = split_stream_path(path)?;
        let user = self.db.read_user(user).map_err(denied)?;
        let device = self
            .db
            .read_device_by_user_id(user.user_id, device)
            .map_err(denied)?;
        self.create_stream_by_device_id(device.device_id, name, schema)
    }

    pub fn read_stream_by_id(&self, stream_id: i64) -> Result<Stream> {
        let caller = self.caller()?;
        let stream = self.db.read_stream_by_id(stream_id).map_err(denied)?;
        let owner = self.db.read_device_by_id(stream.device_id).map_err(denied)?;
        self.visible_stream(&caller, &owner, stream)
    }

    pub fn read_stream_by_device_id(&self, device_id: i64, name: &str) -> Result<Stream> {
        let caller = self.caller()?;
        let owner = self.db.read_device_by_id(device_id).map_err(denied)?;
        let stream = self
            .db
            .read_stream_by_device_id(device_id, name)
            .map_err(denied)?;
        self.visible_stream(&caller, &owner, stream)
    }

    pub fn read_stream(&self, path: &str) -> Result<Stream> {
        let caller = self.caller()?;
        let stream = self.db.read_stream(path).map_err(denied)?;
        let owner = self.db.read_device_by_id(stream.device_id).map_err(denied)?;
        self.visible_stream(&caller, &owner, stream)
    }

    pub fn update_stream_by_id(&self, stream_id: i64, updates: &Updates) -> Result<()> {
        let caller = self.caller()?;
        let (stream, owner) = self.stream_with_owner(stream_id)?;
        caller
            .relation_to_stream(&stream, &owner)
            .require(PermissionLevel::User)?;

        let levels = caller.access_levels(
            &self.policy,
            owner.user_id,
            owner.public,
            caller.is_device(owner.device_id),
        )?;
        check_field_update_permitted(&self.policy, &levels, EntityKind::Stream, updates)?;

        let path = self.stream_path_of(&owner, &stream.name)?;
        self.mutate(AuditRecord::new(AuditCommand::UpdateStream, path), || {
            self.db.update_stream_by_id(stream_id, updates)
        })
    }

    pub fn update_stream(&self, path: &str, updates: &Updates) -> Result<()> {
        let stream = self.db.read_stream(path).map_err(denied)?;
        self.update_stream_by_id(stream.stream_id, updates)
    }

    pub fn delete_stream_by_id(&self, stream_id: i64) -> Result<()> {
        let caller = self.caller()?;
        let (stream, owner) = self.stream_with_owner(stream_id)?;
        caller
            .relation_to_stream(&stream, &owner)
            .require(PermissionLevel::User)?;

        let path = self.stream_path_of(&owner, &stream.name)?;
        self.mutate(AuditRecord::new(AuditCommand::DeleteStream, path), || {
            self.db.delete_stream_by_id(stream_id)
        })
    }

    pub fn delete_stream(&self, path: &str) -> Result<()> {
        let stream = self.db.read_stream(path).map_err(denied)?;
        self.delete_stream_by_id(stream.stream_id)
    }

    pub(super) fn stream_with_owner(&self, stream_id: i64) -> Result<(Stream, Device)> {
        let stream = self.db.read_stream_by_id(stream_id).map_err(denied)?;
        let owner = self.db.read_device_by_id(stream.device_id).map_err(denied)?;
        Ok((stream, owner))
    }

    pub(super) fn stream_path_of(&self, owner: &Device, name: &str) -> Result<String> {
        let user = self.db.read_user_by_id(owner.user_id).map_err(denied)?;
        Ok(stream_path(&user.name, &owner.name, name))
    }

    /// A stream is visible to its own account and, when its device is
    /// public, to anyone.
    fn visible_stream(
        &self,
        caller: &CallerContext,
        owner: &Device,
        stream: Stream,
    ) -> Result<Stream> {
        if !caller
            .relation_to_stream(&stream, owner)
            .at_least(PermissionLevel::Device)
            && !owner.public
        {
            return Err(Error::AccessDenied);
        }
        self.mask_stream(caller, owner, stream)
    }

    fn mask_stream(
        &self,
        caller: &CallerContext,
        owner: &Device,
        mut stream: Stream,
    ) -> Result<Stream> {
        let levels = caller.access_levels(
            &self.policy,
            owner.user_id,
            owner.public,
            caller.is_device(owner.device_id),
        )?;
        mask_unreadable_fields(&self.policy, &levels, &mut stream)?;
        Ok(stream)
    }
}
