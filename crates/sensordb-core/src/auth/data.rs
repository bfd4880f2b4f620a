//! Stream data I/O and subscriptions.

use sensordb_proto::path::{Address, DOWNLINK_SUBSTREAM};
use sensordb_proto::{DatapointArray, Device, Stream};

use super::{denied, AuthOperator};
use crate::bus::SubscriptionScope;
use crate::context::CallerContext;
use crate::error::{Error, Result};
use crate::field_access::{can_access_stream_data, AccessMode};
use crate::operator::BaseOperator;
use crate::permission::PermissionLevel;

/// A caller resolved against one stream.
struct StreamAccess {
    caller: CallerContext,
    stream: Stream,
    owner: Device,
    relation: PermissionLevel,
}

impl StreamAccess {
    fn is_owner(&self) -> bool {
        self.caller.is_device(self.owner.device_id)
    }
}

impl<O: BaseOperator> AuthOperator<O> {
    fn stream_access(&self, stream_id: i64) -> Result<StreamAccess> {
        let caller = self.caller()?;
        let (stream, owner) = self.stream_with_owner(stream_id)?;
        let relation = caller.relation_to_stream(&stream, &owner);
        Ok(StreamAccess {
            caller,
            stream,
            owner,
            relation,
        })
    }

    /// Reading data needs the stream to be visible and the data gate open
    /// in both access levels.
    fn require_data_read(&self, access: &StreamAccess) -> Result<()> {
        if !access.relation.at_least(PermissionLevel::Family) && !access.owner.public {
            return Err(Error::AccessDenied);
        }
        let levels = access.caller.access_levels(
            &self.policy,
            access.owner.user_id,
            access.owner.public,
            access.is_owner(),
        )?;
        if !can_access_stream_data(&self.policy, &levels, AccessMode::Read)? {
            tracing::debug!(stream = access.stream.stream_id, "stream data not readable");
            return Err(Error::AccessDenied);
        }
        Ok(())
    }

    /// Append datapoints to a stream.
    ///
    /// The caller needs at least device-level access and a device allowed to
    /// write. Writers within the owning account also need the write data
    /// gate open in both access levels; a cross-account downlink writer is
    /// exempt. Writing into another device's stream also requires
    /// `can_write_anywhere` unless the caller controls the account. Points
    /// written by the owning device carry no sender; anyone else's points
    /// are stamped with the writer's path, and land in the downlink
    /// substream of a downlink stream unless another substream is named.
    /// Stored points are published to the stream's address.
    pub fn insert_stream_by_id(
        &self,
        stream_id: i64,
        substream: &str,
        mut data: DatapointArray,
        restamp: bool,
    ) -> Result<()> {
        let access = self.stream_access(stream_id)?;
        access.relation.require(PermissionLevel::Device)?;
        if !access.caller.device.can_write {
            return Err(Error::AccessDenied);
        }
        if access.relation.at_least(PermissionLevel::Family) {
            let levels = access.caller.access_levels(
                &self.policy,
                access.owner.user_id,
                access.owner.public,
                access.is_owner(),
            )?;
            if !can_access_stream_data(&self.policy, &levels, AccessMode::Write)? {
                tracing::debug!(stream = stream_id, "stream data not writable");
                return Err(Error::AccessDenied);
            }
        }

        let mut substream = substream;
        if access.is_owner() {
            for point in data.iter_mut() {
                point.sender.clear();
            }
        } else {
            if access.relation < PermissionLevel::User
                && !access.caller.device.can_write_anywhere
            {
                return Err(Error::AccessDenied);
            }
            for point in data.iter_mut() {
                point.sender = self.device_path.clone();
            }
            if access.stream.downlink && substream.is_empty() {
                substream = DOWNLINK_SUBSTREAM;
            }
        }

        tracing::trace!(
            stream = stream_id,
            substream,
            count = data.len(),
            writer = %self.device_path,
            "inserting datapoints"
        );
        let mut address = self.stream_path_of(&access.owner, &access.stream.name)?;
        if !substream.is_empty() {
            address = format!("{}/{}", address, substream);
        }
        self.db
            .insert_stream_by_id(stream_id, substream, data.clone(), restamp)?;
        if let Err(err) = self.journal.bus().publish(&address, &data) {
            tracing::warn!(error = %err, address = %address, "failed to publish datapoints");
        }
        Ok(())
    }

    /// Append datapoints by `user/device/stream` path.
    pub fn insert_stream(&self, path: &str, data: DatapointArray, restamp: bool) -> Result<()> {
        let stream = self.db.read_stream(path).map_err(denied)?;
        self.insert_stream_by_id(stream.stream_id, "", data, restamp)
    }

    pub fn length_stream_by_id(&self, stream_id: i64, substream: &str) -> Result<u64> {
        let access = self.stream_access(stream_id)?;
        self.require_data_read(&access)?;
        self.db.length_stream_by_id(stream_id, substream)
    }

    pub fn time_to_index_stream_by_id(
        &self,
        stream_id: i64,
        substream: &str,
        time: f64,
    ) -> Result<u64> {
        let access = self.stream_access(stream_id)?;
        self.require_data_read(&access)?;
        self.db.time_to_index_stream_by_id(stream_id, substream, time)
    }

    pub fn get_stream_time_range_by_id(
        &self,
        stream_id: i64,
        substream: &str,
        t1: f64,
        t2: f64,
        limit: u64,
    ) -> Result<DatapointArray> {
        let access = self.stream_access(stream_id)?;
        self.require_data_read(&access)?;
        self.db
            .get_stream_time_range_by_id(stream_id, substream, t1, t2, limit)
    }

    pub fn get_stream_index_range_by_id(
        &self,
        stream_id: i64,
        substream: &str,
        i1: i64,
        i2: i64,
    ) -> Result<DatapointArray> {
        let access = self.stream_access(stream_id)?;
        self.require_data_read(&access)?;
        self.db
            .get_stream_index_range_by_id(stream_id, substream, i1, i2)
    }

    /// Subscribe the acting device to an account, device or stream address.
    ///
    /// The target must be readable, and a stream's data must be too. An
    /// account or device subscription covers the streams below it only for
    /// callers that may read every stream of the account; anyone else gets
    /// the exact address alone.
    pub fn subscribe(&self, address: &str) -> Result<u64> {
        let scope = match Address::parse(address)? {
            Address::User(user) => {
                let user = self.read_user(user)?;
                self.account_scope(user.user_id)?
            }
            Address::Device(..) => {
                let device = self.read_device(address)?;
                self.account_scope(device.user_id)?
            }
            Address::Stream {
                user,
                device,
                stream,
                ..
            } => {
                let user = self.db.read_user(user).map_err(denied)?;
                let device = self
                    .db
                    .read_device_by_user_id(user.user_id, device)
                    .map_err(denied)?;
                let stream = self
                    .db
                    .read_stream_by_device_id(device.device_id, stream)
                    .map_err(denied)?;
                let access = self.stream_access(stream.stream_id)?;
                self.require_data_read(&access)?;
                SubscriptionScope::Subtree
            }
        };
        self.journal.bus().subscribe(&self.device_path, address, scope)
    }

    /// Whether the caller may follow everything published under an account.
    fn account_scope(&self, account_id: i64) -> Result<SubscriptionScope> {
        let caller = self.caller()?;
        let account = self.db.read_user_by_id(account_id).map_err(denied)?;
        if !caller
            .relation_to_user(&account)
            .at_least(PermissionLevel::Family)
        {
            return Ok(SubscriptionScope::Exact);
        }
        for is_self in [false, true] {
            let levels = caller.access_levels(&self.policy, account_id, false, is_self)?;
            if !can_access_stream_data(&self.policy, &levels, AccessMode::Read)? {
                return Ok(SubscriptionScope::Exact);
            }
        }
        Ok(SubscriptionScope::Subtree)
    }

    pub fn unsubscribe(&self, subscription_id: u64) -> Result<()> {
        self.caller()?;
        self.journal.bus().unsubscribe(subscription_id)
    }
}
