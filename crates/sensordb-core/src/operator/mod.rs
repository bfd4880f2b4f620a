//! The storage operator surface.
//!
//! [`BaseOperator`] is implemented by storage backends and by the decorators
//! layered over them: [`CachedOperator`] adds the entity caches and the
//! authorization layer enforces access on top.

mod cached;
mod memory;

pub use cached::CachedOperator;
pub use memory::MemoryOperator;

use sensordb_proto::path::{split_device_path, split_stream_path};
use sensordb_proto::{DatapointArray, Device, NewUser, Stream, Updates, User};

use crate::error::Result;

/// CRUD over accounts, devices and streams plus stream data I/O.
///
/// Reads are side-effect free. Implementations are shared across threads.
pub trait BaseOperator: Send + Sync {
    fn count_users(&self) -> Result<u64>;
    fn read_all_users(&self) -> Result<Vec<User>>;
    /// Create an account together with its primary device.
    fn create_user(&self, user: &NewUser) -> Result<()>;
    fn read_user(&self, name: &str) -> Result<User>;
    fn read_user_by_id(&self, user_id: i64) -> Result<User>;
    fn update_user_by_id(&self, user_id: i64, updates: &Updates) -> Result<()>;
    /// Delete an account with all of its devices and streams.
    fn delete_user_by_id(&self, user_id: i64) -> Result<()>;

    fn count_devices(&self) -> Result<u64>;
    fn read_all_devices_by_user_id(&self, user_id: i64) -> Result<Vec<Device>>;
    fn create_device_by_user_id(&self, user_id: i64, name: &str) -> Result<()>;
    fn read_device_by_id(&self, device_id: i64) -> Result<Device>;
    fn read_device_by_user_id(&self, user_id: i64, name: &str) -> Result<Device>;
    fn update_device_by_id(&self, device_id: i64, updates: &Updates) -> Result<()>;
    fn delete_device_by_id(&self, device_id: i64) -> Result<()>;

    fn count_streams(&self) -> Result<u64>;
    fn read_all_streams_by_device_id(&self, device_id: i64) -> Result<Vec<Stream>>;
    fn create_stream_by_device_id(&self, device_id: i64, name: &str, schema: &str)
        -> Result<()>;
    fn read_stream_by_id(&self, stream_id: i64) -> Result<Stream>;
    fn read_stream_by_device_id(&self, device_id: i64, name: &str) -> Result<Stream>;
    fn update_stream_by_id(&self, stream_id: i64, updates: &Updates) -> Result<()>;
    fn delete_stream_by_id(&self, stream_id: i64) -> Result<()>;

    fn length_stream_by_id(&self, stream_id: i64, substream: &str) -> Result<u64>;
    /// Index of the first datapoint later than `time`.
    fn time_to_index_stream_by_id(&self, stream_id: i64, substream: &str, time: f64)
        -> Result<u64>;
    /// Append datapoints. With `restamp`, points not later than the stream's
    /// last point are stamped with the current time instead of rejected.
    fn insert_stream_by_id(
        &self,
        stream_id: i64,
        substream: &str,
        data: DatapointArray,
        restamp: bool,
    ) -> Result<()>;
    /// Datapoints with `t1 < t <= t2`, at most `limit` of them (0 is no limit).
    fn get_stream_time_range_by_id(
        &self,
        stream_id: i64,
        substream: &str,
        t1: f64,
        t2: f64,
        limit: u64,
    ) -> Result<DatapointArray>;
    /// Datapoints with index in `[i1, i2)`. Negative indices count from the end.
    fn get_stream_index_range_by_id(
        &self,
        stream_id: i64,
        substream: &str,
        i1: i64,
        i2: i64,
    ) -> Result<DatapointArray>;

    /// Read a device by `user/device` path.
    fn read_device(&self, path: &str) -> Result<Device> {
        let (user, device) = split_device_path(path)?;
        let user = self.read_user(user)?;
        self.read_device_by_user_id(user.user_id, device)
    }

    /// Read a stream by `user/device/stream` path.
    fn read_stream(&self, path: &str) -> Result<Stream> {
        let (user, device, stream) = split_stream_path(path)?;
        let user = self.read_user(user)?;
        let device = self.read_device_by_user_id(user.user_id, device)?;
        self.read_stream_by_device_id(device.device_id, stream)
    }

    fn create_device(&self, path: &str) -> Result<()> {
        let (user, device) = split_device_path(path)?;
        let user = self.read_user(user)?;
        self.create_device_by_user_id(user.user_id, device)
    }

    fn create_stream(&self, path: &str, schema: &str) -> Result<()> {
        let (user, device, stream) = split_stream_path(path)?;
        let user = self.read_user(user)?;
        let device = self.read_device_by_user_id(user.user_id, device)?;
        self.create_stream_by_device_id(device.device_id, stream, schema)
    }
}
