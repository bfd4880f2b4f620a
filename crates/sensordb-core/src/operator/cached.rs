//! Caching decorator for a storage operator.

use sensordb_proto::path::{device_path, stream_path};
use sensordb_proto::{DatapointArray, Device, NewUser, Stream, Updates, User};

use super::BaseOperator;
use crate::cache::TimedCache;
use crate::config::CacheConfig;
use crate::error::Result;

/// Reads accounts, devices and streams through three [`TimedCache`]s.
///
/// Accounts are named by account name, devices by `user/device` and streams
/// by `user/device/stream`. Updates and deletes made through this operator
/// invalidate the affected entries; changes made behind its back become
/// visible once the entries expire.
pub struct CachedOperator<O> {
    inner: O,
    users: TimedCache<User>,
    devices: TimedCache<Device>,
    streams: TimedCache<Stream>,
}

impl<O: BaseOperator> CachedOperator<O> {
    /// Wrap `inner`. Fails when the configuration is invalid.
    pub fn new(inner: O, config: &CacheConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner,
            users: TimedCache::new(config.user_cache_size, config.ttl()),
            devices: TimedCache::new(config.device_cache_size, config.ttl()),
            streams: TimedCache::new(config.stream_cache_size, config.ttl()),
        })
    }

    pub fn inner(&self) -> &O {
        &self.inner
    }

    pub fn user_cache(&self) -> &TimedCache<User> {
        &self.users
    }

    pub fn device_cache(&self) -> &TimedCache<Device> {
        &self.devices
    }

    pub fn stream_cache(&self) -> &TimedCache<Stream> {
        &self.streams
    }

    /// Drop every cached entity.
    pub fn purge(&self) {
        self.users.purge();
        self.devices.purge();
        self.streams.purge();
    }

    fn cache_user(&self, user: &User) {
        self.users.set(&user.name, user.user_id, user.clone());
    }

    /// Cache a device under its path when the owning account's name is known.
    fn cache_device(&self, device: &Device, user_name: Option<&str>) {
        match user_name {
            Some(user) => self.devices.set(
                &device_path(user, &device.name),
                device.device_id,
                device.clone(),
            ),
            None => self.devices.set_id(device.device_id, device.clone()),
        }
    }

    /// Cache a stream under its path when the owning device's path is known.
    fn cache_stream(&self, stream: &Stream, device_path: Option<&str>) {
        match device_path {
            Some(device) => self.streams.set(
                &format!("{}/{}", device, stream.name),
                stream.stream_id,
                stream.clone(),
            ),
            None => self.streams.set_id(stream.stream_id, stream.clone()),
        }
    }

    fn cached_user_name(&self, user_id: i64) -> Option<String> {
        self.users.get_by_id(user_id).map(|(user, _)| user.name)
    }

    fn cached_device_path(&self, device_id: i64) -> Option<String> {
        self.devices.get_by_id(device_id).and_then(|(_, name)| name)
    }
}

impl<O: BaseOperator> BaseOperator for CachedOperator<O> {
    fn count_users(&self) -> Result<u64> {
        self.inner.count_users()
    }

    fn read_all_users(&self) -> Result<Vec<User>> {
        let users = self.inner.read_all_users()?;
        for user in &users {
            self.cache_user(user);
        }
        Ok(users)
    }

    fn create_user(&self, user: &NewUser) -> Result<()> {
        self.inner.create_user(user)
    }

    fn read_user(&self, name: &str) -> Result<User> {
        if let Some(user) = self.users.get_by_name(name) {
            return Ok(user);
        }
        let user = self.inner.read_user(name)?;
        self.cache_user(&user);
        Ok(user)
    }

    fn read_user_by_id(&self, user_id: i64) -> Result<User> {
        if let Some((user, _)) = self.users.get_by_id(user_id) {
            return Ok(user);
        }
        let user = self.inner.read_user_by_id(user_id)?;
        self.cache_user(&user);
        Ok(user)
    }

    fn update_user_by_id(&self, user_id: i64, updates: &Updates) -> Result<()> {
        let result = self.inner.update_user_by_id(user_id, updates);
        self.users.remove_id(user_id);
        result
    }

    fn delete_user_by_id(&self, user_id: i64) -> Result<()> {
        let name = match self.cached_user_name(user_id) {
            Some(name) => Some(name),
            None => self.inner.read_user_by_id(user_id).ok().map(|u| u.name),
        };
        let result = self.inner.delete_user_by_id(user_id);

        self.users.remove_id(user_id);
        if let Some(name) = name {
            let prefix = format!("{}/", name);
            self.devices.unlink_name_prefix(&prefix);
            self.streams.unlink_name_prefix(&prefix);
            tracing::debug!(user = %name, "unlinked cached paths of deleted account");
        }
        result
    }

    fn count_devices(&self) -> Result<u64> {
        self.inner.count_devices()
    }

    fn read_all_devices_by_user_id(&self, user_id: i64) -> Result<Vec<Device>> {
        let devices = self.inner.read_all_devices_by_user_id(user_id)?;
        let user_name = self.cached_user_name(user_id);
        for device in &devices {
            self.cache_device(device, user_name.as_deref());
        }
        Ok(devices)
    }

    fn create_device_by_user_id(&self, user_id: i64, name: &str) -> Result<()> {
        self.inner.create_device_by_user_id(user_id, name)
    }

    fn read_device_by_id(&self, device_id: i64) -> Result<Device> {
        if let Some((device, _)) = self.devices.get_by_id(device_id) {
            return Ok(device);
        }
        let device = self.inner.read_device_by_id(device_id)?;
        let user_name = self.cached_user_name(device.user_id);
        self.cache_device(&device, user_name.as_deref());
        Ok(device)
    }

    fn read_device_by_user_id(&self, user_id: i64, name: &str) -> Result<Device> {
        let user_name = self.cached_user_name(user_id);
        if let Some(user) = &user_name {
            if let Some(device) = self.devices.get_by_name(&device_path(user, name)) {
                return Ok(device);
            }
        }
        let device = self.inner.read_device_by_user_id(user_id, name)?;
        self.cache_device(&device, user_name.as_deref());
        Ok(device)
    }

    fn update_device_by_id(&self, device_id: i64, updates: &Updates) -> Result<()> {
        let result = self.inner.update_device_by_id(device_id, updates);
        self.devices.remove_id(device_id);
        result
    }

    fn delete_device_by_id(&self, device_id: i64) -> Result<()> {
        let path = self.cached_device_path(device_id);
        let result = self.inner.delete_device_by_id(device_id);

        self.devices.remove_id(device_id);
        match path {
            Some(path) => self.streams.unlink_name_prefix(&format!("{}/", path)),
            // Without the path the streams' names cannot be found.
            None => self.streams.purge_names(),
        }
        result
    }

    fn count_streams(&self) -> Result<u64> {
        self.inner.count_streams()
    }

    fn read_all_streams_by_device_id(&self, device_id: i64) -> Result<Vec<Stream>> {
        let streams = self.inner.read_all_streams_by_device_id(device_id)?;
        let path = self.cached_device_path(device_id);
        for stream in &streams {
            self.cache_stream(stream, path.as_deref());
        }
        Ok(streams)
    }

    fn create_stream_by_device_id(&self, device_id: i64, name: &str, schema: &str) -> Result<()> {
        self.inner.create_stream_by_device_id(device_id, name, schema)
    }

    fn read_stream_by_id(&self, stream_id: i64) -> Result<Stream> {
        if let Some((stream, _)) = self.streams.get_by_id(stream_id) {
            return Ok(stream);
        }
        let stream = self.inner.read_stream_by_id(stream_id)?;
        let path = self.cached_device_path(stream.device_id);
        self.cache_stream(&stream, path.as_deref());
        Ok(stream)
    }

    fn read_stream_by_device_id(&self, device_id: i64, name: &str) -> Result<Stream> {
        let path = self.cached_device_path(device_id);
        if let Some(device) = &path {
            if let Some(stream) = self.streams.get_by_name(&format!("{}/{}", device, name)) {
                return Ok(stream);
            }
        }
        let stream = self.inner.read_stream_by_device_id(device_id, name)?;
        self.cache_stream(&stream, path.as_deref());
        Ok(stream)
    }

    fn update_stream_by_id(&self, stream_id: i64, updates: &Updates) -> Result<()> {
        let result = self.inner.update_stream_by_id(stream_id, updates);
        self.streams.remove_id(stream_id);
        result
    }

    fn delete_stream_by_id(&self, stream_id: i64) -> Result<()> {
        let result = self.inner.delete_stream_by_id(stream_id);
        self.streams.remove_id(stream_id);
        result
    }

    fn length_stream_by_id(&self, stream_id: i64, substream: &str) -> Result<u64> {
        self.inner.length_stream_by_id(stream_id, substream)
    }

    fn time_to_index_stream_by_id(&self, stream_id: i64, substream: &str, time: f64) -> Result<u64> {
        self.inner.time_to_index_stream_by_id(stream_id, substream, time)
    }

    fn insert_stream_by_id(
        &self,
        stream_id: i64,
        substream: &str,
        data: DatapointArray,
        restamp: bool,
    ) -> Result<()> {
        self.inner
            .insert_stream_by_id(stream_id, substream, data, restamp)
    }

    fn get_stream_time_range_by_id(
        &self,
        stream_id: i64,
        substream: &str,
        t1: f64,
        t2: f64,
        limit: u64,
    ) -> Result<DatapointArray> {
        self.inner
            .get_stream_time_range_by_id(stream_id, substream, t1, t2, limit)
    }

    fn get_stream_index_range_by_id(
        &self,
        stream_id: i64,
        substream: &str,
        i1: i64,
        i2: i64,
    ) -> Result<DatapointArray> {
        self.inner
            .get_stream_index_range_by_id(stream_id, substream, i1, i2)
    }

    // Path reads go through the caches level by level.
    fn read_stream(&self, path: &str) -> Result<Stream> {
        let (user, device, stream) = sensordb_proto::path::split_stream_path(path)?;
        if let Some(stream) = self.streams.get_by_name(&stream_path(user, device, stream)) {
            return Ok(stream);
        }
        let user = self.read_user(user)?;
        let device = self.read_device_by_user_id(user.user_id, device)?;
        self.read_stream_by_device_id(device.device_id, stream)
    }
}
