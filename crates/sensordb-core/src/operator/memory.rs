//! In-memory storage operator.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;
use sensordb_proto::datapoint::now_seconds;
use sensordb_proto::path::validate_name;
use sensordb_proto::{
    DatapointArray, Device, Entity, NewUser, Stream, Updates, User, PRIMARY_DEVICE_NAME,
};
use uuid::Uuid;

use super::BaseOperator;
use crate::error::{Error, Result};

/// Role given to devices created without one.
const DEFAULT_DEVICE_ROLE: &str = "none";

#[derive(Default)]
struct State {
    last_id: i64,
    users: BTreeMap<i64, User>,
    devices: BTreeMap<i64, Device>,
    streams: BTreeMap<i64, Stream>,
    data: HashMap<(i64, String), DatapointArray>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn user(&self, user_id: i64) -> Result<&User> {
        self.users
            .get(&user_id)
            .ok_or_else(|| Error::NotFound(format!("user {}", user_id)))
    }

    fn device(&self, device_id: i64) -> Result<&Device> {
        self.devices
            .get(&device_id)
            .ok_or_else(|| Error::NotFound(format!("device {}", device_id)))
    }

    fn stream(&self, stream_id: i64) -> Result<&Stream> {
        self.streams
            .get(&stream_id)
            .ok_or_else(|| Error::NotFound(format!("stream {}", stream_id)))
    }

    fn insert_device(&mut self, user_id: i64, name: &str, primary: bool) -> Result<()> {
        validate_name(name)?;
        if self
            .devices
            .values()
            .any(|d| d.user_id == user_id && d.name == name)
        {
            return Err(Error::AlreadyExists(format!("device '{}'", name)));
        }

        let device_id = self.next_id();
        self.devices.insert(
            device_id,
            Device {
                device_id,
                user_id,
                name: name.to_string(),
                apikey: new_api_key(),
                enabled: true,
                role: DEFAULT_DEVICE_ROLE.to_string(),
                visible: true,
                user_editable: !primary,
                can_write: true,
                can_write_anywhere: primary,
                can_act_as_user: primary,
                ..Default::default()
            },
        );
        Ok(())
    }

    fn remove_stream(&mut self, stream_id: i64) {
        self.streams.remove(&stream_id);
        self.data.retain(|(id, _), _| *id != stream_id);
    }

    fn remove_device(&mut self, device_id: i64) {
        self.devices.remove(&device_id);
        let streams: Vec<i64> = self
            .streams
            .values()
            .filter(|s| s.device_id == device_id)
            .map(|s| s.stream_id)
            .collect();
        for stream_id in streams {
            self.remove_stream(stream_id);
        }
    }
}

fn new_api_key() -> String {
    Uuid::new_v4().to_string()
}

fn reject_rename(current: &str, updates: &Updates, kind: &str) -> Result<()> {
    match updates.get("name") {
        Some(name) if name.as_str() != Some(current) => Err(Error::InvalidRequest(format!(
            "{} names cannot be changed",
            kind
        ))),
        _ => Ok(()),
    }
}

/// A [`BaseOperator`] that keeps everything in memory.
#[derive(Default)]
pub struct MemoryOperator {
    state: RwLock<State>,
}

impl MemoryOperator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a device's global administrator flag.
    pub fn set_device_admin(&self, device_id: i64, admin: bool) -> Result<()> {
        let mut state = self.state.write();
        let device = state
            .devices
            .get_mut(&device_id)
            .ok_or_else(|| Error::NotFound(format!("device {}", device_id)))?;
        device.admin = admin;
        Ok(())
    }
}

impl BaseOperator for MemoryOperator {
    fn count_users(&self) -> Result<u64> {
        Ok(self.state.read().users.len() as u64)
    }

    fn read_all_users(&self) -> Result<Vec<User>> {
        Ok(self.state.read().users.values().cloned().collect())
    }

    fn create_user(&self, user: &NewUser) -> Result<()> {
        validate_name(&user.name)?;
        let mut state = self.state.write();
        if state.users.values().any(|u| u.name == user.name) {
            return Err(Error::AlreadyExists(format!("user '{}'", user.name)));
        }
        if state.users.values().any(|u| u.email == user.email) {
            return Err(Error::AlreadyExists(format!("email '{}'", user.email)));
        }

        let user_id = state.next_id();
        state.users.insert(
            user_id,
            User {
                user_id,
                name: user.name.clone(),
                email: user.email.clone(),
                password: user.password.clone(),
                role: user.role.clone(),
                public: user.public,
                ..Default::default()
            },
        );
        state.insert_device(user_id, PRIMARY_DEVICE_NAME, true)
    }

    fn read_user(&self, name: &str) -> Result<User> {
        self.state
            .read()
            .users
            .values()
            .find(|u| u.name == name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("user '{}'", name)))
    }

    fn read_user_by_id(&self, user_id: i64) -> Result<User> {
        self.state.read().user(user_id).cloned()
    }

    fn update_user_by_id(&self, user_id: i64, updates: &Updates) -> Result<()> {
        let mut state = self.state.write();
        let mut user = state.user(user_id)?.clone();
        reject_rename(&user.name, updates, "account")?;
        user.apply_updates(updates)?;
        state.users.insert(user_id, user);
        Ok(())
    }

    fn delete_user_by_id(&self, user_id: i64) -> Result<()> {
        let mut state = self.state.write();
        state.user(user_id)?;
        state.users.remove(&user_id);
        let devices: Vec<i64> = state
            .devices
            .values()
            .filter(|d| d.user_id == user_id)
            .map(|d| d.device_id)
            .collect();
        for device_id in devices {
            state.remove_device(device_id);
        }
        Ok(())
    }

    fn count_devices(&self) -> Result<u64> {
        Ok(self.state.read().devices.len() as u64)
    }

    fn read_all_devices_by_user_id(&self, user_id: i64) -> Result<Vec<Device>> {
        let state = self.state.read();
        state.user(user_id)?;
        Ok(state
            .devices
            .values()
            .filter(|d| d.user_id == user_id)
            .cloned()
            .collect())
    }

    fn create_device_by_user_id(&self, user_id: i64, name: &str) -> Result<()> {
        let mut state = self.state.write();
        state.user(user_id)?;
        state.insert_device(user_id, name, false)
    }

    fn read_device_by_id(&self, device_id: i64) -> Result<Device> {
        self.state.read().device(device_id).cloned()
    }

    fn read_device_by_user_id(&self, user_id: i64, name: &str) -> Result<Device> {
        self.state
            .read()
            .devices
            .values()
            .find(|d| d.user_id == user_id && d.name == name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("device '{}'", name)))
    }

    fn update_device_by_id(&self, device_id: i64, updates: &Updates) -> Result<()> {
        let mut state = self.state.write();
        let mut device = state.device(device_id)?.clone();
        reject_rename(&device.name, updates, "device")?;
        device.apply_updates(updates)?;
        if device.apikey.is_empty() {
            device.apikey = new_api_key();
        }
        state.devices.insert(device_id, device);
        Ok(())
    }

    fn delete_device_by_id(&self, device_id: i64) -> Result<()> {
        let mut state = self.state.write();
        state.device(device_id)?;
        state.remove_device(device_id);
        Ok(())
    }

    fn count_streams(&self) -> Result<u64> {
        Ok(self.state.read().streams.len() as u64)
    }

    fn read_all_streams_by_device_id(&self, device_id: i64) -> Result<Vec<Stream>> {
        let state = self.state.read();
        state.device(device_id)?;
        Ok(state
            .streams
            .values()
            .filter(|s| s.device_id == device_id)
            .cloned()
            .collect())
    }

    fn create_stream_by_device_id(&self, device_id: i64, name: &str, schema: &str) -> Result<()> {
        validate_name(name)?;
        serde_json::from_str::<serde_json::Value>(schema)
            .map_err(|e| Error::InvalidRequest(format!("stream schema is not valid JSON: {}", e)))?;

        let mut state = self.state.write();
        state.device(device_id)?;
        if state
            .streams
            .values()
            .any(|s| s.device_id == device_id && s.name == name)
        {
            return Err(Error::AlreadyExists(format!("stream '{}'", name)));
        }

        let stream_id = state.next_id();
        state.streams.insert(
            stream_id,
            Stream {
                stream_id,
                device_id,
                name: name.to_string(),
                schema: schema.to_string(),
                ..Default::default()
            },
        );
        Ok(())
    }

    fn read_stream_by_id(&self, stream_id: i64) -> Result<Stream> {
        self.state.read().stream(stream_id).cloned()
    }

    fn read_stream_by_device_id(&self, device_id: i64, name: &str) -> Result<Stream> {
        self.state
            .read()
            .streams
            .values()
            .find(|s| s.device_id == device_id && s.name == name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("stream '{}'", name)))
    }

    fn update_stream_by_id(&self, stream_id: i64, updates: &Updates) -> Result<()> {
        let mut state = self.state.write();
        let mut stream = state.stream(stream_id)?.clone();
        reject_rename(&stream.name, updates, "stream")?;
        stream.apply_updates(updates)?;
        state.streams.insert(stream_id, stream);
        Ok(())
    }

    fn delete_stream_by_id(&self, stream_id: i64) -> Result<()> {
        let mut state = self.state.write();
        state.stream(stream_id)?;
        state.remove_stream(stream_id);
        Ok(())
    }

    fn length_stream_by_id(&self, stream_id: i64, substream: &str) -> Result<u64> {
        let state = self.state.read();
        state.stream(stream_id)?;
        Ok(state
            .data
            .get(&(stream_id, substream.to_string()))
            .map_or(0, |points| points.len() as u64))
    }

    fn time_to_index_stream_by_id(&self, stream_id: i64, substream: &str, time: f64) -> Result<u64> {
        let state = self.state.read();
        state.stream(stream_id)?;
        Ok(state
            .data
            .get(&(stream_id, substream.to_string()))
            .map_or(0, |points| points.partition_point(|p| p.timestamp <= time) as u64))
    }

    fn insert_stream_by_id(
        &self,
        stream_id: i64,
        substream: &str,
        data: DatapointArray,
        restamp: bool,
    ) -> Result<()> {
        let mut state = self.state.write();
        state.stream(stream_id)?;
        let key = (stream_id, substream.to_string());

        let mut last = state
            .data
            .get(&key)
            .and_then(|points| points.last())
            .map_or(f64::NEG_INFINITY, |p| p.timestamp);
        let mut staged = Vec::with_capacity(data.len());
        for mut point in data {
            if point.timestamp < last {
                if !restamp {
                    return Err(Error::Storage(format!(
                        "datapoint at {} is older than the stream's last datapoint",
                        point.timestamp
                    )));
                }
                point.timestamp = now_seconds().max(last);
            }
            last = point.timestamp;
            staged.push(point);
        }

        state.data.entry(key).or_default().extend(staged);
        Ok(())
    }

    fn get_stream_time_range_by_id(
        &self,
        stream_id: i64,
        substream: &str,
        t1: f64,
        t2: f64,
        limit: u64,
    ) -> Result<DatapointArray> {
        let state = self.state.read();
        state.stream(stream_id)?;
        let limit = if limit == 0 { usize::MAX } else { limit as usize };
        Ok(state
            .data
            .get(&(stream_id, substream.to_string()))
            .map(|points| {
                points
                    .iter()
                    .filter(|p| p.timestamp > t1 && p.timestamp <= t2)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn get_stream_index_range_by_id(
        &self,
        stream_id: i64,
        substream: &str,
        i1: i64,
        i2: i64,
    ) -> Result<DatapointArray> {
        let state = self.state.read();
        state.stream(stream_id)?;
        let points = match state.data.get(&(stream_id, substream.to_string())) {
            Some(points) => points,
            None => return Ok(Vec::new()),
        };

        let len = points.len() as i64;
        let resolve = |i: i64| {
            let i = if i < 0 { len + i } else { i };
            i.clamp(0, len) as usize
        };
        let (start, end) = (resolve(i1), resolve(i2));
        if start >= end {
            return Ok(Vec::new());
        }
        Ok(points[start..end].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensordb_proto::{Datapoint, FieldValue};
    use serde_json::json;

    fn operator_with_user() -> (MemoryOperator, User) {
        let op = MemoryOperator::new();
        op.create_user(&NewUser::new("alice", "alice@example.com", "pw", "user"))
            .unwrap();
        let user = op.read_user("alice").unwrap();
        (op, user)
    }

    #[test]
    fn test_create_user_makes_primary_device() {
        let (op, user) = operator_with_user();
        let primary = op.read_device("alice/user").unwrap();
        assert_eq!(primary.user_id, user.user_id);
        assert!(primary.acts_as_user());
        assert!(primary.enabled);
        assert!(!primary.apikey.is_empty());
        assert_eq!(op.count_users().unwrap(), 1);
        assert_eq!(op.count_devices().unwrap(), 1);
    }

    #[test]
    fn test_duplicates_rejected() {
        let (op, user) = operator_with_user();
        assert!(matches!(
            op.create_user(&NewUser::new("alice", "other@example.com", "pw", "user")),
            Err(Error::AlreadyExists(_))
        ));
        assert!(matches!(
            op.create_user(&NewUser::new("bob", "alice@example.com", "pw", "user")),
            Err(Error::AlreadyExists(_))
        ));
        op.create_device_by_user_id(user.user_id, "phone").unwrap();
        assert!(matches!(
            op.create_device_by_user_id(user.user_id, "phone"),
            Err(Error::AlreadyExists(_))
        ));
        assert!(op.create_device_by_user_id(user.user_id, "bad name").is_err());
    }

    #[test]
    fn test_updates() {
        let (op, user) = operator_with_user();
        let mut updates = Updates::new();
        updates.insert("nickname".into(), "Al".into());
        op.update_user_by_id(user.user_id, &updates).unwrap();
        assert_eq!(op.read_user("alice").unwrap().nickname, "Al");

        let mut rename = Updates::new();
        rename.insert("name".into(), "alicia".into());
        assert!(matches!(
            op.update_user_by_id(user.user_id, &rename),
            Err(Error::InvalidRequest(_))
        ));

        let mut same_name = Updates::new();
        same_name.insert("name".into(), "alice".into());
        op.update_user_by_id(user.user_id, &same_name).unwrap();
    }

    #[test]
    fn test_cleared_api_key_is_regenerated() {
        let (op, _) = operator_with_user();
        let device = op.read_device("alice/user").unwrap();
        let mut updates = Updates::new();
        updates.insert("apikey".into(), FieldValue::from(""));
        op.update_device_by_id(device.device_id, &updates).unwrap();

        let updated = op.read_device_by_id(device.device_id).unwrap();
        assert!(!updated.apikey.is_empty());
        assert_ne!(updated.apikey, device.apikey);
    }

    #[test]
    fn test_delete_user_cascades() {
        let (op, user) = operator_with_user();
        op.create_stream("alice/user/temp", r#"{"type":"number"}"#)
            .unwrap();
        let stream = op.read_stream("alice/user/temp").unwrap();
        op.insert_stream_by_id(stream.stream_id, "", vec![Datapoint::new(1.0, json!(3))], false)
            .unwrap();

        op.delete_user_by_id(user.user_id).unwrap();
        assert_eq!(op.count_users().unwrap(), 0);
        assert_eq!(op.count_devices().unwrap(), 0);
        assert_eq!(op.count_streams().unwrap(), 0);
        assert!(matches!(
            op.read_stream_by_id(stream.stream_id),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_invalid_schema_rejected() {
        let (op, _) = operator_with_user();
        assert!(matches!(
            op.create_stream("alice/user/temp", "{not json"),
            Err(Error::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_insert_and_ranges() {
        let (op, _) = operator_with_user();
        op.create_stream("alice/user/temp", r#"{"type":"number"}"#)
            .unwrap();
        let id = op.read_stream("alice/user/temp").unwrap().stream_id;

        let points: Vec<_> = (1..=5)
            .map(|i| Datapoint::new(i as f64, json!(i)))
            .collect();
        op.insert_stream_by_id(id, "", points, false).unwrap();

        assert_eq!(op.length_stream_by_id(id, "").unwrap(), 5);
        assert_eq!(op.length_stream_by_id(id, "downlink").unwrap(), 0);
        assert_eq!(op.time_to_index_stream_by_id(id, "", 2.5).unwrap(), 2);

        let range = op.get_stream_time_range_by_id(id, "", 1.0, 4.0, 0).unwrap();
        assert_eq!(range.len(), 3);
        assert_eq!(range[0].timestamp, 2.0);
        let limited = op.get_stream_time_range_by_id(id, "", 0.0, 10.0, 2).unwrap();
        assert_eq!(limited.len(), 2);

        let tail = op.get_stream_index_range_by_id(id, "", -2, 5).unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[1].timestamp, 5.0);
        assert!(op.get_stream_index_range_by_id(id, "", 3, 1).unwrap().is_empty());
    }

    #[test]
    fn test_out_of_order_insert() {
        let (op, _) = operator_with_user();
        op.create_stream("alice/user/temp", r#"{}"#).unwrap();
        let id = op.read_stream("alice/user/temp").unwrap().stream_id;
        op.insert_stream_by_id(id, "", vec![Datapoint::new(10.0, json!(1))], false)
            .unwrap();

        let err = op
            .insert_stream_by_id(id, "", vec![Datapoint::new(5.0, json!(2))], false)
            .unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert_eq!(op.length_stream_by_id(id, "").unwrap(), 1);

        op.insert_stream_by_id(id, "", vec![Datapoint::new(5.0, json!(2))], true)
            .unwrap();
        let points = op.get_stream_index_range_by_id(id, "", 0, 2).unwrap();
        assert!(points[1].timestamp >= 10.0);
    }
}
