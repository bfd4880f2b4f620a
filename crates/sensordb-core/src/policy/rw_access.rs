//! Field-key masks.
//!
//! An [`RwAccess`] maps every policy key to a bool. Keys are the record gates
//! (`can_access_user`, `can_access_device`, `can_access_stream`), one
//! `<prefix>_<field>` key per external field, and the stream data gate.

use std::collections::BTreeMap;

use sensordb_proto::EntityKind;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Gate for reading or writing datapoints of a stream.
pub const STREAM_DATA_KEY: &str = "can_access_stream_data";

/// Every key a complete mask must define.
pub fn vocabulary() -> Vec<String> {
    let mut keys = Vec::new();
    for kind in EntityKind::ALL {
        keys.push(kind.access_key());
        keys.extend(kind.fields().iter().map(|field| kind.field_key(field)));
    }
    keys.push(STREAM_DATA_KEY.to_string());
    keys
}

/// A named field-key to bool mask.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RwAccess(BTreeMap<String, bool>);

impl RwAccess {
    /// A complete mask with every key set to `allowed`.
    pub fn uniform(allowed: bool) -> Self {
        Self(vocabulary().into_iter().map(|key| (key, allowed)).collect())
    }

    /// Denies everything.
    pub fn none() -> Self {
        Self::uniform(false)
    }

    /// Allows everything.
    pub fn full() -> Self {
        Self::uniform(true)
    }

    /// Set the given keys to true.
    pub fn allow(mut self, keys: &[&str]) -> Self {
        for key in keys {
            self.0.insert((*key).to_string(), true);
        }
        self
    }

    /// Set the given keys to false.
    pub fn deny(mut self, keys: &[&str]) -> Self {
        for key in keys {
            self.0.insert((*key).to_string(), false);
        }
        self
    }

    pub fn set(&mut self, key: impl Into<String>, allowed: bool) {
        self.0.insert(key.into(), allowed);
    }

    pub fn remove(&mut self, key: &str) -> Option<bool> {
        self.0.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<bool> {
        self.0.get(key).copied()
    }

    /// Look up a gating key. A missing key means the configuration is corrupt.
    pub fn permits(&self, key: &str) -> Result<bool> {
        self.get(key)
            .ok_or_else(|| Error::corruption(format!("gating key '{}' is not defined", key)))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Vocabulary keys this mask does not define.
    pub fn missing_keys(&self) -> Vec<String> {
        vocabulary()
            .into_iter()
            .filter(|key| !self.0.contains_key(key))
            .collect()
    }

    /// Keys this mask defines that no entity knows about.
    pub fn unknown_keys(&self) -> Vec<String> {
        let known = vocabulary();
        self.0
            .keys()
            .filter(|key| !known.contains(key))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocabulary_covers_field_tables() {
        let keys = vocabulary();
        assert!(keys.contains(&"can_access_user".to_string()));
        assert!(keys.contains(&"user_email".to_string()));
        assert!(keys.contains(&"device_apikey".to_string()));
        assert!(keys.contains(&"stream_downlink".to_string()));
        assert!(keys.contains(&STREAM_DATA_KEY.to_string()));
        assert!(!keys.contains(&"user_admin".to_string()));
    }

    #[test]
    fn test_builtins_are_complete() {
        assert!(RwAccess::none().missing_keys().is_empty());
        assert!(RwAccess::full().missing_keys().is_empty());
        assert_eq!(RwAccess::none().get("user_email"), Some(false));
        assert_eq!(RwAccess::full().get("user_email"), Some(true));
    }

    #[test]
    fn test_missing_key_is_corruption() {
        let mut access = RwAccess::full();
        access.remove("user_email");
        assert_eq!(access.missing_keys(), vec!["user_email".to_string()]);
        assert!(access.permits("user_email").unwrap_err().is_fatal());
    }

    #[test]
    fn test_unknown_keys() {
        let mut access = RwAccess::none().allow(&["user_name"]);
        access.set("user_shoe_size", true);
        assert_eq!(access.unknown_keys(), vec!["user_shoe_size".to_string()]);
        assert_eq!(access.get("user_name"), Some(true));
    }

    #[test]
    fn test_json_is_flat_object() {
        let access = RwAccess::none().allow(&["user_name"]);
        let json = serde_json::to_value(&access).unwrap();
        assert_eq!(json["user_name"], true);
        assert_eq!(json["user_email"], false);
    }
}
