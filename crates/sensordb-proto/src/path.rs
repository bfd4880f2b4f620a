//! `user/device/stream` path helpers.

use crate::entity::PRIMARY_DEVICE_NAME;
use crate::error::{Error, Result};

/// Name of the per-account audit stream on the primary device.
pub const LOG_STREAM_NAME: &str = "log";

/// Substream that receives writes from non-owners of a downlink stream.
pub const DOWNLINK_SUBSTREAM: &str = "downlink";

/// Whether a name can be used as a path segment.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 128
        && !name
            .chars()
            .any(|c| c == '/' || c == '\\' || c == '?' || c.is_whitespace() || c.is_control())
}

/// Check a name, returning it on success.
pub fn validate_name(name: &str) -> Result<&str> {
    if is_valid_name(name) {
        Ok(name)
    } else {
        Err(Error::InvalidName(name.to_string()))
    }
}

pub fn device_path(user: &str, device: &str) -> String {
    format!("{}/{}", user, device)
}

pub fn stream_path(user: &str, device: &str, stream: &str) -> String {
    format!("{}/{}/{}", user, device, stream)
}

/// Path of an account's audit log stream.
pub fn log_stream_path(user: &str) -> String {
    stream_path(user, PRIMARY_DEVICE_NAME, LOG_STREAM_NAME)
}

/// Split `user/device`.
pub fn split_device_path(path: &str) -> Result<(&str, &str)> {
    match segments(path).as_slice() {
        &[user, device] => Ok((user, device)),
        _ => Err(Error::InvalidPath(path.to_string())),
    }
}

/// Split `user/device/stream`.
pub fn split_stream_path(path: &str) -> Result<(&str, &str, &str)> {
    match segments(path).as_slice() {
        &[user, device, stream] => Ok((user, device, stream)),
        _ => Err(Error::InvalidPath(path.to_string())),
    }
}

/// A parsed entity address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Address<'a> {
    User(&'a str),
    Device(&'a str, &'a str),
    Stream {
        user: &'a str,
        device: &'a str,
        stream: &'a str,
        substream: Option<&'a str>,
    },
}

impl<'a> Address<'a> {
    /// Parse `user`, `user/device`, `user/device/stream` or
    /// `user/device/stream/substream`.
    pub fn parse(path: &'a str) -> Result<Self> {
        match segments(path).as_slice() {
            &[user] => Ok(Address::User(user)),
            &[user, device] => Ok(Address::Device(user, device)),
            &[user, device, stream] => Ok(Address::Stream {
                user,
                device,
                stream,
                substream: None,
            }),
            &[user, device, stream, substream] => Ok(Address::Stream {
                user,
                device,
                stream,
                substream: Some(substream),
            }),
            _ => Err(Error::InvalidPath(path.to_string())),
        }
    }
}

fn segments(path: &str) -> Vec<&str> {
    let parts: Vec<&str> = path.split('/').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Vec::new();
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_paths() {
        assert_eq!(split_device_path("alice/phone").unwrap(), ("alice", "phone"));
        assert_eq!(
            split_stream_path("alice/phone/gps").unwrap(),
            ("alice", "phone", "gps")
        );
        assert!(split_device_path("alice").is_err());
        assert!(split_device_path("alice//phone").is_err());
        assert!(split_stream_path("alice/phone").is_err());
    }

    #[test]
    fn test_log_stream_path() {
        assert_eq!(log_stream_path("alice"), "alice/user/log");
    }

    #[test]
    fn test_address_parse() {
        assert_eq!(Address::parse("alice").unwrap(), Address::User("alice"));
        assert_eq!(
            Address::parse("alice/phone/gps/downlink").unwrap(),
            Address::Stream {
                user: "alice",
                device: "phone",
                stream: "gps",
                substream: Some("downlink"),
            }
        );
        assert!(Address::parse("a/b/c/d/e").is_err());
        assert!(Address::parse("").is_err());
    }

    #[test]
    fn test_names() {
        assert!(is_valid_name("thermostat_2"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("a/b"));
        assert!(!is_valid_name("has space"));
        assert!(validate_name("ok").is_ok());
    }
}
