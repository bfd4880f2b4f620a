//! Timestamped stream data.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// A single datapoint in a stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datapoint {
    /// Seconds since the Unix epoch.
    #[serde(rename = "t")]
    pub timestamp: f64,
    #[serde(rename = "d")]
    pub data: serde_json::Value,
    /// Path of the device that wrote the point, when it is not the stream owner.
    #[serde(rename = "o", default, skip_serializing_if = "String::is_empty")]
    pub sender: String,
}

/// An ordered batch of datapoints.
pub type DatapointArray = Vec<Datapoint>;

impl Datapoint {
    pub fn new(timestamp: f64, data: serde_json::Value) -> Self {
        Self {
            timestamp,
            data,
            sender: String::new(),
        }
    }

    /// A datapoint stamped with the current time.
    pub fn now(data: serde_json::Value) -> Self {
        Self::new(now_seconds(), data)
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = sender.into();
        self
    }
}

/// Current time as fractional seconds since the Unix epoch.
pub fn now_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}
