//! SensorDB entity model.
//!
//! This crate defines the records the access layer reasons about and the
//! static field tables that drive field-level masking.
//!
//! # Modules
//!
//! - [`entity`] - Accounts, devices, streams and the [`Entity`] field table trait
//! - [`value`] - Field values carried by partial updates
//! - [`datapoint`] - Timestamped stream data
//! - [`path`] - `user/device/stream` path helpers
//! - [`error`] - Model error types

pub mod datapoint;
pub mod entity;
pub mod error;
pub mod path;
pub mod value;

pub use datapoint::{Datapoint, DatapointArray};
pub use entity::{Device, Entity, EntityKind, NewUser, Stream, User, PRIMARY_DEVICE_NAME};
pub use error::{Error, Result};
pub use value::{FieldType, FieldValue, Updates};
