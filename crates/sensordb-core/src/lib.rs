//! SensorDB Core - access control, field masking and entity caching.
//!
//! Requests are made as a device. The [`AuthOperator`] resolves how that
//! device relates to the target, masks what the access policy hides, and
//! records every mutation in the acting account's log stream. Below it, the
//! [`CachedOperator`] keeps short-lived copies of accounts, devices and
//! streams in front of a storage operator.

pub mod audit;
pub mod auth;
pub mod bus;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod field_access;
pub mod operator;
pub mod permission;
pub mod policy;
pub mod relation;

pub use audit::{AuditCommand, AuditJournal, AuditLog, AuditRecord, LOG_SCHEMA};
pub use auth::AuthOperator;
pub use bus::{MemoryBus, Message, MessageBus, NullBus, SubscriptionScope};
pub use cache::{CacheStats, TimedCache};
pub use config::CacheConfig;
pub use context::CallerContext;
pub use error::{Error, Result};
pub use field_access::{
    can_access_stream_data, check_field_update_permitted, get_access_levels,
    mask_unreadable_fields, readable_fields, AccessLevels, AccessMode,
};
pub use operator::{BaseOperator, CachedOperator, MemoryOperator};
pub use permission::PermissionLevel;
pub use policy::{AccessLevel, Policy, QueryContext, Role, RoleKind, RwAccess};
pub use relation::{relation_to_device, relation_to_stream, relation_to_user};

/// Re-export protocol types.
pub use sensordb_proto as proto;
