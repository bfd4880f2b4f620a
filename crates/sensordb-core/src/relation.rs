//! Relation resolution between a caller device and a target entity.
//!
//! Rules are evaluated in order and the first match wins:
//!
//! 1. a disabled caller has no relation to anything;
//! 2. an administrator device is `Root`;
//! 3. within the caller's own account, a device acting as the user is
//!    `User` and any other device is `Family`;
//! 4. across accounts, only a downlink stream grants `Device`, and only to a
//!    caller allowed to write anywhere;
//! 5. everything else is `Nobody`.
//!
//! Relations never fail. Callers that need the target read it first, so a
//! missing target surfaces as a denial before these functions run.

use sensordb_proto::{Device, Stream, User};

use crate::permission::PermissionLevel;

/// Level of a caller device toward an account.
pub fn relation_to_user(caller: &Device, target: &User) -> PermissionLevel {
    if let Some(level) = global_level(caller) {
        return level;
    }
    if caller.user_id == target.user_id {
        return account_level(caller);
    }
    PermissionLevel::Nobody
}

/// Level of a caller device toward a device. A device resolves to itself
/// through the account rule.
pub fn relation_to_device(caller: &Device, target: &Device) -> PermissionLevel {
    if let Some(level) = global_level(caller) {
        return level;
    }
    if caller.user_id == target.user_id {
        return account_level(caller);
    }
    PermissionLevel::Nobody
}

/// Level of a caller device toward a stream, given the stream's owning device.
pub fn relation_to_stream(caller: &Device, target: &Stream, owner: &Device) -> PermissionLevel {
    if let Some(level) = global_level(caller) {
        return level;
    }
    if target.device_id != owner.device_id {
        tracing::warn!(
            stream = target.stream_id,
            owner = owner.device_id,
            "stream relation resolved against a device that does not own it"
        );
        return PermissionLevel::Nobody;
    }
    if caller.user_id == owner.user_id {
        return account_level(caller);
    }
    if target.downlink && caller.can_write_anywhere {
        return PermissionLevel::Device;
    }
    PermissionLevel::Nobody
}

fn global_level(caller: &Device) -> Option<PermissionLevel> {
    if !caller.enabled {
        return Some(PermissionLevel::Nobody);
    }
    if caller.admin {
        return Some(PermissionLevel::Root);
    }
    None
}

fn account_level(caller: &Device) -> PermissionLevel {
    if caller.acts_as_user() {
        PermissionLevel::User
    } else {
        PermissionLevel::Family
    }
}
