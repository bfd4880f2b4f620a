//! The built-in policy used when no configuration file is given.

use std::collections::BTreeMap;

use super::access_level::{AccessLevel, FULL, NONE};
use super::role::Role;
use super::rw_access::{RwAccess, STREAM_DATA_KEY};
use super::{Policy, POLICY_VERSION};

const DISALLOWED_NAMES: &[&str] = &[
    "support",
    "www",
    "api",
    "app",
    "favicon.ico",
    "robots.txt",
    "sitemap.xml",
    "join",
    "login",
    "user",
    "admin",
    "nobody",
    "root",
];

/// Fields any account may see on another account's public records.
const PUBLIC_FIELDS: &[&str] = &[
    "can_access_user",
    "user_name",
    "user_nickname",
    "user_description",
    "user_icon",
    "user_public",
    "can_access_device",
    "device_name",
    "device_nickname",
    "device_description",
    "device_icon",
    "device_public",
    "device_enabled",
    "device_visible",
    "can_access_stream",
    "stream_name",
    "stream_nickname",
    "stream_description",
    "stream_icon",
    "stream_schema",
    "stream_datatype",
    "stream_ephemeral",
    "stream_downlink",
    STREAM_DATA_KEY,
];

/// Fields an account may not change on its own records.
const SELF_IMMUTABLE_FIELDS: &[&str] = &[
    "user_name",
    "user_role",
    "device_name",
    "device_role",
    "device_user_editable",
    "stream_name",
];

pub(super) fn default_policy() -> Policy {
    let mut rw_access = BTreeMap::new();
    rw_access.insert(
        "publicread".to_string(),
        RwAccess::none().allow(PUBLIC_FIELDS),
    );
    rw_access.insert(
        "selfread".to_string(),
        RwAccess::full().deny(&["user_password"]),
    );
    rw_access.insert(
        "selfwrite".to_string(),
        RwAccess::full().deny(SELF_IMMUTABLE_FIELDS),
    );

    let mut access_levels = BTreeMap::new();
    access_levels.insert(
        "publicread".to_string(),
        AccessLevel::with_masks("publicread", NONE),
    );
    access_levels.insert(
        "self".to_string(),
        AccessLevel::with_masks("selfread", "selfwrite"),
    );
    access_levels.insert("reader".to_string(), AccessLevel::with_masks(FULL, NONE));

    let mut user_roles = BTreeMap::new();
    user_roles.insert(
        "nobody".to_string(),
        Role::uniform(NONE).with_description("Account with no access"),
    );
    user_roles.insert(
        "user".to_string(),
        Role::new("self", "self", "publicread", NONE)
            .with_description("Standard account: full control of its own records"),
    );
    user_roles.insert(
        "admin".to_string(),
        Role::uniform(FULL).with_description("Administrator with unrestricted field access"),
    );

    let mut device_roles = BTreeMap::new();
    device_roles.insert(
        "none".to_string(),
        Role::uniform(FULL).with_description("No restriction beyond the account's role"),
    );
    device_roles.insert(
        "reader".to_string(),
        Role::uniform("reader").with_description("Read-only device"),
    );

    Policy {
        version: POLICY_VERSION,
        disallowed_names: DISALLOWED_NAMES.iter().map(|s| s.to_string()).collect(),
        allowed_email_suffixes: Vec::new(),
        max_users: -1,
        user_roles,
        device_roles,
        access_levels,
        rw_access,
    }
}
