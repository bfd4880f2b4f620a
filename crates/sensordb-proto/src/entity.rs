//! Accounts, devices and streams.
//!
//! Each entity exposes a static table of its external fields through the
//! [`Entity`] trait. The access policy names those fields as
//! `<prefix>_<field>` keys, so the tables are the single source of truth for
//! which keys a policy must define.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::value::{convert, FieldType, FieldValue, Updates};

/// Name of the device every account is created with.
pub const PRIMARY_DEVICE_NAME: &str = "user";

/// The three kinds of entity the access layer protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    User,
    Device,
    Stream,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [EntityKind::User, EntityKind::Device, EntityKind::Stream];

    /// Prefix used for this kind's policy keys.
    pub fn prefix(self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Device => "device",
            EntityKind::Stream => "stream",
        }
    }

    /// Record-level gate key, e.g. `can_access_device`.
    pub fn access_key(self) -> String {
        format!("can_access_{}", self.prefix())
    }

    /// Policy key for one external field, e.g. `user_email`.
    pub fn field_key(self, field: &str) -> String {
        format!("{}_{}", self.prefix(), field)
    }

    /// External field table for this kind.
    pub fn fields(self) -> &'static [&'static str] {
        match self {
            EntityKind::User => User::FIELDS,
            EntityKind::Device => Device::FIELDS,
            EntityKind::Stream => Stream::FIELDS,
        }
    }

    pub fn has_field(self, field: &str) -> bool {
        self.fields().contains(&field)
    }
}

/// A record with a static table of externally visible fields.
pub trait Entity: Clone {
    const KIND: EntityKind;

    /// External field names in declaration order.
    const FIELDS: &'static [&'static str];

    fn id(&self) -> i64;

    /// Current value of an external field.
    fn field(&self, name: &str) -> Option<FieldValue>;

    /// Reset an external field to its zero value. Returns false for unknown fields.
    fn reset_field(&mut self, name: &str) -> bool;

    /// Assign one external field.
    fn set_field(&mut self, name: &str, value: FieldValue) -> Result<()>;

    /// Apply a partial update. Either every field is applied or none is.
    fn apply_updates(&mut self, updates: &Updates) -> Result<()> {
        let mut staged = self.clone();
        for (name, value) in updates {
            staged.set_field(name, value.clone())?;
        }
        *self = staged;
        Ok(())
    }
}

macro_rules! external_fields {
    ($ty:ty, $kind:expr, $id:ident, { $($key:literal => $field:ident),+ $(,)? }) => {
        impl Entity for $ty {
            const KIND: EntityKind = $kind;
            const FIELDS: &'static [&'static str] = &[$($key),+];

            fn id(&self) -> i64 {
                self.$id
            }

            fn field(&self, name: &str) -> Option<FieldValue> {
                match name {
                    $($key => Some(FieldType::to_value(&self.$field)),)+
                    _ => None,
                }
            }

            fn reset_field(&mut self, name: &str) -> bool {
                match name {
                    $($key => {
                        self.$field = FieldType::zero();
                        true
                    })+
                    _ => false,
                }
            }

            fn set_field(&mut self, name: &str, value: FieldValue) -> Result<()> {
                match name {
                    $($key => {
                        self.$field = convert(name, value)?;
                        Ok(())
                    })+
                    _ => Err(Error::UnknownField(name.to_string())),
                }
            }
        }
    };
}

/// An account.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "userid")]
    pub user_id: i64,
    pub name: String,
    pub nickname: String,
    pub email: String,
    pub description: String,
    pub icon: String,
    pub role: String,
    pub public: bool,
    pub password: String,
    /// Global administrator flag. Not an external field.
    #[serde(default)]
    pub admin: bool,
}

external_fields!(User, EntityKind::User, user_id, {
    "name" => name,
    "nickname" => nickname,
    "email" => email,
    "description" => description,
    "icon" => icon,
    "role" => role,
    "public" => public,
    "password" => password,
});

/// Parameters for creating an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: String,
    #[serde(default)]
    pub public: bool,
}

impl NewUser {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            password: password.into(),
            role: role.into(),
            public: false,
        }
    }

    pub fn public(mut self, public: bool) -> Self {
        self.public = public;
        self
    }
}

/// A device belonging to an account.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Device {
    #[serde(rename = "deviceid")]
    pub device_id: i64,
    #[serde(rename = "userid")]
    pub user_id: i64,
    pub name: String,
    pub nickname: String,
    pub description: String,
    pub icon: String,
    pub apikey: String,
    pub enabled: bool,
    pub role: String,
    pub public: bool,
    pub visible: bool,
    pub user_editable: bool,
    pub can_write: bool,
    pub can_write_anywhere: bool,
    pub can_act_as_user: bool,
    /// Global administrator flag. Not an external field.
    #[serde(default)]
    pub admin: bool,
}

external_fields!(Device, EntityKind::Device, device_id, {
    "name" => name,
    "nickname" => nickname,
    "description" => description,
    "icon" => icon,
    "apikey" => apikey,
    "enabled" => enabled,
    "role" => role,
    "public" => public,
    "visible" => visible,
    "user_editable" => user_editable,
    "can_write" => can_write,
    "can_write_anywhere" => can_write_anywhere,
    "can_act_as_user" => can_act_as_user,
});

impl Device {
    /// Whether this is the account's primary device.
    pub fn is_primary(&self) -> bool {
        self.name == PRIMARY_DEVICE_NAME
    }

    /// Whether the device acts with full account authority.
    pub fn acts_as_user(&self) -> bool {
        self.is_primary() || self.can_act_as_user
    }
}

/// A stream of datapoints belonging to a device.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Stream {
    #[serde(rename = "streamid")]
    pub stream_id: i64,
    #[serde(rename = "deviceid")]
    pub device_id: i64,
    pub name: String,
    pub nickname: String,
    pub description: String,
    pub icon: String,
    pub schema: String,
    pub datatype: String,
    pub ephemeral: bool,
    pub downlink: bool,
}

external_fields!(Stream, EntityKind::Stream, stream_id, {
    "name" => name,
    "nickname" => nickname,
    "description" => description,
    "icon" => icon,
    "schema" => schema,
    "datatype" => datatype,
    "ephemeral" => ephemeral,
    "downlink" => downlink,
});
