//! Field values carried by partial updates and field reads.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single external field value.
///
/// External fields are strings, booleans or integers. The untagged
/// representation lets update sets arrive as plain JSON objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    String(String),
}

/// A partial update: external field name to new value.
pub type Updates = BTreeMap<String, FieldValue>;

impl FieldValue {
    /// Name of the value's type, as used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Bool(_) => bool::TYPE_NAME,
            FieldValue::Int(_) => i64::TYPE_NAME,
            FieldValue::String(_) => String::TYPE_NAME,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::String(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_string())
    }
}

/// Rust types that can back an external field.
pub trait FieldType: Sized {
    const TYPE_NAME: &'static str;

    /// The value a masked field is reset to.
    fn zero() -> Self;

    fn to_value(&self) -> FieldValue;

    fn from_value(value: FieldValue) -> Option<Self>;
}

impl FieldType for String {
    const TYPE_NAME: &'static str = "string";

    fn zero() -> Self {
        String::new()
    }

    fn to_value(&self) -> FieldValue {
        FieldValue::String(self.clone())
    }

    fn from_value(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl FieldType for bool {
    const TYPE_NAME: &'static str = "boolean";

    fn zero() -> Self {
        false
    }

    fn to_value(&self) -> FieldValue {
        FieldValue::Bool(*self)
    }

    fn from_value(value: FieldValue) -> Option<Self> {
        value.as_bool()
    }
}

impl FieldType for i64 {
    const TYPE_NAME: &'static str = "integer";

    fn zero() -> Self {
        0
    }

    fn to_value(&self) -> FieldValue {
        FieldValue::Int(*self)
    }

    fn from_value(value: FieldValue) -> Option<Self> {
        value.as_int()
    }
}

/// Convert a field value into the field's backing type.
pub(crate) fn convert<T: FieldType>(field: &str, value: FieldValue) -> Result<T> {
    T::from_value(value).ok_or_else(|| Error::FieldType {
        field: field.to_string(),
        expected: T::TYPE_NAME,
    })
}
