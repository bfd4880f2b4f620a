//! Model error types.

use thiserror::Error;

/// Errors raised while handling entities, paths and field values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A path did not have the expected number of segments.
    #[error("invalid path '{0}'")]
    InvalidPath(String),

    /// A name contains characters that are not allowed in paths.
    #[error("invalid name '{0}'")]
    InvalidName(String),

    /// The field is not part of the entity's external field table.
    #[error("unrecognized field '{0}'")]
    UnknownField(String),

    /// The supplied value has the wrong type for the field.
    #[error("field '{field}' expects a {expected} value")]
    FieldType {
        field: String,
        expected: &'static str,
    },
}

/// Result type for model operations.
pub type Result<T> = std::result::Result<T, Error>;
