//! Core error types.

use thiserror::Error;

/// Errors raised by the access layer and the operators it wraps.
#[derive(Debug, Error)]
pub enum Error {
    /// Uniform denial. Never says whether the target exists.
    #[error("access denied")]
    AccessDenied,

    /// The policy is missing a default role, access level or gating key.
    #[error("configuration corrupted: {0}")]
    ConfigCorruption(String),

    /// The configuration is well formed but not acceptable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An update named a field the entity does not have.
    #[error("unrecognized field '{0}'")]
    UnrecognizedField(String),

    /// An update named a field the caller may not write.
    #[error("not permitted to write field '{0}'")]
    FieldNotWritable(String),

    /// The request is understood but refused by a business rule.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Entity not found in the base operator.
    #[error("not found: {0}")]
    NotFound(String),

    /// Entity already exists in the base operator.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Storage failure in the base operator.
    #[error("storage error: {0}")]
    Storage(String),

    /// Message bus failure.
    #[error("message bus error: {0}")]
    Bus(String),

    /// Model error.
    #[error("model error: {0}")]
    Proto(#[from] sensordb_proto::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Configuration corruption cannot be recovered from at runtime.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::ConfigCorruption(_))
    }

    pub fn is_access_denied(&self) -> bool {
        matches!(self, Error::AccessDenied)
    }

    pub(crate) fn corruption(message: impl Into<String>) -> Self {
        let message = message.into();
        tracing::error!(%message, "access policy is corrupted");
        Error::ConfigCorruption(message)
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;
