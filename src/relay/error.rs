//! Relay error types.
//!
//! Errors fall into the categories the HTTP layer cares about: bad input
//! (4xx, never retried), not found (expected lifecycle outcome), and storage
//! failure (5xx).

use super::registry::RegistryError;
use crate::storage::StoreError;

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Errors returned by [`super::Relay`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RelayError {
    /// The client-supplied file name cannot be stored.
    #[error("invalid file name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// The upload exceeded the configured ceiling.
    #[error("upload exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },

    /// The upload body was malformed or ended early.
    #[error("malformed upload: {reason}")]
    MalformedUpload { reason: String },

    /// A live object or an in-flight upload already uses the name.
    #[error("an object named {name:?} is already shared")]
    Duplicate { name: String },

    /// Unknown, expired, or already downloaded.
    #[error("object not found: {name}")]
    NotFound { name: String },

    /// Disk I/O failed while creating or opening a blob.
    #[error("storage failure: {0}")]
    Storage(#[source] StoreError),
}

impl RelayError {
    pub(crate) fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedUpload {
            reason: reason.into(),
        }
    }

    /// Get the appropriate HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidName { .. } | Self::TooLarge { .. } | Self::MalformedUpload { .. } => 400,
            Self::NotFound { .. } => 404,
            Self::Duplicate { .. } => 409,
            Self::Storage(_) => 500,
        }
    }

    /// True for errors caused by the client's input.
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}

impl From<StoreError> for RelayError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::TooLarge { limit } => Self::TooLarge { limit },
            StoreError::InvalidName { name, reason } => Self::InvalidName { name, reason },
            StoreError::Stream(source) => Self::malformed(source.to_string()),
            other => Self::Storage(other),
        }
    }
}

impl From<RegistryError> for RelayError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::DuplicateName { name } => Self::Duplicate { name },
        }
    }
}
