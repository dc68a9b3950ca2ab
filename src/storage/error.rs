//! Blob store error types.

use std::path::PathBuf;

/// Result type for blob store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by a blob store backend.
///
/// "Not present" on delete is not an error; see [`super::DeleteOutcome`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The incoming stream exceeded the byte ceiling.
    #[error("upload exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },

    /// The name would escape the storage namespace or is otherwise unusable.
    #[error("invalid object name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// Nothing stored at the requested path.
    #[error("object not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// The incoming stream failed before it finished.
    #[error("upload stream failed: {0}")]
    Stream(#[source] std::io::Error),

    /// Disk I/O failure with context.
    #[error("IO error in {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn invalid_name(name: &str, reason: &'static str) -> Self {
        Self::InvalidName {
            name: name.to_string(),
            reason,
        }
    }
}
