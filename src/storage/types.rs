//! Types shared by the blob store backends.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use std::path::PathBuf;

/// Incoming upload content, delivered in chunks.
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Metadata for a stored blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobMeta {
    /// Object name (a single path component).
    pub name: String,
    /// Location of the blob inside the store's namespace.
    pub path: PathBuf,
    /// Size in bytes.
    pub size: u64,
    /// MIME content type guessed from the name.
    pub content_type: String,
    /// Timestamp when the blob was committed.
    pub modified_at: DateTime<Utc>,
}

/// Outcome of a delete call. Both variants are success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The blob existed and was removed.
    Deleted,
    /// Nothing was stored at the path.
    AlreadyAbsent,
}

/// A blob opened for reading.
pub struct BlobReader {
    pub meta: BlobMeta,
    pub body: ByteStream,
}

impl std::fmt::Debug for BlobReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobReader")
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

/// Guess a content type from an object name.
pub(crate) fn guess_content_type(name: &str) -> String {
    mime_guess::from_path(name).first().map_or_else(
        || "application/octet-stream".to_string(),
        |mime| mime.to_string(),
    )
}
