//! Backend trait for the blob store.
//!
//! Defines the interface that all blob backends must implement, enabling
//! pluggable storage (filesystem for production, memory for tests).

use async_trait::async_trait;
use std::path::Path;

use super::error::Result;
use super::types::{BlobMeta, BlobReader, ByteStream, DeleteOutcome};

/// Backend trait for blob storage.
///
/// All backends must be thread-safe (`Send + Sync`) for use with tokio.
/// Operations on distinct names must not interfere with each other;
/// operations on the same name are serialized by the relay's registry,
/// not by the backend.
#[async_trait]
pub trait BlobBackend: Send + Sync + 'static {
    /// Streams `content` into storage under `name`.
    ///
    /// Content is never buffered whole. If more than `max_bytes` arrive the
    /// write is abandoned and nothing is left under `name`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidName`](super::StoreError::InvalidName) if the
    ///   name escapes the namespace
    /// - [`StoreError::TooLarge`](super::StoreError::TooLarge) past the ceiling
    /// - [`StoreError::Stream`](super::StoreError::Stream) if the source fails
    /// - [`StoreError::Io`](super::StoreError::Io) on storage failure
    async fn create(&self, name: &str, content: ByteStream, max_bytes: u64) -> Result<BlobMeta>;

    /// Opens a stored blob for streaming.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if nothing is stored at `path`, `Io` otherwise.
    async fn open(&self, path: &Path) -> Result<BlobReader>;

    /// Removes a blob. Removing an absent blob succeeds with
    /// [`DeleteOutcome::AlreadyAbsent`].
    ///
    /// # Errors
    ///
    /// Returns an error only for real I/O failures.
    async fn delete(&self, path: &Path) -> Result<DeleteOutcome>;

    /// Lists every stored object path, including leftover staging files.
    ///
    /// # Errors
    ///
    /// Returns an error if the namespace cannot be enumerated.
    async fn list(&self) -> Result<Vec<std::path::PathBuf>>;
}
