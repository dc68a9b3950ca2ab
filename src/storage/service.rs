//! High-level `BlobStore` wrapper over backend implementations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::backend::BlobBackend;
use super::error::Result;
use super::filesystem::FilesystemBackend;
use super::types::{BlobMeta, BlobReader, ByteStream, DeleteOutcome};

/// Blob store handle.
///
/// Wraps a [`BlobBackend`] and provides a consistent API regardless of the
/// underlying storage mechanism. Cheap to clone; clones share the backend.
///
/// # Example
///
/// ```ignore
/// use ephemera::storage::BlobStore;
///
/// let store = BlobStore::file("./uploads")?;
/// let meta = store.create("notes.txt", body, 10 * 1024 * 1024).await?;
/// let reader = store.open(&meta.path).await?;
/// ```
#[derive(Clone)]
pub struct BlobStore {
    backend: Arc<dyn BlobBackend>,
}

impl BlobStore {
    /// Creates a store backed by a filesystem directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::custom(FilesystemBackend::new(path)?))
    }

    /// Creates a store over a custom backend.
    pub fn custom<B: BlobBackend>(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// Streams content into storage under `name`, capped at `max_bytes`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidName`, `TooLarge`, `Stream` or `Io`.
    pub async fn create(&self, name: &str, content: ByteStream, max_bytes: u64) -> Result<BlobMeta> {
        self.backend.create(name, content, max_bytes).await
    }

    /// Opens a stored blob for streaming.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `Io`.
    pub async fn open(&self, path: &Path) -> Result<BlobReader> {
        self.backend.open(path).await
    }

    /// Removes a blob; an absent blob is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error only for I/O failures.
    pub async fn delete(&self, path: &Path) -> Result<DeleteOutcome> {
        self.backend.delete(path).await
    }

    /// Lists every stored path.
    ///
    /// # Errors
    ///
    /// Returns an error if the namespace cannot be enumerated.
    pub async fn list(&self) -> Result<Vec<PathBuf>> {
        self.backend.list().await
    }
}
