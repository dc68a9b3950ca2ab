//! In-memory blob backend.
//!
//! Non-persistent store using DashMap for concurrent access. Counts delete
//! calls so tests can assert how many physical deletes actually happened.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use dashmap::DashMap;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::backend::BlobBackend;
use super::error::{Result, StoreError};
use super::types::{BlobMeta, BlobReader, ByteStream, DeleteOutcome, guess_content_type};
use super::validation::object_path;

/// Virtual root under which memory blobs are addressed.
const MEMORY_ROOT: &str = "/memory";

#[derive(Clone)]
struct MemoryBlob {
    data: Bytes,
    meta: BlobMeta,
}

#[derive(Default)]
struct Counters {
    delete_calls: AtomicUsize,
    deleted: AtomicUsize,
}

/// In-memory blob backend.
///
/// `MemoryBackend` is `Clone`; clones share the same contents and counters.
///
/// # Example
///
/// ```ignore
/// use ephemera::storage::{BlobStore, MemoryBackend};
///
/// let backend = MemoryBackend::new();
/// let store = BlobStore::custom(backend.clone());
/// // ... exercise the store ...
/// assert_eq!(backend.deleted(), 1);
/// ```
#[derive(Clone, Default)]
pub struct MemoryBackend {
    blobs: Arc<DashMap<PathBuf, MemoryBlob>>,
    counters: Arc<Counters>,
}

impl MemoryBackend {
    /// Creates a new empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Returns true if a blob named `name` is stored.
    pub fn contains(&self, name: &str) -> bool {
        self.blobs.contains_key(&Path::new(MEMORY_ROOT).join(name))
    }

    /// Number of times `delete` has been called, whatever the outcome.
    pub fn delete_calls(&self) -> usize {
        self.counters.delete_calls.load(Ordering::SeqCst)
    }

    /// Number of `delete` calls that actually removed a blob.
    pub fn deleted(&self) -> usize {
        self.counters.deleted.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobBackend for MemoryBackend {
    async fn create(&self, name: &str, mut content: ByteStream, max_bytes: u64) -> Result<BlobMeta> {
        let path = object_path(Path::new(MEMORY_ROOT), name)?;

        let mut buf = BytesMut::new();
        while let Some(chunk) = content.next().await {
            let chunk = chunk.map_err(StoreError::Stream)?;
            if (buf.len() + chunk.len()) as u64 > max_bytes {
                return Err(StoreError::TooLarge { limit: max_bytes });
            }
            buf.extend_from_slice(&chunk);
        }

        let meta = BlobMeta {
            name: name.to_string(),
            path: path.clone(),
            size: buf.len() as u64,
            content_type: guess_content_type(name),
            modified_at: Utc::now(),
        };
        self.blobs.insert(
            path,
            MemoryBlob {
                data: buf.freeze(),
                meta: meta.clone(),
            },
        );
        Ok(meta)
    }

    async fn open(&self, path: &Path) -> Result<BlobReader> {
        let blob = self
            .blobs
            .get(path)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::NotFound {
                path: path.to_path_buf(),
            })?;

        let body = futures::stream::iter([Ok::<_, std::io::Error>(blob.data)]).boxed();
        Ok(BlobReader {
            meta: blob.meta,
            body,
        })
    }

    async fn delete(&self, path: &Path) -> Result<DeleteOutcome> {
        self.counters.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.blobs.remove(path).is_some() {
            self.counters.deleted.fetch_add(1, Ordering::SeqCst);
            Ok(DeleteOutcome::Deleted)
        } else {
            Ok(DeleteOutcome::AlreadyAbsent)
        }
    }

    async fn list(&self) -> Result<Vec<PathBuf>> {
        let mut paths: Vec<PathBuf> = self.blobs.iter().map(|e| e.key().clone()).collect();
        paths.sort();
        Ok(paths)
    }
}
