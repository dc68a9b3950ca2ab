//! Filesystem-backed blob backend.
//!
//! Blobs are plain files directly inside one directory. Uploads stream into
//! a hidden staging file and are renamed onto their final name only once the
//! whole payload has arrived under the size ceiling.

use async_trait::async_trait;
use bytes::BytesMut;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, warn};
use uuid::Uuid;

use super::backend::BlobBackend;
use super::error::{Result, StoreError};
use super::types::{BlobMeta, BlobReader, ByteStream, DeleteOutcome, guess_content_type};
use super::validation::object_path;
use crate::constants::{STAGING_PREFIX, STREAM_CHUNK_SIZE};

/// Filesystem-backed blob backend.
///
/// `FilesystemBackend` is `Clone`; clones share the same directory.
#[derive(Debug, Clone)]
pub struct FilesystemBackend {
    base_dir: PathBuf,
}

impl FilesystemBackend {
    /// Opens the backend at `base_dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_dir).map_err(|e| {
            StoreError::io(
                format!("creating upload directory {}", base_dir.display()),
                e,
            )
        })?;
        Ok(Self { base_dir })
    }

    /// Directory holding the blobs.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn staging_path(&self) -> PathBuf {
        self.base_dir
            .join(format!("{STAGING_PREFIX}{}", Uuid::new_v4().simple()))
    }
}

/// Copies `content` into a fresh file at `path`, enforcing `max_bytes`.
async fn write_staged(path: &Path, content: &mut ByteStream, max_bytes: u64) -> Result<u64> {
    let mut file = File::create(path)
        .await
        .map_err(|e| StoreError::io(format!("creating {}", path.display()), e))?;

    let mut written: u64 = 0;
    while let Some(chunk) = content.next().await {
        let chunk = chunk.map_err(StoreError::Stream)?;
        written += chunk.len() as u64;
        if written > max_bytes {
            return Err(StoreError::TooLarge { limit: max_bytes });
        }
        file.write_all(&chunk)
            .await
            .map_err(|e| StoreError::io(format!("writing {}", path.display()), e))?;
    }

    file.flush()
        .await
        .map_err(|e| StoreError::io(format!("flushing {}", path.display()), e))?;
    Ok(written)
}

/// Best-effort removal of a staging file after a failed upload.
async fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path).await
        && e.kind() != ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %e, "Failed to discard partial upload");
    }
}

/// Turns an open file into a stream of chunks.
pub(crate) fn file_chunks(file: File) -> ByteStream {
    futures::stream::try_unfold(file, |mut file| async move {
        let mut buf = BytesMut::with_capacity(STREAM_CHUNK_SIZE);
        let n = file.read_buf(&mut buf).await?;
        let next = (n > 0).then(|| (buf.freeze(), file));
        Ok::<_, std::io::Error>(next)
    })
    .boxed()
}

#[async_trait]
impl BlobBackend for FilesystemBackend {
    async fn create(&self, name: &str, mut content: ByteStream, max_bytes: u64) -> Result<BlobMeta> {
        let final_path = object_path(&self.base_dir, name)?;
        let staging = self.staging_path();

        let size = match write_staged(&staging, &mut content, max_bytes).await {
            Ok(size) => size,
            Err(e) => {
                discard(&staging).await;
                return Err(e);
            },
        };

        if let Err(e) = fs::rename(&staging, &final_path).await {
            discard(&staging).await;
            return Err(StoreError::io(
                format!("committing {}", final_path.display()),
                e,
            ));
        }

        debug!(name, size, "Blob committed");
        Ok(BlobMeta {
            name: name.to_string(),
            path: final_path,
            size,
            content_type: guess_content_type(name),
            modified_at: Utc::now(),
        })
    }

    async fn open(&self, path: &Path) -> Result<BlobReader> {
        let file = match File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    path: path.to_path_buf(),
                });
            },
            Err(e) => return Err(StoreError::io(format!("opening {}", path.display()), e)),
        };

        let metadata = file
            .metadata()
            .await
            .map_err(|e| StoreError::io(format!("reading metadata of {}", path.display()), e))?;
        if !metadata.is_file() {
            return Err(StoreError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let modified_at = metadata
            .modified()
            .map_or_else(|_| Utc::now(), DateTime::<Utc>::from);

        Ok(BlobReader {
            meta: BlobMeta {
                content_type: guess_content_type(&name),
                name,
                path: path.to_path_buf(),
                size: metadata.len(),
                modified_at,
            },
            body: file_chunks(file),
        })
    }

    async fn delete(&self, path: &Path) -> Result<DeleteOutcome> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(DeleteOutcome::Deleted),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(DeleteOutcome::AlreadyAbsent),
            Err(e) => Err(StoreError::io(format!("deleting {}", path.display()), e)),
        }
    }

    async fn list(&self) -> Result<Vec<PathBuf>> {
        let context = || format!("listing {}", self.base_dir.display());
        let mut entries = fs::read_dir(&self.base_dir)
            .await
            .map_err(|e| StoreError::io(context(), e))?;

        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(context(), e))?
        {
            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .unwrap_or(false);
            if is_file {
                paths.push(entry.path());
            }
        }
        paths.sort();
        Ok(paths)
    }
}
