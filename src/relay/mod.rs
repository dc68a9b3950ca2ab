//! Relay core: the record registry, expiry timers and the transfer gateway.
//!
//! Every object goes `Live -> Deleting -> Gone` exactly once. Two triggers
//! race for that transition: the expiry timer and the end of a download.
//! Both go through the same [`reaper`] path, and the registry's atomic claim
//! decides which one performs the single physical delete.

mod download;
mod error;
mod naming;
mod reaper;
mod registry;
mod scheduler;
mod sweep;

pub use download::{Download, DownloadBody};
pub use error::{RelayError, Result};
pub use naming::sanitize_filename;
pub use reaper::{RetryPolicy, Trigger};
pub use registry::{
    DeletionClaim, ObjectRecord, RecordId, RecordKey, RecordRegistry, RecordState, RegistryError,
    Reservation,
};
pub use scheduler::ExpiryScheduler;
pub use sweep::SweepReport;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::constants::{DEFAULT_DELETION_DELAY_MINUTES, DEFAULT_MAX_UPLOAD_SIZE};
use crate::storage::{BlobStore, ByteStream, StoreError, validate_name};
use reaper::Reaper;

/// Limits and timings for a [`Relay`].
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Upload ceiling in bytes.
    pub max_upload_size: u64,
    /// Time an object stays downloadable.
    pub ttl: Duration,
    /// Backoff for failed deletes.
    pub retry: RetryPolicy,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
            ttl: Duration::from_secs(DEFAULT_DELETION_DELAY_MINUTES * 60),
            retry: RetryPolicy::default(),
        }
    }
}

/// A completed upload.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Stored name; also the download token.
    pub name: String,
    pub size: u64,
    pub expires_at: DateTime<Utc>,
}

struct Inner {
    store: BlobStore,
    registry: RecordRegistry,
    scheduler: ExpiryScheduler,
    reaper: Reaper,
    config: RelayConfig,
}

/// The transfer gateway.
///
/// Owns the registry and scheduler for one upload store. `Relay` is `Clone`;
/// clones share all state, so one instance can be handed to every request
/// handler.
#[derive(Clone)]
pub struct Relay {
    inner: Arc<Inner>,
}

impl Relay {
    /// Builds a relay over `store`.
    pub fn new(store: BlobStore, config: RelayConfig) -> Self {
        let registry = RecordRegistry::new();
        let reaper = Reaper::new(store.clone(), registry.clone(), config.retry.clone());
        let scheduler = ExpiryScheduler::new(reaper.clone());
        Self {
            inner: Arc::new(Inner {
                store,
                registry,
                scheduler,
                reaper,
                config,
            }),
        }
    }

    /// Accepts an upload and arms its expiry timer.
    ///
    /// `filename` is the client-supplied name; directory components are
    /// stripped. The returned [`Upload::name`] is what the client downloads.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - `InvalidName` if nothing storable remains of `filename`
    /// - `Duplicate` if the name is live or being uploaded
    /// - `TooLarge` if the body exceeds the ceiling
    /// - `MalformedUpload` if the body stream fails
    /// - `Storage` on disk failure
    pub async fn upload(&self, filename: &str, content: ByteStream) -> Result<Upload> {
        let inner = &*self.inner;
        let name = sanitize_filename(filename)?;
        if name != filename {
            debug!(filename, name = %name, "Stripped directory components from upload name");
        }

        let reservation = inner.registry.reserve(&name)?;
        let meta = inner
            .store
            .create(&name, content, inner.config.max_upload_size)
            .await?;

        let record = ObjectRecord::new(&meta, inner.config.ttl);
        let key = record.key();
        let (deadline, expires_at) = (record.deadline, record.expires_at);
        if let Err(e) = reservation.register(record) {
            if let Err(cleanup) = inner.store.delete(&meta.path).await {
                warn!(name = %name, error = %cleanup, "Failed to discard unregistered upload");
            }
            return Err(e.into());
        }

        inner.scheduler.arm(key, deadline);
        info!(
            name = %name,
            size = meta.size,
            expires_at = %expires_at,
            "File uploaded"
        );
        Ok(Upload {
            name,
            size: meta.size,
            expires_at,
        })
    }

    /// Opens a live object for its single download.
    ///
    /// The record stays `Live` while the body streams. Reading the body to
    /// the end claims the deletion; dropping it early leaves the object for
    /// the expiry timer.
    ///
    /// # Errors
    ///
    /// - `NotFound` for unknown, expired or already downloaded names, and
    ///   for names that could never have been stored
    /// - `Storage` if the blob cannot be opened
    pub async fn download(&self, name: &str) -> Result<Download> {
        let inner = &*self.inner;
        if let Err(e) = validate_name(name) {
            debug!(name, error = %e, "Download name can never resolve");
            return Err(RelayError::not_found(name));
        }

        let record = inner
            .registry
            .lookup(name)
            .ok_or_else(|| RelayError::not_found(name))?;

        let reader = match inner.store.open(&record.path).await {
            Ok(reader) => reader,
            Err(StoreError::NotFound { .. }) => {
                warn!(name, "Record is live but its file is missing");
                return Err(RelayError::not_found(name));
            },
            Err(e) => return Err(e.into()),
        };

        debug!(name, size = reader.meta.size, "Serving download");
        let body = DownloadBody::new(
            reader.body,
            reader.meta.size,
            inner.reaper.clone(),
            record.key(),
        );
        Ok(Download {
            meta: reader.meta,
            body,
        })
    }

    /// Deletes files in the store that no record owns, including stale
    /// staging files. Only meant for startup, before uploads are accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be listed.
    pub async fn sweep_orphans(&self) -> Result<SweepReport> {
        Ok(sweep::sweep(&self.inner.store, &self.inner.registry).await?)
    }

    /// Number of files in the store that no record owns.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be listed.
    pub async fn orphan_count(&self) -> Result<usize> {
        Ok(sweep::count(&self.inner.store, &self.inner.registry).await?)
    }

    /// Stops all pending expiry timers. Live objects stay on disk.
    pub fn shutdown(&self) {
        let pending = self.inner.scheduler.armed();
        self.inner.scheduler.shutdown();
        if pending > 0 {
            warn!(pending, "Relay stopped with objects still live; their files will be orphaned");
        } else {
            debug!("Relay stopped");
        }
    }

    /// Name to record map shared with the reaper and timers.
    pub fn registry(&self) -> &RecordRegistry {
        &self.inner.registry
    }

    /// Backing blob store.
    pub fn store(&self) -> &BlobStore {
        &self.inner.store
    }

    /// Expiry timers, one per live record.
    pub fn scheduler(&self) -> &ExpiryScheduler {
        &self.inner.scheduler
    }

    /// Limits this relay was built with.
    pub fn config(&self) -> &RelayConfig {
        &self.inner.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;
    use bytes::Bytes;
    use futures::{StreamExt, TryStreamExt};

    fn body(data: &'static [u8]) -> ByteStream {
        futures::stream::iter([Ok::<_, std::io::Error>(Bytes::from_static(data))]).boxed()
    }

    fn relay(ttl: Duration) -> (Relay, MemoryBackend) {
        let backend = MemoryBackend::new();
        let config = RelayConfig {
            max_upload_size: 1024,
            ttl,
            ..RelayConfig::default()
        };
        (Relay::new(BlobStore::custom(backend.clone()), config), backend)
    }

    async fn drain(download: Download) -> Vec<u8> {
        let chunks: Vec<Bytes> = download.body.try_collect().await.unwrap();
        chunks.concat()
    }

    async fn settle(backend: &MemoryBackend, name: &str) {
        for _ in 0..100 {
            if !backend.contains(name) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_upload_then_single_download() {
        let (relay, backend) = relay(Duration::from_secs(60));

        let upload = relay.upload("a.txt", body(b"hello")).await.unwrap();
        assert_eq!(upload.name, "a.txt");
        assert_eq!(upload.size, 5);
        assert_eq!(relay.scheduler().armed(), 1);

        let download = relay.download("a.txt").await.unwrap();
        assert_eq!(download.meta.size, 5);
        assert_eq!(drain(download).await, b"hello");

        // Claimed synchronously when the last chunk was read.
        assert!(matches!(
            relay.download("a.txt").await,
            Err(RelayError::NotFound { .. })
        ));

        settle(&backend, "a.txt").await;
        assert!(!backend.contains("a.txt"));
        assert_eq!(backend.deleted(), 1);
    }

    #[tokio::test]
    async fn test_empty_object_claimed_on_open() {
        let (relay, backend) = relay(Duration::from_secs(60));
        relay.upload("empty.txt", body(b"")).await.unwrap();

        // Never polled, as when a server answers with Content-Length: 0.
        let download = relay.download("empty.txt").await.unwrap();
        assert_eq!(download.meta.size, 0);
        drop(download);

        assert!(matches!(
            relay.download("empty.txt").await,
            Err(RelayError::NotFound { .. })
        ));
        settle(&backend, "empty.txt").await;
        assert!(!backend.contains("empty.txt"));
        assert_eq!(backend.delete_calls(), 1);
    }

    #[tokio::test]
    async fn test_abandoned_download_keeps_object() {
        let (relay, backend) = relay(Duration::from_secs(60));
        relay.upload("a.txt", body(b"hello")).await.unwrap();

        drop(relay.download("a.txt").await.unwrap());
        assert!(relay.registry().lookup("a.txt").is_some());
        assert!(backend.contains("a.txt"));
    }

    #[tokio::test]
    async fn test_upload_strips_directories() {
        let (relay, backend) = relay(Duration::from_secs(60));

        let upload = relay.upload("../../etc/passwd", body(b"x")).await.unwrap();
        assert_eq!(upload.name, "passwd");
        assert!(backend.contains("passwd"));
    }

    #[tokio::test]
    async fn test_upload_errors() {
        let (relay, backend) = relay(Duration::from_secs(60));

        assert!(matches!(
            relay.upload("..", body(b"x")).await,
            Err(RelayError::InvalidName { .. })
        ));

        let big: ByteStream = futures::stream::iter([Ok(Bytes::from(vec![0u8; 2048]))]).boxed();
        assert!(matches!(
            relay.upload("big.bin", big).await,
            Err(RelayError::TooLarge { limit: 1024 })
        ));
        assert!(!backend.contains("big.bin"));
        assert!(!relay.registry().is_taken("big.bin"));

        relay.upload("a.txt", body(b"one")).await.unwrap();
        assert!(matches!(
            relay.upload("a.txt", body(b"two")).await,
            Err(RelayError::Duplicate { .. })
        ));
        let kept = drain(relay.download("a.txt").await.unwrap()).await;
        assert_eq!(kept, b"one");
        assert_eq!(relay.scheduler().armed(), 1);
    }

    #[tokio::test]
    async fn test_failed_stream_leaves_nothing() {
        let (relay, backend) = relay(Duration::from_secs(60));
        let broken: ByteStream = futures::stream::iter([
            Ok(Bytes::from_static(b"part")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "gone")),
        ])
        .boxed();

        assert!(matches!(
            relay.upload("a.txt", broken).await,
            Err(RelayError::MalformedUpload { .. })
        ));
        assert!(backend.is_empty());
        assert!(relay.registry().is_empty());
        assert_eq!(relay.scheduler().armed(), 0);
    }

    #[tokio::test]
    async fn test_expired_object_is_deleted() {
        let (relay, backend) = relay(Duration::from_millis(30));
        relay.upload("b.txt", body(b"bye")).await.unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!backend.contains("b.txt"));
        assert!(relay.registry().is_empty());
        assert!(matches!(
            relay.download("b.txt").await,
            Err(RelayError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_download_name_is_not_found() {
        let (relay, _backend) = relay(Duration::from_secs(60));
        for name in ["", "..", "a/b", ".partial-x"] {
            assert!(matches!(
                relay.download(name).await,
                Err(RelayError::NotFound { .. })
            ));
        }
    }

    #[tokio::test]
    async fn test_sweep_removes_unowned_files() {
        let backend = MemoryBackend::new();
        let store = BlobStore::custom(backend.clone());
        store.create("old.txt", body(b"stale"), 1024).await.unwrap();

        let relay = Relay::new(store, RelayConfig::default());
        relay.upload("new.txt", body(b"fresh")).await.unwrap();
        assert_eq!(relay.orphan_count().await.unwrap(), 1);

        let report = relay.sweep_orphans().await.unwrap();
        assert_eq!(report.found, 1);
        assert_eq!(report.removed, 1);
        assert!(!backend.contains("old.txt"));
        assert!(backend.contains("new.txt"));
    }

    #[tokio::test]
    async fn test_shutdown_stops_timers() {
        let (relay, backend) = relay(Duration::from_millis(50));
        relay.upload("a.txt", body(b"x")).await.unwrap();
        relay.shutdown();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(relay.scheduler().armed(), 0);
        assert!(backend.contains("a.txt"));
    }
}
