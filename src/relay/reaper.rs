//! The single deletion path shared by both triggers.
//!
//! A trigger first claims the record (an in-memory state transition), and
//! only the winner goes on to delete the blob and finalize the record.

use backon::{ExponentialBuilder, Retryable};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::registry::{DeletionClaim, RecordKey, RecordRegistry};
use crate::storage::{BlobStore, DeleteOutcome, StoreError};

/// What caused a deletion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// The expiry timer fired.
    Expired,
    /// A download finished streaming.
    Downloaded,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expired => f.write_str("expired"),
            Self::Downloaded => f.write_str("downloaded"),
        }
    }
}

/// Backoff for retrying a failed blob delete.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    fn build_backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.initial_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries)
            .with_jitter()
    }
}

/// Proof that the holder won the deletion claim for one record.
#[derive(Debug)]
#[must_use = "a granted claim leaves the record in Deleting until reaped"]
pub(crate) struct Ticket {
    key: RecordKey,
    path: PathBuf,
    trigger: Trigger,
}

/// Performs claimed deletions.
#[derive(Clone)]
pub(crate) struct Reaper {
    store: BlobStore,
    registry: RecordRegistry,
    retry: RetryPolicy,
}

impl Reaper {
    pub(crate) fn new(store: BlobStore, registry: RecordRegistry, retry: RetryPolicy) -> Self {
        Self {
            store,
            registry,
            retry,
        }
    }

    /// Tries to win the deletion of `key`. Never blocks on I/O.
    pub(crate) fn claim(&self, key: &RecordKey, trigger: Trigger) -> Option<Ticket> {
        match self.registry.try_begin_deletion(&key.name, key.id) {
            DeletionClaim::Granted(path) => {
                debug!(name = %key.name, %trigger, "Deletion claimed");
                Some(Ticket {
                    key: key.clone(),
                    path,
                    trigger,
                })
            },
            DeletionClaim::AlreadyDeleting => {
                debug!(name = %key.name, %trigger, "Deletion already in progress, nothing to do");
                None
            },
            DeletionClaim::NotFound => {
                debug!(name = %key.name, %trigger, "Record already gone, nothing to do");
                None
            },
        }
    }

    /// Deletes the claimed blob and purges the record.
    ///
    /// Delete failures are retried with backoff, then logged and absorbed;
    /// the record is finalized either way so the name stops resolving.
    pub(crate) async fn reap(&self, ticket: Ticket) -> Option<DeleteOutcome> {
        let Ticket { key, path, trigger } = ticket;
        let store = &self.store;

        let outcome = (|| async { store.delete(&path).await })
            .retry(self.retry.build_backoff())
            .when(|e: &StoreError| matches!(e, StoreError::Io { .. }))
            .notify(|e: &StoreError, delay: Duration| {
                warn!(
                    name = %key.name,
                    error = %e,
                    next_delay_ms = delay.as_millis() as u64,
                    "Blob delete failed, will retry"
                );
            })
            .await;

        let outcome = match outcome {
            Ok(DeleteOutcome::Deleted) => {
                info!(name = %key.name, %trigger, "File deleted");
                Some(DeleteOutcome::Deleted)
            },
            Ok(DeleteOutcome::AlreadyAbsent) => {
                debug!(name = %key.name, %trigger, "File was already absent");
                Some(DeleteOutcome::AlreadyAbsent)
            },
            Err(e) => {
                error!(
                    name = %key.name,
                    path = %path.display(),
                    %trigger,
                    error = %e,
                    "Failed to delete file, leaving it orphaned"
                );
                None
            },
        };

        self.registry.finalize(&key.name, key.id);
        outcome
    }

    /// Claim then reap, for callers that can wait for the delete.
    pub(crate) async fn remove(&self, key: &RecordKey, trigger: Trigger) -> Option<DeleteOutcome> {
        let ticket = self.claim(key, trigger)?;
        self.reap(ticket).await
    }

    /// Claim now, reap on a background task.
    pub(crate) fn remove_in_background(&self, key: &RecordKey, trigger: Trigger) -> bool {
        match self.claim(key, trigger) {
            Some(ticket) => {
                let reaper = self.clone();
                tokio::spawn(async move {
                    reaper.reap(ticket).await;
                });
                true
            },
            None => false,
        }
    }
}
