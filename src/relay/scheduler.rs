//! Per-object expiry timers.
//!
//! Each registered record gets one tokio task that sleeps until the record's
//! deadline and then runs the shared deletion path. Timers are never
//! cancelled when a download wins the race; they wake up, find nothing to
//! claim, and exit. All timers stop early when the scheduler shuts down.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use super::reaper::{Reaper, Trigger};
use super::registry::RecordKey;

/// Decrements the armed-timer count when a timer task ends, however it ends.
struct ArmedGuard(Arc<AtomicUsize>);

impl Drop for ArmedGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Arms one-shot expiry timers.
///
/// `ExpiryScheduler` is `Clone`; clones share the shutdown signal and the
/// armed-timer count.
#[derive(Clone)]
pub struct ExpiryScheduler {
    reaper: Reaper,
    shutdown: Arc<watch::Sender<bool>>,
    armed: Arc<AtomicUsize>,
}

impl ExpiryScheduler {
    pub(crate) fn new(reaper: Reaper) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            reaper,
            shutdown: Arc::new(shutdown),
            armed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Arms a timer that deletes `key` at `deadline`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn arm(&self, key: RecordKey, deadline: Instant) -> JoinHandle<()> {
        let reaper = self.reaper.clone();
        let mut shutdown = self.shutdown.subscribe();
        self.armed.fetch_add(1, Ordering::SeqCst);
        let guard = ArmedGuard(self.armed.clone());

        tokio::spawn(async move {
            let _guard = guard;
            let stopped = async move {
                // A dropped sender also ends the wait.
                let _ = shutdown.wait_for(|stopped| *stopped).await;
            };
            tokio::select! {
                () = tokio::time::sleep_until(deadline) => {
                    reaper.remove(&key, Trigger::Expired).await;
                },
                () = stopped => {
                    debug!(name = %key.name, "Expiry timer stopped by shutdown");
                },
            }
        })
    }

    /// Number of timers that have not fired yet.
    pub fn armed(&self) -> usize {
        self.armed.load(Ordering::SeqCst)
    }

    /// Stops every pending timer. Records they guarded stay on disk.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// True once [`Self::shutdown`] has been called.
    pub fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }
}
