//! Startup handling of files left behind by a previous process.
//!
//! Records and timers live only in memory, so anything in the upload
//! directory at startup has no deletion pending and would otherwise stay
//! forever.

use tracing::{info, warn};

use super::registry::RecordRegistry;
use crate::storage::{BlobStore, DeleteOutcome, Result};

/// Result of an orphan sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Files found with no live record.
    pub found: usize,
    /// Files removed.
    pub removed: usize,
    /// Files that could not be removed.
    pub failed: usize,
}

/// Files in the store that no record owns.
async fn orphans(store: &BlobStore, registry: &RecordRegistry) -> Result<Vec<std::path::PathBuf>> {
    let paths = store.list().await?;
    Ok(paths
        .into_iter()
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_none_or(|name| !registry.is_taken(name))
        })
        .collect())
}

/// Deletes every orphaned file.
///
/// # Errors
///
/// Returns an error only if the store cannot be listed; individual delete
/// failures are counted and logged.
pub(crate) async fn sweep(store: &BlobStore, registry: &RecordRegistry) -> Result<SweepReport> {
    let orphans = orphans(store, registry).await?;
    let mut report = SweepReport {
        found: orphans.len(),
        ..SweepReport::default()
    };

    for path in orphans {
        match store.delete(&path).await {
            Ok(DeleteOutcome::Deleted | DeleteOutcome::AlreadyAbsent) => report.removed += 1,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to remove orphaned file");
                report.failed += 1;
            },
        }
    }

    if report.found > 0 {
        info!(
            found = report.found,
            removed = report.removed,
            failed = report.failed,
            "Swept orphaned files from a previous run"
        );
    }
    Ok(report)
}

/// Counts orphaned files without touching them.
///
/// # Errors
///
/// Returns an error if the store cannot be listed.
pub(crate) async fn count(store: &BlobStore, registry: &RecordRegistry) -> Result<usize> {
    Ok(orphans(store, registry).await?.len())
}
