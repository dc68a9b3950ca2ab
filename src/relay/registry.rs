//! In-memory record registry.
//!
//! Maps object names to their lifecycle state. Every transition happens
//! under one `parking_lot::Mutex`, held only for map bookkeeping and never
//! across I/O. [`RecordRegistry::try_begin_deletion`] is the single point
//! that decides which deletion trigger wins.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::storage::BlobMeta;

/// Lifecycle of a stored object. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// Readable and eligible for either deletion trigger.
    Live,
    /// A trigger has claimed the deletion; later triggers are no-ops.
    Deleting,
    /// Storage object removed; the record is purged on entering this state.
    Gone,
}

/// Distinguishes successive uploads that reuse the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId(Uuid);

impl RecordId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Identifies one particular record: name plus generation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub name: String,
    pub id: RecordId,
}

/// One uploaded blob.
#[derive(Debug, Clone)]
pub struct ObjectRecord {
    pub id: RecordId,
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub created_at: DateTime<Utc>,
    /// `created_at + ttl`; never extended.
    pub expires_at: DateTime<Utc>,
    /// Monotonic twin of `expires_at`, used to arm the expiry timer.
    pub deadline: Instant,
    pub state: RecordState,
}

impl ObjectRecord {
    /// Builds a `Live` record for a freshly committed blob.
    pub fn new(meta: &BlobMeta, ttl: Duration) -> Self {
        let created_at = Utc::now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| created_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            id: RecordId::new(),
            name: meta.name.clone(),
            path: meta.path.clone(),
            size: meta.size,
            created_at,
            expires_at,
            deadline: far_deadline(ttl),
            state: RecordState::Live,
        }
    }

    /// Key for this record.
    pub fn key(&self) -> RecordKey {
        RecordKey {
            name: self.name.clone(),
            id: self.id,
        }
    }
}

/// Deadline `ttl` from now, saturating at roughly thirty years.
fn far_deadline(ttl: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(ttl)
        .unwrap_or_else(|| now + Duration::from_secs(30 * 365 * 24 * 60 * 60))
}

/// Answer to a deletion claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletionClaim {
    /// The caller won; it must delete this path and then finalize.
    Granted(PathBuf),
    /// Another trigger already claimed the record.
    AlreadyDeleting,
    /// No such record (never registered, or already purged).
    NotFound,
}

/// Registry errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// An active record or an in-flight upload already owns the name.
    #[error("an object named {name:?} is already shared")]
    DuplicateName { name: String },
}

#[derive(Default)]
struct Inner {
    records: HashMap<String, ObjectRecord>,
    /// Names with an upload currently streaming to storage.
    reserved: HashSet<String>,
}

impl Inner {
    fn is_taken(&self, name: &str) -> bool {
        self.records.contains_key(name) || self.reserved.contains(name)
    }
}

/// Process-wide name → record map.
///
/// `RecordRegistry` is `Clone`; clones share the same map.
#[derive(Clone, Default)]
pub struct RecordRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl RecordRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `name` for an upload that is about to stream to storage.
    ///
    /// The claim lasts until the returned [`Reservation`] registers a record
    /// or is dropped.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateName` if a record or another upload holds the name.
    pub fn reserve(&self, name: &str) -> Result<Reservation, RegistryError> {
        let mut inner = self.inner.lock();
        if inner.is_taken(name) {
            return Err(RegistryError::DuplicateName {
                name: name.to_string(),
            });
        }
        inner.reserved.insert(name.to_string());
        Ok(Reservation {
            registry: self.clone(),
            name: name.to_string(),
            settled: false,
        })
    }

    /// Inserts a new `Live` record.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateName` if an active record has the same name. The
    /// existing record is left untouched.
    pub fn register(&self, record: ObjectRecord) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock();
        if inner.records.contains_key(&record.name) {
            return Err(RegistryError::DuplicateName { name: record.name });
        }
        Self::insert_live(&mut inner, record);
        Ok(())
    }

    fn insert_live(inner: &mut Inner, mut record: ObjectRecord) {
        record.state = RecordState::Live;
        debug!(name = %record.name, id = %record.id, "Record registered");
        inner.records.insert(record.name.clone(), record);
    }

    /// Returns the record for `name` if it is still `Live`.
    pub fn lookup(&self, name: &str) -> Option<ObjectRecord> {
        let inner = self.inner.lock();
        inner
            .records
            .get(name)
            .filter(|r| r.state == RecordState::Live)
            .cloned()
    }

    /// Atomically moves the record `(name, id)` from `Live` to `Deleting`.
    ///
    /// Exactly one caller per record receives [`DeletionClaim::Granted`].
    pub fn try_begin_deletion(&self, name: &str, id: RecordId) -> DeletionClaim {
        let mut inner = self.inner.lock();
        match inner.records.get_mut(name) {
            Some(record) if record.id == id => match record.state {
                RecordState::Live => {
                    record.state = RecordState::Deleting;
                    DeletionClaim::Granted(record.path.clone())
                },
                RecordState::Deleting | RecordState::Gone => DeletionClaim::AlreadyDeleting,
            },
            // A different generation under the same name is not ours to touch.
            Some(_) | None => DeletionClaim::NotFound,
        }
    }

    /// Marks the record `Gone` and purges it. Only a `Deleting` record of the
    /// matching generation is finalized.
    pub fn finalize(&self, name: &str, id: RecordId) -> Option<ObjectRecord> {
        let mut inner = self.inner.lock();
        let claimed = inner
            .records
            .get(name)
            .is_some_and(|r| r.id == id && r.state == RecordState::Deleting);
        if !claimed {
            return None;
        }
        let mut record = inner.records.remove(name)?;
        record.state = RecordState::Gone;
        Some(record)
    }

    /// Number of records (live or being deleted).
    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    /// Returns true if no records are held.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().records.is_empty()
    }

    /// Returns true if `name` is owned by a record or an in-flight upload.
    pub fn is_taken(&self, name: &str) -> bool {
        self.inner.lock().is_taken(name)
    }

    /// Copies of all `Live` records, sorted by name.
    pub fn snapshot(&self) -> Vec<ObjectRecord> {
        let inner = self.inner.lock();
        let mut live: Vec<ObjectRecord> = inner
            .records
            .values()
            .filter(|r| r.state == RecordState::Live)
            .cloned()
            .collect();
        live.sort_by(|a, b| a.name.cmp(&b.name));
        live
    }
}

/// A name held for an upload in progress. Released on drop unless a record
/// was registered through it.
pub struct Reservation {
    registry: RecordRegistry,
    name: String,
    settled: bool,
}

impl Reservation {
    /// The reserved name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Converts the reservation into a `Live` record. `record` must carry the
    /// reserved name.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateName` if a record already holds the name.
    pub fn register(mut self, record: ObjectRecord) -> Result<(), RegistryError> {
        debug_assert_eq!(record.name, self.name, "record registered under another reservation");
        let mut inner = self.registry.inner.lock();
        inner.reserved.remove(&self.name);
        self.settled = true;
        if inner.records.contains_key(&record.name) {
            return Err(RegistryError::DuplicateName { name: record.name });
        }
        RecordRegistry::insert_live(&mut inner, record);
        Ok(())
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.settled {
            self.registry.inner.lock().reserved.remove(&self.name);
        }
    }
}

impl fmt::Debug for Reservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reservation")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
