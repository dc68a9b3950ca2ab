//! Blob store: a thin layer over a single upload directory.
//!
//! Supports multiple backends:
//!
//! - **FilesystemBackend**: files in one directory (production)
//! - **MemoryBackend**: in-process map with delete counters (tests/embedding)
//!
//! Security features:
//! - Names are a single path component; anything that could resolve outside
//!   the directory is rejected with `InvalidName`
//! - Uploads stream through a staging file, so a rejected or interrupted
//!   upload never leaves bytes under the served name
//! - Deleting an absent blob is success, so racing deleters never fail

mod backend;
mod error;
mod filesystem;
mod memory;
mod service;
mod types;
mod validation;

pub use backend::BlobBackend;
pub use error::{Result, StoreError};
pub use filesystem::FilesystemBackend;
pub use memory::MemoryBackend;
pub use service::BlobStore;
pub use types::{BlobMeta, BlobReader, ByteStream, DeleteOutcome};
pub use validation::validate_name;
