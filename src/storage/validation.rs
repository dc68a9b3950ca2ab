//! Object name validation.
//!
//! Every object lives directly in the store's directory, so a valid name is
//! exactly one normal path component. Anything that could resolve outside
//! the directory is rejected rather than rewritten; stripping client paths
//! down to a base name happens one layer up, in the relay.

use std::path::{Component, Path, PathBuf};

use super::error::{Result, StoreError};
use crate::constants::{MAX_NAME_LEN, STAGING_PREFIX};

/// Validates an object name.
///
/// # Security
/// Rejects names that:
/// - Are empty or longer than [`MAX_NAME_LEN`] bytes
/// - Contain NUL or other control characters
/// - Contain a path separator (`/` or `\`)
/// - Are `.` or `..`, absolute, or carry a drive prefix
/// - Collide with the staging-file prefix
///
/// # Examples
/// ```
/// use ephemera::storage::validate_name;
///
/// assert!(validate_name("report.pdf").is_ok());
/// assert!(validate_name("../etc/passwd").is_err());
/// assert!(validate_name("/etc/passwd").is_err());
/// assert!(validate_name("").is_err());
/// ```
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(StoreError::invalid_name(name, "name is empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(StoreError::invalid_name(name, "name is too long"));
    }
    if name.chars().any(char::is_control) {
        return Err(StoreError::invalid_name(name, "name contains control characters"));
    }
    if name.contains(['/', '\\']) {
        return Err(StoreError::invalid_name(name, "name contains a path separator"));
    }
    if name.starts_with(STAGING_PREFIX) {
        return Err(StoreError::invalid_name(name, "name uses a reserved prefix"));
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        (Some(Component::ParentDir), _) => {
            Err(StoreError::invalid_name(name, "name cannot be '..'"))
        },
        (Some(Component::CurDir), _) => Err(StoreError::invalid_name(name, "name cannot be '.'")),
        (Some(Component::RootDir | Component::Prefix(_)), _) => {
            Err(StoreError::invalid_name(name, "name cannot be absolute"))
        },
        _ => Err(StoreError::invalid_name(name, "name must be a single component")),
    }
}

/// Returns the filesystem path for an object given the store directory.
pub(crate) fn object_path(base_dir: &Path, name: &str) -> Result<PathBuf> {
    validate_name(name)?;
    Ok(base_dir.join(name))
}
