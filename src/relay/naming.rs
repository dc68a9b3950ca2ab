//! Client file name sanitization.

use crate::storage::{StoreError, validate_name};

/// Reduces a client-supplied file name to a storable object name.
///
/// Directory components are stripped (both `/` and `\` count as separators,
/// trailing separators are ignored), keeping only the final segment. The
/// result must then pass [`validate_name`].
///
/// # Examples
///
/// ```
/// use ephemera::relay::sanitize_filename;
///
/// assert_eq!(sanitize_filename("../../etc/passwd").unwrap(), "passwd");
/// assert_eq!(sanitize_filename("C:\\Users\\me\\notes.txt").unwrap(), "notes.txt");
/// assert!(sanitize_filename("..").is_err());
/// ```
///
/// # Errors
///
/// Returns `InvalidName` if nothing storable remains.
pub fn sanitize_filename(raw: &str) -> Result<String, StoreError> {
    let is_separator = |c: char| c == '/' || c == '\\';
    let trimmed = raw.trim_end_matches(is_separator);
    let base = trimmed.rsplit(is_separator).next().unwrap_or(trimmed);
    validate_name(base)?;
    Ok(base.to_string())
}
