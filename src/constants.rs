//! Default values and limits shared across the relay.

/// Default directory holding in-flight uploads.
pub const DEFAULT_UPLOAD_PATH: &str = "./uploads";

/// Default upload ceiling (10 MiB).
pub const DEFAULT_MAX_UPLOAD_SIZE: u64 = 10 * 1024 * 1024;

/// Default time-to-live for an upload, in minutes.
pub const DEFAULT_DELETION_DELAY_MINUTES: u64 = 5;

/// Default listen host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default listen port.
pub const DEFAULT_PORT: u16 = 9090;

/// Extra request-body allowance on top of the upload ceiling for the
/// multipart envelope (boundaries, part headers, small text fields).
pub const MULTIPART_ENVELOPE_BYTES: usize = 64 * 1024;

/// Multipart form field carrying the uploaded file.
pub const UPLOAD_FIELD: &str = "file";

/// Route prefix for both upload and download.
pub const SHARE_ROUTE: &str = "/share";

/// Prefix of hidden staging files written while an upload streams in.
pub const STAGING_PREFIX: &str = ".partial-";

/// Maximum length of a stored object name, in bytes.
pub const MAX_NAME_LEN: usize = 255;

/// Read buffer size used when streaming a blob back to a client.
pub const STREAM_CHUNK_SIZE: usize = 64 * 1024;
