//! HTTP error responses.
//!
//! Every failure is answered with a short plain-text line, the way a client
//! driving the service with curl expects to read it.

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::relay::RelayError;

/// Errors a handler can answer with.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Oversized, malformed, or missing the file field.
    #[error("File too big")]
    TooBig,

    /// The file name cannot be stored.
    #[error("Invalid file")]
    InvalidFile,

    /// Another live upload already uses the name.
    #[error("File already shared")]
    AlreadyShared,

    /// Unknown, expired, or already downloaded.
    #[error("404 page not found")]
    NotFound,

    /// Writing the upload failed.
    #[error("Failed to save file")]
    SaveFailed(#[source] RelayError),

    /// Reading a stored file failed.
    #[error("Failed to read file")]
    ReadFailed(#[source] RelayError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::TooBig | Self::InvalidFile => StatusCode::BAD_REQUEST,
            Self::AlreadyShared => StatusCode::CONFLICT,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::SaveFailed(_) | Self::ReadFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Maps an upload failure.
    pub(crate) fn from_upload(err: RelayError) -> Self {
        match err {
            RelayError::TooLarge { .. } | RelayError::MalformedUpload { .. } => Self::TooBig,
            RelayError::InvalidName { .. } => Self::InvalidFile,
            RelayError::Duplicate { .. } => Self::AlreadyShared,
            RelayError::NotFound { .. } => Self::NotFound,
            other => Self::SaveFailed(other),
        }
    }

    /// Maps a download failure.
    pub(crate) fn from_download(err: RelayError) -> Self {
        match err {
            RelayError::NotFound { .. } | RelayError::InvalidName { .. } => Self::NotFound,
            other => Self::ReadFailed(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let Self::SaveFailed(source) | Self::ReadFailed(source) = &self {
            error!(error = %source, status = status.as_u16(), "Request failed");
        }
        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            format!("{self}\n"),
        )
            .into_response()
    }
}
