//! Share endpoint handlers.

use std::io;
use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::multipart::{Field, MultipartRejection};
use axum::extract::{ConnectInfo, Multipart, Path, State};
use axum::http::{HeaderMap, HeaderValue, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use tracing::debug;

use super::AppError;
use super::audit::{AuditEvent, log_audit_event};
use crate::constants::{SHARE_ROUTE, UPLOAD_FIELD};
use crate::relay::{self, Relay, RelayError, Upload};
use crate::storage::validate_name;

/// Characters escaped when a stored name is placed in a URL path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'\'')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Chunks buffered between the request body and the blob writer.
const PUMP_DEPTH: usize = 8;

/// POST /share - Store the `file` field and answer with a download hint.
pub(crate) async fn upload(
    State(relay): State<Relay>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<String, AppError> {
    let mut multipart = multipart.map_err(|e| {
        debug!(%remote_addr, error = %e, "Request is not a multipart form");
        AppError::TooBig
    })?;
    let field = loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some(UPLOAD_FIELD) => break field,
            Ok(Some(field)) => {
                debug!(field = ?field.name(), "Skipping form field");
            },
            Ok(None) => {
                debug!(%remote_addr, "Upload form has no file field");
                return Err(AppError::TooBig);
            },
            Err(e) => {
                debug!(%remote_addr, error = %e, "Malformed upload form");
                return Err(AppError::TooBig);
            },
        }
    };

    let Some(filename) = field.file_name().map(str::to_owned) else {
        return Err(AppError::InvalidFile);
    };

    let upload = match store_field(&relay, &filename, field).await {
        Ok(upload) => upload,
        Err(err) => {
            audit_rejection(&err, &filename, remote_addr, relay.config().max_upload_size);
            return Err(AppError::from_upload(err));
        },
    };
    if upload.name != filename {
        log_audit_event(AuditEvent::PathTraversalBlocked {
            filename,
            stored_as: upload.name.clone(),
            remote_addr,
        });
    }

    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default();
    Ok(success_body(host, &upload.name))
}

/// Streams one multipart field into the relay.
///
/// The field borrows the request, so its chunks are pumped through a
/// bounded channel into the relay's writer on the same task.
async fn store_field(relay: &Relay, filename: &str, mut field: Field<'_>) -> relay::Result<Upload> {
    let (mut tx, rx) = mpsc::channel::<io::Result<Bytes>>(PUMP_DEPTH);

    let pump = async move {
        loop {
            let item = match field.chunk().await {
                Ok(Some(chunk)) => Ok(chunk),
                Ok(None) => break,
                Err(e) => Err(io::Error::other(e)),
            };
            let failed = item.is_err();
            // A closed receiver means the writer gave up.
            if tx.send(item).await.is_err() || failed {
                break;
            }
        }
    };

    let ((), result) = tokio::join!(pump, relay.upload(filename, rx.boxed()));
    result
}

fn audit_rejection(err: &RelayError, filename: &str, remote_addr: SocketAddr, limit: u64) {
    match err {
        RelayError::TooLarge { limit } => {
            log_audit_event(AuditEvent::UploadTooLarge {
                limit: *limit,
                remote_addr,
            });
        },
        // The body limit tripped before the relay's own ceiling.
        RelayError::MalformedUpload { reason } if reason.contains("limit") => {
            log_audit_event(AuditEvent::UploadTooLarge { limit, remote_addr });
        },
        RelayError::InvalidName { .. } => {
            log_audit_event(AuditEvent::InvalidName {
                name: filename.to_string(),
                remote_addr,
            });
        },
        RelayError::Duplicate { name } => {
            log_audit_event(AuditEvent::DuplicateRejected {
                name: name.clone(),
                remote_addr,
            });
        },
        _ => {},
    }
}

/// Response text for a stored upload.
pub(crate) fn success_body(host: &str, name: &str) -> String {
    let encoded = utf8_percent_encode(name, SEGMENT);
    format!(
        "File uploaded successfully: {name}\n\
         Use this command to download the file: 'curl {host}{SHARE_ROUTE}/{encoded}'\n"
    )
}

/// GET /share/{filename} - Stream the file once, then it is gone.
pub(crate) async fn download(
    State(relay): State<Relay>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    Path(filename): Path<String>,
) -> Result<Response, AppError> {
    let download = match relay.download(&filename).await {
        Ok(download) => download,
        Err(err) => {
            if matches!(err, RelayError::NotFound { .. }) && validate_name(&filename).is_err() {
                log_audit_event(AuditEvent::InvalidName {
                    name: filename,
                    remote_addr,
                });
            }
            return Err(AppError::from_download(err));
        },
    };

    let content_type = HeaderValue::from_str(&download.meta.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let headers = [
        (header::CONTENT_TYPE, content_type),
        (header::CONTENT_LENGTH, HeaderValue::from(download.meta.size)),
    ];
    Ok((headers, Body::from_stream(download.body)).into_response())
}
