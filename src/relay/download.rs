//! Download body that triggers deletion once fully read.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use super::reaper::{Reaper, Trigger};
use super::registry::RecordKey;
use crate::storage::{BlobMeta, ByteStream};

/// A blob being served to one client.
pub struct Download {
    pub meta: BlobMeta,
    pub body: DownloadBody,
}

impl std::fmt::Debug for Download {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Download")
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

/// Byte stream over a blob that claims the record's deletion as soon as the
/// last byte has been read.
///
/// The claim happens when the final chunk is read from storage, before it is
/// handed to the caller, not after the transport has written it out. A
/// client that disconnects after that last read has consumed its link
/// without receiving the tail. In exchange, by the time any client has the
/// whole payload the name no longer resolves, so a second request can never
/// be served. The physical delete runs on a background task.
///
/// An empty blob has no last byte to read, and a server may send its
/// response without polling the body at all, so it is claimed on open.
///
/// If the stream errors or is dropped early, no deletion is triggered and the
/// expiry timer stays responsible for the record.
pub struct DownloadBody {
    inner: ByteStream,
    remaining: u64,
    on_drained: Option<(Reaper, RecordKey)>,
}

impl DownloadBody {
    pub(crate) fn new(inner: ByteStream, size: u64, reaper: Reaper, key: RecordKey) -> Self {
        let mut body = Self {
            inner,
            remaining: size,
            on_drained: Some((reaper, key)),
        };
        if size == 0 {
            body.drained();
        }
        body
    }

    fn drained(&mut self) {
        if let Some((reaper, key)) = self.on_drained.take() {
            reaper.remove_in_background(&key, Trigger::Downloaded);
        }
    }
}

impl Stream for DownloadBody {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        match ready!(this.inner.poll_next_unpin(cx)) {
            Some(Ok(chunk)) => {
                this.remaining = this.remaining.saturating_sub(chunk.len() as u64);
                if this.remaining == 0 {
                    this.drained();
                }
                Poll::Ready(Some(Ok(chunk)))
            },
            Some(Err(e)) => {
                this.on_drained = None;
                Poll::Ready(Some(Err(e)))
            },
            None => {
                this.drained();
                Poll::Ready(None)
            },
        }
    }
}
