use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use more_asserts::*;

use crate::RandomPayload;

/// Called with the size of each chunk handed to the transport.
pub type ReadCallback = Arc<dyn Fn(u64) + Send + Sync + 'static>;

/// Supplies upload data on demand to a transport that pulls chunks when it is ready.
///
/// Each pull gets `min(remaining, offered capacity, payload length)` bytes.  A rewind
/// restarts the upload from byte 0; it is only ever issued between pulls.
pub struct UploadDataProvider {
    payload: RandomPayload,
    bytes_total: u64,
    bytes_remaining: u64,

    /// Capacity used when the provider is polled as a stream.
    read_capacity: usize,
    on_read: ReadCallback,
}

impl UploadDataProvider {
    pub fn new(payload: RandomPayload, bytes_total: u64, read_capacity: usize, on_read: ReadCallback) -> Self {
        Self {
            payload,
            bytes_total,
            bytes_remaining: bytes_total,
            read_capacity,
            on_read,
        }
    }

    /// Bytes still to be supplied.
    pub fn length(&self) -> u64 {
        self.bytes_remaining
    }

    pub fn bytes_total(&self) -> u64 {
        self.bytes_total
    }

    /// Fills at most `capacity` bytes; returns None once everything has been supplied.
    pub fn read(&mut self, capacity: usize) -> Option<Bytes> {
        if self.bytes_remaining == 0 {
            return None;
        }

        let to_write = self.bytes_remaining.min(capacity as u64);
        let chunk = self.payload.chunk(to_write);
        debug_assert_le!(chunk.len() as u64, self.bytes_remaining);

        self.bytes_remaining -= chunk.len() as u64;
        (self.on_read)(chunk.len() as u64);

        Some(chunk)
    }

    /// Restarts supply from byte 0.  reqwest never replays a streamed body, so nothing
    /// in the HTTP path calls this; it is here for transports that retry an upload.
    pub fn rewind(&mut self) {
        self.bytes_remaining = self.bytes_total;
    }
}

impl Stream for UploadDataProvider {
    type Item = std::result::Result<Bytes, std::io::Error>;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let capacity = self.read_capacity;
        Poll::Ready(self.read(capacity).map(Ok))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let per_read = self.read_capacity.min(self.payload.len()).max(1) as u64;
        let n = self.bytes_remaining.div_ceil(per_read) as usize;
        (n, Some(n))
    }
}
