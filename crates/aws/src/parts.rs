//! Cuts a byte stream into fixed-size upload parts.

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use std::io;
use turbocache_storage::ByteStream;

/// Size of one multipart upload part.
pub const PART_SIZE: usize = 8 * 1024 * 1024;

/// Yields parts of exactly `part_size` bytes; only the last may be shorter.
///
/// At most one part plus one incoming chunk is held in memory.
pub(crate) struct PartReader {
    body: ByteStream,
    buffer: BytesMut,
    part_size: usize,
    exhausted: bool,
}

impl PartReader {
    pub(crate) fn new(body: ByteStream, part_size: usize) -> Self {
        Self {
            body,
            buffer: BytesMut::new(),
            part_size,
            exhausted: false,
        }
    }

    /// The next part, or `None` once the stream is drained.
    pub(crate) async fn next_part(&mut self) -> io::Result<Option<Bytes>> {
        while !self.exhausted && self.buffer.len() < self.part_size {
            match self.body.next().await {
                Some(chunk) => self.buffer.extend_from_slice(&chunk?),
                None => self.exhausted = true,
            }
        }
        if self.buffer.is_empty() {
            return Ok(None);
        }
        let take = self.buffer.len().min(self.part_size);
        Ok(Some(self.buffer.split_to(take).freeze()))
    }
}
