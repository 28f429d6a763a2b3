//! Captured data unit.

use bytes::{Buf, Bytes};

/// One unit of captured stream data: an owned buffer of fixed capacity
/// plus a live window over the bytes still awaiting consumption.
///
/// A chunk is produced by one device read, handed downstream exactly
/// once, and consumed (fully or partially) exactly once by the writer.
/// The live window only ever shrinks from the front, via [`advance`].
///
/// [`advance`]: Chunk::advance
#[derive(Debug)]
pub struct Chunk {
    data: Bytes,
    capacity: usize,
}

impl Chunk {
    /// Wrap `data` read into a buffer of `capacity` bytes. The live
    /// window starts as the whole of `data`, clamped to `capacity`.
    pub fn new(mut data: Bytes, capacity: usize) -> Self {
        data.truncate(capacity);
        Self { data, capacity }
    }

    /// Capacity of the backing buffer, used for outstanding-memory
    /// estimates regardless of how full the live window is.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes remaining in the live window.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The live window itself.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Shrink the live window from the front by `n` bytes, clamped to
    /// the window length. Used after a partial write so only the
    /// unwritten remainder is retried.
    pub fn advance(&mut self, n: usize) {
        self.data.advance(n.min(self.data.len()));
    }
}
