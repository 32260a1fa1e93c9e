//! Growable receive buffer for accumulating partial socket reads.
//!
//! The buffer is a contiguous byte arena with an explicit capacity policy:
//! it starts at 8 KiB, doubles until the pending append fits, and refuses
//! to grow past 16 MiB. Consuming shifts the unread suffix back to offset
//! zero so the parser can always scan from the start of the slice.

use crate::error::{Result, SsdbError};

/// Initial capacity allocated on the first append (8 KiB).
pub const INITIAL_CAPACITY: usize = 8 * 1024;

/// Hard capacity limit (16 MiB). Appends that would require more fail
/// with [`SsdbError::BufferLimit`].
pub const MAX_CAPACITY: usize = 16 * 1024 * 1024;

/// Contiguous growable byte buffer with append/consume/clear operations.
#[derive(Debug, Default)]
pub struct RecvBuffer {
    data: Vec<u8>,
}

impl RecvBuffer {
    /// Create an empty buffer. No storage is allocated until the first
    /// append.
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Append bytes to the end of the buffer, growing capacity as needed.
    ///
    /// # Errors
    ///
    /// Returns [`SsdbError::BufferLimit`] when the required capacity would
    /// exceed [`MAX_CAPACITY`]. The buffer is left unchanged in that case.
    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        let required = self.data.len() + bytes.len();
        if required > MAX_CAPACITY {
            return Err(SsdbError::BufferLimit {
                required,
                limit: MAX_CAPACITY,
            });
        }
        if required > self.data.capacity() {
            let mut target = self.data.capacity().max(INITIAL_CAPACITY);
            while target < required {
                target *= 2;
            }
            let target = target.min(MAX_CAPACITY);
            self.data.reserve_exact(target - self.data.len());
        }
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    /// Remove the first `n` bytes, shifting the remaining suffix to offset
    /// zero. Consuming `len` or more empties the buffer.
    pub fn consume(&mut self, n: usize) {
        if n >= self.data.len() {
            self.data.clear();
            return;
        }
        self.data.copy_within(n.., 0);
        let remaining = self.data.len() - n;
        self.data.truncate(remaining);
    }

    /// Drop the backing storage entirely. The next append reallocates.
    pub fn clear(&mut self) {
        self.data = Vec::new();
    }

    /// View of the buffered bytes.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Number of buffered bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the buffer holds no bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Currently allocated capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }
}
