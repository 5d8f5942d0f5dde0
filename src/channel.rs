//! Bounded byte channels connecting the log core to the socket driver.
//!
//! Two channels exist per context: outbound (device to remote) and inbound
//! (remote to device). Each side of a channel has exactly one user across the
//! module boundary, so the lock inside [`BoundedByteChannel`] is only ever
//! contended by one producer and one consumer and is held for a memcpy.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Fixed-capacity byte pipe with non-blocking push and pull.
pub trait ByteChannel: Send + Sync {
    /// Append as much of `data` as fits and return the number of bytes accepted.
    ///
    /// Never blocks. A short count means the tail of `data` was dropped.
    fn push(&self, data: &[u8]) -> usize;

    /// Move up to `buf.len()` buffered bytes into `buf`, returning how many
    /// were produced. Returns `0` when the channel is empty.
    fn pull(&self, buf: &mut [u8]) -> usize;

    /// Number of bytes currently buffered.
    fn len(&self) -> usize;

    /// Return `true` when nothing is buffered.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of bytes the channel can hold.
    fn capacity(&self) -> usize;

    /// Discard everything currently buffered.
    fn clear(&self);

    /// Total bytes rejected by `push` since creation.
    fn dropped_bytes(&self) -> u64;

    /// Diagnostic name used in log output.
    fn name(&self) -> &str;
}

/// The single [`ByteChannel`] implementation: a bounded FIFO of bytes.
pub struct BoundedByteChannel {
    name: String,
    capacity: usize,
    buffer: Mutex<VecDeque<u8>>,
    dropped: AtomicU64,
}

impl BoundedByteChannel {
    /// Create an empty channel holding at most `capacity` bytes.
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity,
            buffer: Mutex::new(VecDeque::with_capacity(capacity)),
            dropped: AtomicU64::new(0),
        }
    }
}

impl ByteChannel for BoundedByteChannel {
    fn push(&self, data: &[u8]) -> usize {
        let mut buffer = self.buffer.lock();
        let free = self.capacity.saturating_sub(buffer.len());
        let accepted = data.len().min(free);
        buffer.extend(&data[..accepted]);
        let rejected = data.len() - accepted;
        if rejected > 0 {
            self.dropped.fetch_add(rejected as u64, Ordering::Relaxed);
        }
        accepted
    }

    fn pull(&self, buf: &mut [u8]) -> usize {
        let mut buffer = self.buffer.lock();
        let produced = buf.len().min(buffer.len());
        for (slot, byte) in buf.iter_mut().zip(buffer.drain(..produced)) {
            *slot = byte;
        }
        produced
    }

    fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn clear(&self) {
        self.buffer.lock().clear();
    }

    fn dropped_bytes(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for BoundedByteChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedByteChannel")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn push_accepts_up_to_free_space() {
        let channel = BoundedByteChannel::new("tx", 4);
        assert_eq!(channel.push(b"ab"), 2);
        assert_eq!(channel.push(b"cdef"), 2);
        assert_eq!(channel.len(), 4);
        assert_eq!(channel.dropped_bytes(), 2);
        assert_eq!(channel.push(b"g"), 0);
        assert_eq!(channel.dropped_bytes(), 3);
    }

    #[rstest]
    fn pull_returns_fifo_bytes_and_frees_space() {
        let channel = BoundedByteChannel::new("rx", 8);
        channel.push(b"hello");
        let mut buf = [0u8; 3];
        assert_eq!(channel.pull(&mut buf), 3);
        assert_eq!(&buf, b"hel");
        let mut rest = [0u8; 8];
        assert_eq!(channel.pull(&mut rest), 2);
        assert_eq!(&rest[..2], b"lo");
        assert_eq!(channel.pull(&mut rest), 0);
    }

    #[rstest]
    fn clear_discards_buffered_bytes() {
        let channel = BoundedByteChannel::new("tx", 8);
        channel.push(b"stale");
        channel.clear();
        assert!(channel.is_empty());
        assert_eq!(channel.push(b"12345678"), 8);
    }

    #[rstest]
    fn zero_capacity_rejects_everything() {
        let channel = BoundedByteChannel::new("none", 0);
        assert_eq!(channel.push(b"x"), 0);
        let mut buf = [0u8; 1];
        assert_eq!(channel.pull(&mut buf), 0);
    }
}
