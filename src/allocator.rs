//! Buffer allocation for formatted log lines.
//!
//! Every line produced on the emit path borrows its storage from a
//! [`LineAllocator`] and hands it back when dropped. Allocation may fail; the
//! callers degrade instead of blocking on memory pressure.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Source of byte buffers for formatted lines.
pub trait LineAllocator: Send + Sync {
    /// Return an empty buffer with room for exactly `len` bytes, or `None`
    /// when the memory cannot be obtained.
    fn allocate(&self, len: usize) -> Option<Vec<u8>>;

    /// Take back a buffer previously returned by [`allocate`](Self::allocate).
    fn release(&self, buf: Vec<u8>) {
        drop(buf);
    }
}

/// Allocator backed by the global heap.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeapAllocator;

impl LineAllocator for HeapAllocator {
    fn allocate(&self, len: usize) -> Option<Vec<u8>> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(len).ok()?;
        Some(buf)
    }
}

/// Heap allocator that refuses requests once `budget` bytes are outstanding.
///
/// Outstanding bytes are counted by buffer capacity, so a heap that rounds a
/// request up is charged for the rounding.
#[derive(Debug)]
pub struct BudgetAllocator {
    budget: usize,
    outstanding: AtomicUsize,
}

impl BudgetAllocator {
    pub fn new(budget: usize) -> Self {
        Self {
            budget,
            outstanding: AtomicUsize::new(0),
        }
    }

    /// Bytes currently lent out to live lines.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    pub fn budget(&self) -> usize {
        self.budget
    }
}

impl LineAllocator for BudgetAllocator {
    fn allocate(&self, len: usize) -> Option<Vec<u8>> {
        self.outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current
                    .checked_add(len)
                    .filter(|total| *total <= self.budget)
            })
            .ok()?;
        let Some(buf) = HeapAllocator.allocate(len) else {
            self.outstanding.fetch_sub(len, Ordering::AcqRel);
            return None;
        };
        // release() sees the capacity, which the heap may round up.
        let slack = buf.capacity() - len;
        if slack > 0 {
            self.outstanding.fetch_add(slack, Ordering::AcqRel);
        }
        Some(buf)
    }

    fn release(&self, buf: Vec<u8>) {
        self.outstanding.fetch_sub(buf.capacity(), Ordering::AcqRel);
    }
}

/// Owned buffer that returns its storage to the allocator on drop.
pub struct LineBuffer {
    bytes: Vec<u8>,
    allocator: Arc<dyn LineAllocator>,
}

impl LineBuffer {
    /// Obtain a buffer with room for `len` bytes from `allocator`.
    pub fn allocate(allocator: &Arc<dyn LineAllocator>, len: usize) -> Option<Self> {
        let mut bytes = allocator.allocate(len)?;
        bytes.clear();
        Some(Self {
            bytes,
            allocator: Arc::clone(allocator),
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut Vec<u8> {
        &mut self.bytes
    }
}

impl Drop for LineBuffer {
    fn drop(&mut self) {
        self.allocator.release(std::mem::take(&mut self.bytes));
    }
}

impl fmt::Debug for LineBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineBuffer")
            .field("len", &self.bytes.len())
            .finish()
    }
}
