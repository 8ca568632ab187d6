//! Reusable byte buffers for fragment reads.
//!
//! A [`BufferPool`] is an explicit resource: the fragment store owns one for
//! the lifetime of the mesh. Buffers are acquired per read and handed back
//! automatically when the [`PooledBuffer`] is dropped.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// Counters describing pool activity since creation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Buffers that had to be freshly allocated.
    pub allocated: usize,
    /// Acquisitions served from the idle list.
    pub reused: usize,
    /// Buffers handed back and kept for reuse.
    pub returned: usize,
}

struct PoolInner {
    idle: Mutex<Vec<Vec<u8>>>,
    max_idle: usize,
    allocated: AtomicUsize,
    reused: AtomicUsize,
    returned: AtomicUsize,
}

impl PoolInner {
    fn release(&self, mut buf: Vec<u8>) {
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < self.max_idle {
            buf.clear();
            idle.push(buf);
            self.returned.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// A bounded free list of byte buffers. Cloning shares the same pool.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    /// Create a pool that keeps at most `max_idle_buffers` returned buffers.
    pub fn new(max_idle_buffers: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                idle: Mutex::new(Vec::with_capacity(max_idle_buffers)),
                max_idle: max_idle_buffers,
                allocated: AtomicUsize::new(0),
                reused: AtomicUsize::new(0),
                returned: AtomicUsize::new(0),
            }),
        }
    }

    /// Borrow a zero-filled buffer of exactly `len` bytes.
    ///
    /// The idle buffer with the smallest sufficient capacity is reused when
    /// one exists.
    pub fn acquire(&self, len: usize) -> PooledBuffer {
        let recycled = {
            let mut idle = self.inner.idle.lock().unwrap_or_else(PoisonError::into_inner);
            let best = idle
                .iter()
                .enumerate()
                .filter(|(_, b)| b.capacity() >= len)
                .min_by_key(|(_, b)| b.capacity())
                .map(|(i, _)| i);
            best.map(|i| idle.swap_remove(i))
        };

        let mut buf = match recycled {
            Some(buf) => {
                self.inner.reused.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(len, capacity = buf.capacity(), "reusing pooled buffer");
                buf
            }
            None => {
                self.inner.allocated.fetch_add(1, Ordering::Relaxed);
                Vec::with_capacity(len)
            }
        };
        buf.resize(len, 0);

        PooledBuffer {
            buf,
            pool: Arc::downgrade(&self.inner),
        }
    }

    /// Number of buffers waiting for reuse.
    pub fn idle_count(&self) -> usize {
        self.inner
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocated: self.inner.allocated.load(Ordering::Relaxed),
            reused: self.inner.reused.load(Ordering::Relaxed),
            returned: self.inner.returned.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("max_idle", &self.inner.max_idle)
            .field("stats", &self.stats())
            .finish()
    }
}

/// A buffer borrowed from a [`BufferPool`].
///
/// Dropping it returns the allocation to the pool. If the pool is already
/// gone the memory is simply freed.
pub struct PooledBuffer {
    buf: Vec<u8>,
    pool: Weak<PoolInner>,
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

impl std::fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.buf.len())
            .finish()
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.upgrade() {
            pool.release(std::mem::take(&mut self.buf));
        }
    }
}
