use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::queue::SegQueue;

use crate::buffer::Buffer;

/// Initial capacity of the buffers a [`Pool::new`] pool allocates.
pub const DEFAULT_CAPACITY: usize = 1024;

/// A lock-free pool of reusable [`Buffer`]s.
///
/// Cloning a `Pool` is cheap and yields a handle to the same pool. The pool is unbounded:
/// every returned buffer is kept, and a buffer that is dropped instead of returned is simply
/// deallocated. There is no backpressure; [`Pool::get`] allocates whenever nothing is idle.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<Inner>,
}

struct Inner {
    idle: SegQueue<Vec<u8>>,
    buffer_capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    returns: AtomicU64,
}

/// Point-in-time counters of a [`Pool`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    /// Checkouts served by an idle buffer
    pub hits: u64,
    /// Checkouts that had to allocate
    pub misses: u64,
    /// Buffers given back
    pub returns: u64,
}

impl Pool {
    /// Creates a pool handing out buffers with [`DEFAULT_CAPACITY`].
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a pool whose freshly allocated buffers have room for `buffer_capacity` bytes.
    pub fn with_capacity(buffer_capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                idle: SegQueue::new(),
                buffer_capacity,
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                returns: AtomicU64::new(0),
            }),
        }
    }

    /// Retrieves an empty buffer, allocating one if none is idle.
    pub fn get(&self) -> Buffer {
        let bs = match self.inner.idle.pop() {
            Some(bs) => {
                self.inner.hits.fetch_add(1, Ordering::Relaxed);
                bs
            }
            None => {
                self.inner.misses.fetch_add(1, Ordering::Relaxed);
                Vec::with_capacity(self.inner.buffer_capacity)
            }
        };
        debug_assert!(bs.is_empty());
        Buffer::from_parts(bs, self.clone())
    }

    /// Returns a buffer to the pool. Its content is discarded, its storage kept.
    pub fn put(&self, buf: Buffer) {
        let mut bs = buf.into_vec();
        bs.clear();
        self.inner.idle.push(bs);
        self.inner.returns.fetch_add(1, Ordering::Relaxed);
    }

    /// The number of buffers currently waiting to be reused.
    pub fn idle(&self) -> usize {
        self.inner.idle.len()
    }

    /// The capacity newly allocated buffers start with.
    pub fn buffer_capacity(&self) -> usize {
        self.inner.buffer_capacity
    }

    pub fn stats(&self) -> Stats {
        Stats {
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
            returns: self.inner.returns.load(Ordering::Relaxed),
        }
    }
}

impl Default for Pool {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("buffer_capacity", &self.inner.buffer_capacity)
            .field("idle", &self.inner.idle.len())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DUMMY_DATA: &str = "dummy data";

    #[test]
    fn buffers_come_out_empty() {
        let pool = Pool::new();
        for _ in 0..100 {
            let mut buf = pool.get();
            assert_eq!(buf.len(), 0);
            assert!(buf.cap() > 0, "expected non-zero capacity");
            buf.append_str(DUMMY_DATA);
            assert_eq!(buf.len(), DUMMY_DATA.len());
            buf.free();
        }
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn storage_is_reused_without_reallocation() {
        let pool = Pool::with_capacity(64);
        let mut buf = pool.get();
        let cap = buf.cap();
        let ptr = buf.as_bytes().as_ptr();
        buf.append_str(DUMMY_DATA);
        buf.free();

        for _ in 0..10 {
            let mut buf = pool.get();
            assert_eq!(buf.len(), 0);
            assert_eq!(buf.cap(), cap);
            assert_eq!(buf.as_bytes().as_ptr(), ptr);
            buf.append_str(DUMMY_DATA);
            pool.put(buf);
        }

        assert_eq!(
            pool.stats(),
            Stats {
                hits: 10,
                misses: 1,
                returns: 11,
            }
        );
    }

    #[test]
    fn grown_buffers_keep_their_capacity() {
        let pool = Pool::with_capacity(8);
        let mut buf = pool.get();
        buf.append_str(&"a".repeat(100));
        let grown = buf.cap();
        assert!(grown >= 100);
        buf.free();

        let buf = pool.get();
        assert_eq!(buf.len(), 0);
        assert_eq!(buf.cap(), grown);
    }

    #[test]
    fn dropped_buffers_are_not_returned() {
        let pool = Pool::new();
        drop(pool.get());
        assert_eq!(pool.idle(), 0);
        let _ = pool.get();
        assert_eq!(pool.stats().misses, 2);
    }

    #[test]
    fn concurrent_checkout_and_return() {
        let pool = Pool::new();
        std::thread::scope(|s| {
            for t in 0..8 {
                let pool = pool.clone();
                s.spawn(move || {
                    for i in 0..1000 {
                        let mut buf = pool.get();
                        assert_eq!(buf.len(), 0);
                        buf.append_int(t);
                        buf.append_byte(b'-');
                        buf.append_int(i);
                        assert_eq!(buf.as_str(), format!("{}-{}", t, i));
                        buf.free();
                    }
                });
            }
        });

        let stats = pool.stats();
        assert_eq!(stats.hits + stats.misses, 8000);
        assert_eq!(stats.returns, 8000);
        assert!(pool.idle() <= 8);
    }
}
