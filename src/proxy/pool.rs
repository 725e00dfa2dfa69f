//! Reusable copy buffers.
//!
//! The pool is a cache, not an allocator: it has no upper bound, may be
//! emptied at any time by [`BufferPool::trim`], and `get` always succeeds by
//! allocating when nothing idle is available.

use crossbeam::queue::SegQueue;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Buffer size used for each copy when pooling is disabled.
pub const UNPOOLED_BUFFER_SIZE: usize = 32 * 1024;

#[derive(Debug)]
pub struct BufferPool {
    size: usize,
    idle: SegQueue<Vec<u8>>,
    allocated: AtomicU64,
}

impl BufferPool {
    /// A pool of `size`-byte buffers. A size of 0 disables pooling.
    pub fn new(size: usize) -> Self {
        Self {
            size,
            idle: SegQueue::new(),
            allocated: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.size > 0
    }

    /// Configured buffer size (0 when disabled).
    pub fn buffer_size(&self) -> usize {
        self.size
    }

    /// Takes an idle buffer or allocates a fresh one. The buffer goes back to
    /// the pool when the returned guard is dropped.
    pub fn get(self: &Arc<Self>) -> PooledBuf {
        if !self.is_enabled() {
            return PooledBuf {
                buf: vec![0; UNPOOLED_BUFFER_SIZE],
                pool: None,
            };
        }

        let buf = self.idle.pop().unwrap_or_else(|| {
            let count = self.allocated.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::debug!(
                count,
                total_bytes = count * self.size as u64,
                "Allocating pool buffer"
            );
            vec![0; self.size]
        });

        PooledBuf {
            buf,
            pool: Some(Arc::clone(self)),
        }
    }

    /// Returns a buffer for reuse. Buffers of any other length are dropped,
    /// so `get` never hands out a short one.
    pub fn put(&self, buf: Vec<u8>) {
        if self.is_enabled() && buf.len() == self.size {
            self.idle.push(buf);
        }
    }

    /// Number of buffers waiting for reuse.
    pub fn idle(&self) -> usize {
        self.idle.len()
    }

    /// Number of buffers allocated over the pool's lifetime.
    pub fn allocated(&self) -> u64 {
        self.allocated.load(Ordering::Relaxed)
    }

    /// Drops every idle buffer. Returns how many were released.
    pub fn trim(&self) -> usize {
        let mut dropped = 0;
        while self.idle.pop().is_some() {
            dropped += 1;
        }
        dropped
    }

    /// Trims the pool every `every` until the pool itself is dropped.
    pub fn spawn_idle_trim(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let pool = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(pool) = pool.upgrade() else {
                    break;
                };
                let dropped = pool.trim();
                if dropped > 0 {
                    tracing::debug!(dropped, "Trimmed idle pool buffers");
                }
            }
        })
    }
}

/// A buffer on loan from a [`BufferPool`].
#[derive(Debug)]
pub struct PooledBuf {
    buf: Vec<u8>,
    pool: Option<Arc<BufferPool>>,
}

impl Deref for PooledBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

impl DerefMut for PooledBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.put(std::mem::take(&mut self.buf));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropped_buffer_is_reused() {
        let pool = Arc::new(BufferPool::new(1024));

        let first = pool.get();
        let addr = first.as_ptr();
        drop(first);

        assert_eq!(pool.idle(), 1);
        let second = pool.get();
        assert_eq!(second.as_ptr(), addr);
        assert_eq!(pool.allocated(), 1);
    }

    #[test]
    fn disabled_pool_hands_out_ad_hoc_buffers() {
        let pool = Arc::new(BufferPool::new(0));

        let buf = pool.get();
        assert_eq!(buf.len(), UNPOOLED_BUFFER_SIZE);
        drop(buf);

        assert_eq!(pool.idle(), 0);
        assert_eq!(pool.allocated(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_trim_empties_the_pool() {
        let pool = Arc::new(BufferPool::new(64));
        drop((pool.get(), pool.get()));
        assert_eq!(pool.idle(), 2);

        let task = pool.spawn_idle_trim(Duration::from_secs(30));
        tokio::time::sleep(Duration::from_secs(31)).await;

        assert_eq!(pool.idle(), 0);
        task.abort();
    }
}
