//! Tests for the shared buffer pool

use fanout::proxy::pool::{BufferPool, UNPOOLED_BUFFER_SIZE};
use std::sync::Arc;

#[test]
fn test_get_never_returns_short_buffer() {
    let pool = Arc::new(BufferPool::new(4096));

    // a foreign buffer of the wrong size must not enter the pool
    pool.put(vec![0; 10]);
    pool.put(Vec::new());
    assert_eq!(pool.idle(), 0);

    for _ in 0..3 {
        let buf = pool.get();
        assert_eq!(buf.len(), 4096);
    }
}

#[test]
fn test_buffers_are_reused_after_drop() {
    let pool = Arc::new(BufferPool::new(1024));

    let held: Vec<_> = (0..4).map(|_| pool.get()).collect();
    assert_eq!(pool.allocated(), 4);
    drop(held);
    assert_eq!(pool.idle(), 4);

    let again: Vec<_> = (0..4).map(|_| pool.get()).collect();
    assert_eq!(pool.allocated(), 4);
    assert_eq!(pool.idle(), 0);
    drop(again);
}

#[test]
fn test_pool_grows_without_bound() {
    let pool = Arc::new(BufferPool::new(64));

    let held: Vec<_> = (0..500).map(|_| pool.get()).collect();
    assert_eq!(held.len(), 500);
    assert_eq!(pool.allocated(), 500);
}

#[test]
fn test_trim_releases_idle_buffers_only() {
    let pool = Arc::new(BufferPool::new(256));

    let in_use = pool.get();
    drop((pool.get(), pool.get(), pool.get()));
    assert_eq!(pool.trim(), 3);
    assert_eq!(pool.idle(), 0);

    drop(in_use);
    assert_eq!(pool.idle(), 1);
}

#[test]
fn test_disabled_pool() {
    let pool = Arc::new(BufferPool::new(0));
    assert!(!pool.is_enabled());
    assert_eq!(pool.buffer_size(), 0);

    let buf = pool.get();
    assert_eq!(buf.len(), UNPOOLED_BUFFER_SIZE);
    drop(buf);
    assert_eq!(pool.idle(), 0);
}

#[test]
fn test_concurrent_get_and_put() {
    let pool = Arc::new(BufferPool::new(512));

    let threads: Vec<_> = (0..8)
        .map(|seed| {
            let pool = Arc::clone(&pool);
            std::thread::spawn(move || {
                for round in 0..200 {
                    let mut buf = pool.get();
                    assert_eq!(buf.len(), 512);
                    buf[0] = (seed + round) as u8;
                }
            })
        })
        .collect();
    for thread in threads {
        thread.join().unwrap();
    }

    assert!(pool.allocated() <= 8);
    assert_eq!(pool.idle() as u64, pool.allocated());
}
