//! Bounded free-list for reusable byte buffers.
//!
//! Backs the scratch buffer the tuple-FIFO's spill path stages a
//! page's bytes into before writing them to disk, so that hot path
//! doesn't pay a heap allocation per spilled page. Lock-free:
//! `crossbeam::queue::ArrayQueue` lets `acquire`/`release` run without
//! ever taking the FIFO's own mutex.

use std::sync::Arc;

use crossbeam::queue::ArrayQueue;

pub struct BufferPool {
    buffer_size: usize,
    free: ArrayQueue<Vec<u8>>,
}

impl BufferPool {
    pub fn new(buffer_size: usize, capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            buffer_size,
            free: ArrayQueue::new(capacity.max(1)),
        })
    }

    /// Take a zeroed buffer of `buffer_size` bytes, reusing a
    /// previously released one when one is available.
    pub fn acquire(&self) -> Vec<u8> {
        match self.free.pop() {
            Some(mut buf) => {
                buf.iter_mut().for_each(|b| *b = 0);
                buf
            }
            None => vec![0u8; self.buffer_size],
        }
    }

    /// Return a buffer for reuse. Dropped instead of pooled if the
    /// free list is full or the buffer doesn't match this pool's size.
    pub fn release(&self, buf: Vec<u8>) {
        if buf.len() == self.buffer_size {
            let _ = self.free.push(buf);
        }
    }
}
