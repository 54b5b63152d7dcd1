//! Pool of fixed-size read buffers.
//!
//! Each connection borrows one buffer for its first read. The buffer goes
//! back to the pool when the [`PooledBuffer`] guard is dropped, which covers
//! every exit path of the handler, including cancellation.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, PoisonError};

/// Shared pool of equally sized byte buffers.
#[derive(Debug)]
pub struct BufferPool {
    buffer_size: usize,
    max_idle: usize,
    idle: Mutex<Vec<Box<[u8]>>>,
}

impl BufferPool {
    /// Create a pool handing out `buffer_size`-byte buffers and keeping at
    /// most `max_idle` of them for reuse.
    #[must_use]
    pub fn new(buffer_size: usize, max_idle: usize) -> Arc<Self> {
        Arc::new(Self {
            buffer_size,
            max_idle,
            idle: Mutex::new(Vec::new()),
        })
    }

    /// Borrow a zeroed buffer.
    #[must_use]
    pub fn acquire(self: &Arc<Self>) -> PooledBuffer {
        let reused = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        let buf = reused.unwrap_or_else(|| vec![0u8; self.buffer_size].into_boxed_slice());
        PooledBuffer {
            buf: Some(buf),
            pool: Arc::clone(self),
        }
    }

    /// Size of every buffer handed out.
    #[must_use]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Number of buffers waiting for reuse.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn release(&self, mut buf: Box<[u8]>) {
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < self.max_idle {
            buf.fill(0);
            idle.push(buf);
        }
    }
}

/// A buffer on loan from a [`BufferPool`].
#[derive(Debug)]
pub struct PooledBuffer {
    buf: Option<Box<[u8]>>,
    pool: Arc<BufferPool>,
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or_default()
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buf.as_deref_mut().unwrap_or_default()
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.release(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_is_returned_on_drop() {
        let pool = BufferPool::new(512, 4);
        {
            let buf = pool.acquire();
            assert_eq!(buf.len(), 512);
            assert_eq!(pool.idle_count(), 0);
        }
        assert_eq!(pool.idle_count(), 1);

        let _again = pool.acquire();
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn test_returned_buffer_is_zeroed() {
        let pool = BufferPool::new(8, 1);
        {
            let mut buf = pool.acquire();
            buf[0] = 0xff;
        }
        let buf = pool.acquire();
        assert!(buf.iter().all(|b| *b == 0));
    }

    #[test]
    fn test_idle_limit() {
        let pool = BufferPool::new(16, 2);
        let held: Vec<PooledBuffer> = (0..5).map(|_| pool.acquire()).collect();
        drop(held);
        assert_eq!(pool.idle_count(), 2);
    }

    #[tokio::test]
    async fn test_buffer_returned_when_task_aborted() {
        let pool = BufferPool::new(16, 4);
        let task_pool = Arc::clone(&pool);
        let (acquired_tx, acquired_rx) = tokio::sync::oneshot::channel();
        let task = tokio::spawn(async move {
            let _buf = task_pool.acquire();
            let _ = acquired_tx.send(());
            std::future::pending::<()>().await;
        });
        let _ = acquired_rx.await;
        task.abort();
        let _ = task.await;
        assert_eq!(pool.idle_count(), 1);
    }
}
