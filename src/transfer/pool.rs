//! Reusable part buffers with a hard cap on how many are checked out.

use bytes::BytesMut;
use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{S3Error, TransferError};

/// A fixed number of part buffers.
///
/// `acquire` waits while every buffer is checked out, which bounds the
/// memory held by parts in flight.
pub struct BufferPool {
    buffers: Mutex<Vec<BytesMut>>,
    permits: Arc<Semaphore>,
    capacity: usize,
    buffer_capacity: usize,
}

impl BufferPool {
    /// Create a pool of `capacity` buffers of `buffer_capacity` bytes.
    ///
    /// Buffers are allocated on first use. Every checked-out buffer holds at
    /// least `buffer_capacity` bytes of space.
    pub fn new(capacity: usize, buffer_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            buffers: Mutex::new(Vec::with_capacity(capacity)),
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            buffer_capacity,
        })
    }

    /// Check out a buffer, waiting for one to be returned if necessary.
    pub async fn acquire(self: &Arc<Self>) -> Result<PooledBuffer, S3Error> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| S3Error::Transfer(TransferError::QueueClosed))?;

        let mut buffer = self.buffers.lock().pop().unwrap_or_default();
        // Reclaims the old allocation once the previous part's bytes are gone.
        buffer.reserve(self.buffer_capacity);
        Ok(PooledBuffer {
            buffer,
            pool: Arc::clone(self),
            _permit: permit,
        })
    }

    /// Buffers that can be checked out without waiting.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Total number of buffers.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn release(&self, mut buffer: BytesMut) {
        buffer.clear();
        // Drop buffers that grew past a part, e.g. after a larger upload.
        if buffer.capacity() <= self.buffer_capacity.saturating_mul(2) {
            self.buffers.lock().push(buffer);
        }
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("capacity", &self.capacity)
            .field("available", &self.available())
            .field("buffer_capacity", &self.buffer_capacity)
            .finish()
    }
}

/// A checked-out buffer, returned to its pool on drop.
pub struct PooledBuffer {
    buffer: BytesMut,
    pool: Arc<BufferPool>,
    _permit: OwnedSemaphorePermit,
}

impl Deref for PooledBuffer {
    type Target = BytesMut;

    fn deref(&self) -> &BytesMut {
        &self.buffer
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.buffer));
    }
}

impl std::fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.len())
            .finish()
    }
}
