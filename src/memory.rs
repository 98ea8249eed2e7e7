// In: src/memory.rs

//! The allocation contract consumed by the bitmap engine and the batch codec.
//!
//! Every buffer the library hands out is an Arrow `Buffer`: an atomically
//! reference-counted, immutable view that can be sliced without copying. Fresh
//! memory is obtained as a zeroed `MutableBuffer` from a `BufferAllocator` and frozen
//! into a `Buffer` once it has been filled.

use arrow::buffer::{Buffer, MutableBuffer};

use crate::config::IpcConfig;
use crate::error::IpcError;

/// **CONTRACT:** "allocate N bytes, get a reference-counted handle".
pub trait BufferAllocator {
    /// Returns a zero-filled buffer whose `len()` is exactly `size`.
    fn allocate(&self, size: usize) -> Result<MutableBuffer, IpcError>;

    /// Hands an existing buffer to this allocator's context without copying its
    /// bytes. The returned handle keeps the memory alive independently of `buffer`.
    fn transfer(&self, buffer: &Buffer) -> Buffer {
        buffer.clone()
    }
}

/// Allocates straight from the global heap, optionally refusing oversized requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeapAllocator {
    limit: Option<usize>,
}

impl HeapAllocator {
    pub fn new() -> Self {
        Self { limit: None }
    }

    /// An allocator that rejects any single request above `limit` bytes.
    pub fn with_limit(limit: usize) -> Self {
        Self { limit: Some(limit) }
    }

    pub fn from_config(config: &IpcConfig) -> Self {
        Self {
            limit: config.allocation_limit,
        }
    }
}

impl BufferAllocator for HeapAllocator {
    fn allocate(&self, size: usize) -> Result<MutableBuffer, IpcError> {
        if let Some(limit) = self.limit {
            if size > limit {
                return Err(IpcError::AllocationFailed(format!(
                    "requested {} bytes, allocator limit is {}",
                    size, limit
                )));
            }
        }
        Ok(MutableBuffer::from_len_zeroed(size))
    }
}
