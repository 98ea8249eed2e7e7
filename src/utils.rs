//! This module provides a set of shared, low-level utility functions used
//! throughout the tambak IPC layer.

use arrow::buffer::Buffer;

//==================================================================================
// 1. Core Utility Functions
//==================================================================================

/// Converts a slice of primitive values into a `Vec<u8>`.
///
/// This function performs a memory copy to create a new, owned byte vector. The
/// bytes are in native order, which is little-endian on every supported target.
pub fn typed_slice_to_bytes<T: bytemuck::Pod>(data: &[T]) -> Vec<u8> {
    bytemuck::cast_slice(data).to_vec()
}

/// Copies a slice of primitive values into a fresh reference-counted `Buffer`,
/// ready to be attached to a record batch.
pub fn typed_slice_to_buffer<T: bytemuck::Pod>(data: &[T]) -> Buffer {
    Buffer::from_vec(typed_slice_to_bytes(data))
}

/// Number of zero bytes needed to bring `len` up to the next multiple of 8.
pub fn padding_to_8(len: u64) -> u64 {
    (8 - (len % 8)) % 8
}
