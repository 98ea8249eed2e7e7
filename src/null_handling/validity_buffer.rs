//! A validity bitmap that is allocated on its first write.
//!
//! Column builders that append rows one at a time often do not know whether a
//! column has any nulls until they see one. `ValidityBuffer` defers the allocation
//! until the first bit is written, and only advances its writer index to the full
//! bitmap size once the final row (`value_count - 1`) has been written. Writes to
//! earlier rows land in the allocated bytes but leave the writer index untouched.

use arrow::buffer::{Buffer, MutableBuffer};

use crate::error::IpcError;
use crate::memory::BufferAllocator;
use crate::null_handling::bitmap;

#[derive(Debug, Default)]
pub enum ValidityBuffer {
    #[default]
    Unallocated,
    Allocated {
        data: MutableBuffer,
        /// Logical number of bytes written so far.
        writer_index: usize,
    },
}

impl ValidityBuffer {
    pub fn new() -> Self {
        Self::Unallocated
    }

    /// Sets the bit for row `index` of a column with `value_count` rows, allocating
    /// `validity_buffer_size(value_count)` zeroed bytes first if needed.
    pub fn set_validity_bit(
        &mut self,
        allocator: &dyn BufferAllocator,
        value_count: usize,
        index: usize,
        value: bool,
    ) -> Result<(), IpcError> {
        let size = bitmap::validity_buffer_size(value_count);
        if let Self::Unallocated = self {
            *self = Self::Allocated {
                data: allocator.allocate(size)?,
                writer_index: 0,
            };
        }

        if let Self::Allocated { data, writer_index } = self {
            bitmap::set_validity_bit(data.as_slice_mut(), index, value);
            if index + 1 == value_count {
                *writer_index = size;
            }
        }
        Ok(())
    }

    pub fn is_allocated(&self) -> bool {
        matches!(self, Self::Allocated { .. })
    }

    pub fn writer_index(&self) -> usize {
        match self {
            Self::Unallocated => 0,
            Self::Allocated { writer_index, .. } => *writer_index,
        }
    }

    /// The full allocated bytes, including any not yet covered by the writer index.
    pub fn as_slice(&self) -> &[u8] {
        match self {
            Self::Unallocated => &[],
            Self::Allocated { data, .. } => data.as_slice(),
        }
    }

    /// Freezes the written bytes into a shareable `Buffer`.
    ///
    /// Only the first `writer_index` bytes are kept, mirroring what a reader of the
    /// buffer would consider readable.
    pub fn finish(self) -> Buffer {
        match self {
            Self::Unallocated => Buffer::from_vec(Vec::<u8>::new()),
            Self::Allocated {
                mut data,
                writer_index,
            } => {
                data.truncate(writer_index);
                data.into()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::HeapAllocator;

    #[test]
    fn test_first_write_allocates() {
        let mut validity = ValidityBuffer::new();
        assert!(!validity.is_allocated());

        validity
            .set_validity_bit(&HeapAllocator::new(), 10, 3, true)
            .unwrap();

        assert!(validity.is_allocated());
        assert_eq!(validity.as_slice(), &[0b0000_1000, 0]);
    }

    #[test]
    fn test_writer_index_advances_only_on_last_index() {
        let alloc = HeapAllocator::new();
        let mut validity = ValidityBuffer::new();

        for i in 0..9 {
            validity.set_validity_bit(&alloc, 10, i, i % 2 == 0).unwrap();
            assert_eq!(validity.writer_index(), 0, "index {} moved the cursor", i);
        }
        validity.set_validity_bit(&alloc, 10, 9, true).unwrap();
        assert_eq!(validity.writer_index(), 2);

        let buffer = validity.finish();
        assert_eq!(buffer.as_slice(), &[0b0101_0101, 0b0000_0011]);
    }

    #[test]
    fn test_out_of_order_last_write_sets_full_size() {
        let alloc = HeapAllocator::new();
        let mut validity = ValidityBuffer::new();

        validity.set_validity_bit(&alloc, 16, 15, true).unwrap();
        assert_eq!(validity.writer_index(), 2);
        validity.set_validity_bit(&alloc, 16, 0, true).unwrap();
        assert_eq!(validity.writer_index(), 2);
        assert_eq!(validity.finish().as_slice(), &[0x01, 0x80]);
    }

    #[test]
    fn test_unfinished_buffer_freezes_empty() {
        let mut validity = ValidityBuffer::new();
        validity
            .set_validity_bit(&HeapAllocator::new(), 8, 0, true)
            .unwrap();
        assert_eq!(validity.finish().len(), 0);
        assert_eq!(ValidityBuffer::Unallocated.finish().len(), 0);
    }

    #[test]
    fn test_allocation_failure_propagates() {
        let mut validity = ValidityBuffer::new();
        let result = validity.set_validity_bit(&HeapAllocator::with_limit(1), 64, 0, true);
        assert!(matches!(result, Err(IpcError::AllocationFailed(_))));
        assert!(!validity.is_allocated());
    }
}
