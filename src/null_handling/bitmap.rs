// --- IN: src/null_handling/bitmap.rs ---

//! This module contains pure, stateless kernels for reading and writing validity
//! bitmaps.
//!
//! A validity bitmap stores one "is-valid" flag per row: row `i` lives in byte
//! `i >> 3` at bit `i & 7`, least-significant bit first. A set bit means the row is
//! valid, a cleared bit means it is null. Bits past the last row in the final byte
//! are padding and carry no meaning.
//!
//! None of these kernels validate indices against a value count. An index past the
//! end of the byte slice panics as an ordinary slice out-of-bounds access.

use arrow::buffer::Buffer;

use crate::error::IpcError;
use crate::memory::BufferAllocator;
use crate::types::ArrowFieldNode;

//==================================================================================
// 1. Index Arithmetic
//==================================================================================

/// Index of the byte holding the given bit.
#[inline]
pub fn byte_index(absolute_bit_index: usize) -> usize {
    absolute_bit_index >> 3
}

/// Position of the given bit within its byte.
#[inline]
pub fn bit_index(absolute_bit_index: usize) -> usize {
    absolute_bit_index & 7
}

/// Number of bytes needed to hold `value_count` validity bits.
#[inline]
pub fn validity_buffer_size(value_count: usize) -> usize {
    (value_count + 7) / 8
}

//==================================================================================
// 2. Single-Bit Access
//==================================================================================

/// Returns 1 if the bit at `index` is set, 0 otherwise.
#[inline]
pub fn get(buffer: &[u8], index: usize) -> u8 {
    (buffer[byte_index(index)] >> bit_index(index)) & 1
}

/// Sets the bit at `index` to 1. A no-op if it is already set.
#[inline]
pub fn set_validity_bit_to_one(buffer: &mut [u8], index: usize) {
    let bit_mask = 1u8 << bit_index(index);
    buffer[byte_index(index)] |= bit_mask;
}

/// Sets the bit at `index` to `value`.
///
/// A clear subtracts the masked current bit from the byte instead of AND-ing with
/// the inverted mask. Both produce the same byte.
#[inline]
pub fn set_validity_bit(buffer: &mut [u8], index: usize, value: bool) {
    let byte_index = byte_index(index);
    let bit_mask = 1u8 << bit_index(index);
    let current = buffer[byte_index];
    buffer[byte_index] = if value {
        current | bit_mask
    } else {
        current - (bit_mask & current)
    };
}

/// ORs `bit_mask` into the byte at `byte_index`.
#[inline]
pub fn set_bit_masked_byte(buffer: &mut [u8], byte_index: usize, bit_mask: u8) {
    buffer[byte_index] |= bit_mask;
}

//==================================================================================
// 3. Aggregates
//==================================================================================

/// Counts the null rows among the first `value_count` bits of `buffer`.
///
/// Exactly `validity_buffer_size(value_count)` bytes are inspected. Padding bits in
/// the final partial byte are masked off, so whatever a writer left there is never
/// counted as null or valid.
pub fn null_count(buffer: &[u8], value_count: usize) -> usize {
    if value_count == 0 {
        return 0;
    }
    let size_in_bytes = validity_buffer_size(value_count);
    let full_bytes = value_count / 8;

    let mut valid = buffer[..full_bytes]
        .iter()
        .map(|b| b.count_ones() as usize)
        .sum::<usize>();

    let remainder = value_count % 8;
    if remainder != 0 {
        let tail_mask = 0xFFu8 >> (8 - remainder);
        valid += (buffer[size_in_bytes - 1] & tail_mask).count_ones() as usize;
    }

    value_count - valid
}

//==================================================================================
// 4. Re-alignment Helpers
//==================================================================================

/// The bits of byte `index` from position `offset` upward, shifted down to bit 0.
///
/// Together with [`bits_from_next_byte`] this rebuilds one target byte of a bitmap
/// that starts `offset` bits into the source byte.
#[inline]
pub fn bits_from_current_byte(data: &[u8], index: usize, offset: usize) -> u8 {
    data[index] >> offset
}

/// The low `offset` bits of byte `index`, shifted up into the high end of a byte.
#[inline]
pub fn bits_from_next_byte(data: &[u8], index: usize, offset: usize) -> u8 {
    // A shift by 8 (offset 0) must yield 0, so widen before shifting.
    ((u16::from(data[index]) << (8 - offset)) & 0xFF) as u8
}

/// Produces a self-contained bitmap for rows `start..start + length` of a source
/// bitmap holding `value_count` rows.
///
/// Byte-aligned starts share the source memory. Otherwise a new buffer is allocated
/// and each target byte is stitched together from two neighbouring source bytes.
pub fn slice_validity_buffer(
    source: &Buffer,
    value_count: usize,
    start: usize,
    length: usize,
    allocator: &dyn BufferAllocator,
) -> Result<Buffer, IpcError> {
    if length == 0 {
        return Ok(Buffer::from_vec(Vec::<u8>::new()));
    }

    let first_byte_source = byte_index(start);
    let last_byte_source = byte_index(value_count.saturating_sub(1));
    let byte_size_target = validity_buffer_size(length);
    let offset = bit_index(start);

    if offset == 0 {
        let shared = source.slice_with_length(first_byte_source, byte_size_target);
        return Ok(allocator.transfer(&shared));
    }

    let mut target = allocator.allocate(byte_size_target)?;
    let data = source.as_slice();
    let out = target.as_slice_mut();

    for i in 0..byte_size_target - 1 {
        let b1 = bits_from_current_byte(data, first_byte_source + i, offset);
        let b2 = bits_from_next_byte(data, first_byte_source + i + 1, offset);
        out[i] = b1 | b2;
    }

    // The final target byte only borrows from the next source byte if that byte
    // still holds rows of the source.
    let last = first_byte_source + byte_size_target - 1;
    out[byte_size_target - 1] = if last < last_byte_source {
        bits_from_current_byte(data, last, offset) | bits_from_next_byte(data, last + 1, offset)
    } else {
        bits_from_current_byte(data, last, offset)
    };

    Ok(target.into())
}

//==================================================================================
// 5. Validity Buffer Reconstruction
//==================================================================================

/// Builds the validity buffer for a column loaded from a message body.
///
/// The all-valid and all-null cases are synthesized from the field node alone, so
/// the source bytes are never consulted (writers may even omit them). A mixed
/// column shares `source_validity_buffer` with the target allocator without copying.
pub fn load_validity_buffer(
    field_node: &ArrowFieldNode,
    source_validity_buffer: &Buffer,
    allocator: &dyn BufferAllocator,
) -> Result<Buffer, IpcError> {
    let value_count = usize::try_from(field_node.length()).map_err(|_| {
        IpcError::UnsupportedSize(format!("negative field length {}", field_node.length()))
    })?;
    let null_count = field_node.null_count();

    if null_count != 0 && null_count != field_node.length() {
        return Ok(allocator.transfer(source_validity_buffer));
    }

    let mut new_buffer = allocator.allocate(validity_buffer_size(value_count))?;
    if null_count != 0 {
        /* all NULLs */
        return Ok(new_buffer.into());
    }

    /* all non-NULLs */
    let bytes = new_buffer.as_slice_mut();
    let full_bytes_count = value_count / 8;
    bytes[..full_bytes_count].fill(0xFF);

    let remainder = value_count % 8;
    if remainder > 0 {
        bytes[full_bytes_count] = 0xFFu8 >> ((8 - remainder) & 7);
    }

    Ok(new_buffer.into())
}
