// In: src/ipc/serializer.rs

//! The batch codec: framing, padding and buffer layout for schema, record batch
//! and dictionary batch messages.
//!
//! Every message on the wire has the same shape:
//!
//! ```text
//! [i32 LE metadata length] [flatbuffer Message] [zero padding] [body]
//! ```
//!
//! The length prefix already includes the padding, so the body of a message
//! written from an 8-byte-aligned position always starts on an 8-byte boundary.
//! Within the body every buffer starts at its 8-aligned layout offset, and the
//! body itself is padded to a multiple of 8.

use std::io::{Read, Write};

use arrow::buffer::Buffer;
use arrow::datatypes::Schema;
use arrow::ipc::convert::{fb_to_schema, schema_to_fb_offset};
use arrow::ipc::{self, MessageHeader, MetadataVersion};
use flatbuffers::{FlatBufferBuilder, UnionWIPOffset, WIPOffset};

use crate::config::IpcConfig;
use crate::error::IpcError;
use crate::ipc::batch::{ArrowDictionaryBatch, ArrowMessage, ArrowRecordBatch};
use crate::ipc::channel::{ReadChannel, WriteChannel};
use crate::ipc::message_reader::{checked_body_length, MessageEnvelope, MessageReader};
use crate::ipc::{CONTINUATION_MARKER, METADATA_VERSION};
use crate::memory::BufferAllocator;
use crate::types::{ArrowBlock, ArrowFieldNode};
use crate::utils::padding_to_8;

//==================================================================================
// 1. Envelope Encoding
//==================================================================================

/// Decodes a 4-byte little-endian length prefix.
pub fn bytes_to_int(bytes: [u8; 4]) -> i32 {
    i32::from_le_bytes(bytes)
}

/// Wraps an already-built header in a `Message` table stamped with the supported
/// metadata version, and returns the finished flatbuffer bytes.
pub fn serialize_message<'a>(
    fbb: &'a mut FlatBufferBuilder<'_>,
    header_type: MessageHeader,
    header: WIPOffset<UnionWIPOffset>,
    body_length: i64,
) -> &'a [u8] {
    encode_message(fbb, header_type, header, body_length, METADATA_VERSION)
}

pub(crate) fn encode_message<'a>(
    fbb: &'a mut FlatBufferBuilder<'_>,
    header_type: MessageHeader,
    header: WIPOffset<UnionWIPOffset>,
    body_length: i64,
    version: MetadataVersion,
) -> &'a [u8] {
    let mut message = ipc::MessageBuilder::new(fbb);
    message.add_version(version);
    message.add_header_type(header_type);
    message.add_bodyLength(body_length);
    message.add_header(header);
    let root = message.finish();
    fbb.finish(root, None);
    fbb.finished_data()
}

/// Writes `[prefix][envelope][padding]` and returns the padded envelope length,
/// i.e. the value written into the prefix.
///
/// The padding is chosen so that the stream is 8-byte aligned once the envelope
/// has been written, measured from the absolute position of `out`.
fn write_framed_metadata<W: Write>(
    out: &mut WriteChannel<W>,
    message: &[u8],
) -> Result<i32, IpcError> {
    let start = out.current_position();
    let raw_length = message.len() as u64;
    let padded_length = raw_length + padding_to_8(start + raw_length + 4);
    let prefix = i32::try_from(padded_length).map_err(|_| {
        IpcError::UnsupportedSize(format!("metadata envelope of {} bytes", padded_length))
    })?;

    out.write_i32_le(prefix)?;
    out.write(message)?;
    out.align()?;

    let expected_end = start + 4 + padded_length;
    if out.current_position() != expected_end {
        return Err(IpcError::LayoutInconsistency(format!(
            "metadata ended at {}, expected {}",
            out.current_position(),
            expected_end
        )));
    }
    log::trace!(
        "framed {} byte envelope as {} (+4 prefix) at {}",
        raw_length,
        padded_length,
        start
    );
    Ok(prefix)
}

fn check_version(envelope: &MessageEnvelope) -> Result<(), IpcError> {
    if envelope.version() != METADATA_VERSION {
        log::warn!(
            "rejecting message with metadata version {:?}",
            envelope.version()
        );
        return Err(IpcError::IncompatibleVersion {
            expected: METADATA_VERSION.0,
            found: envelope.version().0,
        });
    }
    Ok(())
}

fn expect_header_type(envelope: &MessageEnvelope, expected: MessageHeader) -> Result<(), IpcError> {
    if envelope.header_type() != expected {
        return Err(IpcError::UnexpectedMessage(format!(
            "expected {:?} but header was {:?}",
            expected,
            envelope.header_type()
        )));
    }
    Ok(())
}

//==================================================================================
// 2. Schema Messages
//==================================================================================

/// Writes a schema message. Returns the number of bytes written, which is always a
/// multiple of 8.
///
/// The write must start on an 8-byte boundary.
pub fn serialize_schema<W: Write>(
    out: &mut WriteChannel<W>,
    schema: &Schema,
) -> Result<u64, IpcError> {
    let start = out.current_position();
    if start % 8 != 0 {
        return Err(IpcError::LayoutInconsistency(format!(
            "schema message must start on an 8-byte boundary, position is {}",
            start
        )));
    }

    let mut fbb = FlatBufferBuilder::new();
    let header = schema_to_fb_offset(&mut fbb, schema).as_union_value();
    let message = serialize_message(&mut fbb, MessageHeader::Schema, header, 0);
    let metadata_length = write_framed_metadata(out, message)?;

    log::debug!(
        "wrote schema with {} fields ({} bytes)",
        schema.fields().len(),
        metadata_length + 4
    );
    Ok(metadata_length as u64 + 4)
}

/// Reads one message and decodes it as a schema.
pub fn deserialize_schema<M: MessageReader + ?Sized>(reader: &mut M) -> Result<Schema, IpcError> {
    let envelope = reader
        .read_next_message()?
        .ok_or_else(|| IpcError::EndOfStream("missing schema".to_string()))?;
    expect_header_type(&envelope, MessageHeader::Schema)?;
    check_version(&envelope)?;

    let message = envelope.message()?;
    let header = message
        .header_as_schema()
        .ok_or_else(|| IpcError::MalformedMessage("schema message has no header".to_string()))?;
    Ok(fb_to_schema(header))
}

//==================================================================================
// 3. Record & Dictionary Batch Serialization
//==================================================================================

/// Writes a record batch message and returns the block locating it.
pub fn serialize_record_batch<W: Write>(
    out: &mut WriteChannel<W>,
    batch: &ArrowRecordBatch,
) -> Result<ArrowBlock, IpcError> {
    let body_length = batch.compute_body_length();
    let mut fbb = FlatBufferBuilder::new();
    let header = batch.write_to(&mut fbb).as_union_value();
    let message = serialize_message(&mut fbb, MessageHeader::RecordBatch, header, body_length);
    write_batch_message(out, message, batch, body_length)
}

/// Writes a dictionary batch message and returns the block locating it.
pub fn serialize_dictionary_batch<W: Write>(
    out: &mut WriteChannel<W>,
    batch: &ArrowDictionaryBatch,
) -> Result<ArrowBlock, IpcError> {
    let body_length = batch.compute_body_length();
    let mut fbb = FlatBufferBuilder::new();
    let header = batch.write_to(&mut fbb).as_union_value();
    let message = serialize_message(&mut fbb, MessageHeader::DictionaryBatch, header, body_length);
    write_batch_message(out, message, batch.dictionary(), body_length)
}

fn write_batch_message<W: Write>(
    out: &mut WriteChannel<W>,
    message: &[u8],
    batch: &ArrowRecordBatch,
    body_length: i64,
) -> Result<ArrowBlock, IpcError> {
    if body_length % 8 != 0 {
        return Err(IpcError::LayoutInconsistency(format!(
            "computed body length {} is not a multiple of 8",
            body_length
        )));
    }

    let start = out.current_position();
    let metadata_length = write_framed_metadata(out, message)?;
    let written = write_batch_buffers(out, batch)?;
    if written != body_length as u64 {
        return Err(IpcError::LayoutInconsistency(format!(
            "wrote {} body bytes, header declares {}",
            written, body_length
        )));
    }

    log::debug!(
        "wrote batch of {} rows at {} (metadata {} bytes, body {} bytes)",
        batch.length(),
        start,
        metadata_length + 4,
        body_length
    );
    Ok(ArrowBlock::new(start as i64, metadata_length + 4, body_length))
}

/// Writes the buffers of `batch` at their layout offsets, relative to the current
/// position. Returns the number of body bytes written, a multiple of 8.
///
/// A buffer that does not end exactly where its layout entry says it should is a
/// fatal `LayoutInconsistency`.
pub fn write_batch_buffers<W: Write>(
    out: &mut WriteChannel<W>,
    batch: &ArrowRecordBatch,
) -> Result<u64, IpcError> {
    let body_start = out.current_position();
    for (i, (buffer, layout)) in batch
        .buffers()
        .iter()
        .zip(batch.buffers_layout())
        .enumerate()
    {
        let expected_start = body_start + layout.offset() as u64;
        let position = out.current_position();
        if position < expected_start {
            out.write_zeros((expected_start - position) as usize)?;
        }
        out.write_buffer(buffer)?;

        let expected_end = expected_start + layout.size() as u64;
        if out.current_position() != expected_end {
            log::error!("buffer {} ended at {}, layout says {}", i, out.current_position(), expected_end);
            return Err(IpcError::LayoutInconsistency(format!(
                "buffer {} ended at {}, expected {} (offset {}, size {})",
                i,
                out.current_position() - body_start,
                expected_end - body_start,
                layout.offset(),
                layout.size()
            )));
        }
        log::trace!("buffer {}: {} bytes at body offset {}", i, buffer.len(), layout.offset());
    }
    out.align()?;
    Ok(out.current_position() - body_start)
}

//==================================================================================
// 4. Record & Dictionary Batch Deserialization
//==================================================================================

/// Reads the body for an envelope already taken from `reader` and decodes it as a
/// record batch.
pub fn deserialize_record_batch<M: MessageReader + ?Sized>(
    reader: &mut M,
    envelope: &MessageEnvelope,
    allocator: &dyn BufferAllocator,
) -> Result<ArrowRecordBatch, IpcError> {
    expect_header_type(envelope, MessageHeader::RecordBatch)?;
    let body = reader.read_message_body(envelope, allocator)?;
    let message = envelope.message()?;
    let header = message
        .header_as_record_batch()
        .ok_or_else(|| IpcError::MalformedMessage("record batch message has no header".to_string()))?;
    decode_record_batch(header, body)
}

/// Reads the body for an envelope already taken from `reader` and decodes it as a
/// dictionary batch.
pub fn deserialize_dictionary_batch<M: MessageReader + ?Sized>(
    reader: &mut M,
    envelope: &MessageEnvelope,
    allocator: &dyn BufferAllocator,
) -> Result<ArrowDictionaryBatch, IpcError> {
    expect_header_type(envelope, MessageHeader::DictionaryBatch)?;
    let body = reader.read_message_body(envelope, allocator)?;
    let message = envelope.message()?;
    let header = message.header_as_dictionary_batch().ok_or_else(|| {
        IpcError::MalformedMessage("dictionary batch message has no header".to_string())
    })?;
    decode_dictionary_batch(header, body)
}

/// Reads a record batch located by `block`, starting at the current position of
/// `input`, with a single read of `metadata_length + body_length` bytes.
pub fn deserialize_record_batch_from_block<R: Read>(
    input: &mut ReadChannel<R>,
    block: &ArrowBlock,
    allocator: &dyn BufferAllocator,
    config: &IpcConfig,
) -> Result<ArrowRecordBatch, IpcError> {
    let (envelope, body) = read_block(input, block, allocator, config)?;
    expect_header_type(&envelope, MessageHeader::RecordBatch)?;
    check_version(&envelope)?;
    let message = envelope.message()?;
    let header = message
        .header_as_record_batch()
        .ok_or_else(|| IpcError::MalformedMessage("record batch message has no header".to_string()))?;
    decode_record_batch(header, body)
}

/// Block-indexed counterpart of [`deserialize_dictionary_batch`].
pub fn deserialize_dictionary_batch_from_block<R: Read>(
    input: &mut ReadChannel<R>,
    block: &ArrowBlock,
    allocator: &dyn BufferAllocator,
    config: &IpcConfig,
) -> Result<ArrowDictionaryBatch, IpcError> {
    let (envelope, body) = read_block(input, block, allocator, config)?;
    expect_header_type(&envelope, MessageHeader::DictionaryBatch)?;
    check_version(&envelope)?;
    let message = envelope.message()?;
    let header = message.header_as_dictionary_batch().ok_or_else(|| {
        IpcError::MalformedMessage("dictionary batch message has no header".to_string())
    })?;
    decode_dictionary_batch(header, body)
}

/// Reads a whole block in one shot and splits it into its envelope and body.
fn read_block<R: Read>(
    input: &mut ReadChannel<R>,
    block: &ArrowBlock,
    allocator: &dyn BufferAllocator,
    config: &IpcConfig,
) -> Result<(MessageEnvelope, Buffer), IpcError> {
    // The metadata length covers the prefix and the padding after the envelope.
    let metadata_length = usize::try_from(block.metadata_length())
        .ok()
        .filter(|&len| len >= 4)
        .ok_or_else(|| {
            IpcError::MalformedMessage(format!(
                "block metadata length {} cannot hold a prefix",
                block.metadata_length()
            ))
        })?;
    let body_length = checked_body_length(block.body_length(), config)?;
    let total = metadata_length + body_length;
    if total as u64 > config.max_body_bytes {
        return Err(IpcError::UnsupportedSize(format!(
            "cannot deserialize blocks over {} bytes, got {}",
            config.max_body_bytes, total
        )));
    }

    let buffer = input.read_buffer(total, allocator)?;

    let mut prefix_length = 4;
    if metadata_length >= 8 && buffer.as_slice()[..4] == CONTINUATION_MARKER.to_le_bytes() {
        prefix_length = 8;
    }
    let metadata = buffer.slice_with_length(prefix_length, metadata_length - prefix_length);
    let envelope = MessageEnvelope::try_new(metadata)?;
    if envelope.body_length() != block.body_length() {
        return Err(IpcError::MalformedMessage(format!(
            "block declares a {} byte body, message declares {}",
            block.body_length(),
            envelope.body_length()
        )));
    }
    let body = buffer.slice_with_length(metadata_length, body_length);

    log::debug!(
        "read {:?} block at {} ({} + {} bytes)",
        envelope.header_type(),
        block.offset(),
        metadata_length,
        body_length
    );
    Ok((envelope, body))
}

//==================================================================================
// 5. Body Decoding
//==================================================================================

fn checked_i32(value: i64, what: &str) -> Result<i32, IpcError> {
    if value < 0 {
        return Err(IpcError::MalformedMessage(format!("negative {} {}", what, value)));
    }
    i32::try_from(value).map_err(|_| {
        IpcError::UnsupportedSize(format!(
            "cannot currently deserialize record batches with {} {}",
            what, value
        ))
    })
}

/// Turns a decoded `RecordBatch` header and its body into an `ArrowRecordBatch`.
///
/// Every buffer is a zero-copy slice of `body`. The body handle itself is released
/// before returning, so the slices are the only owners of the memory.
pub fn decode_record_batch(
    header: ipc::RecordBatch<'_>,
    body: Buffer,
) -> Result<ArrowRecordBatch, IpcError> {
    let length = checked_i32(header.length(), "row count")?;

    let mut nodes = Vec::new();
    if let Some(fb_nodes) = header.nodes() {
        nodes.reserve(fb_nodes.len());
        for node in fb_nodes.iter() {
            let node_length = checked_i32(node.length(), "field length")?;
            let null_count = checked_i32(node.null_count(), "null count")?;
            if null_count > node_length {
                return Err(IpcError::MalformedMessage(format!(
                    "null count {} exceeds field length {}",
                    null_count, node_length
                )));
            }
            nodes.push(ArrowFieldNode::new(node_length, null_count));
        }
    }

    let mut buffers = Vec::new();
    if let Some(fb_buffers) = header.buffers() {
        buffers.reserve(fb_buffers.len());
        for descriptor in fb_buffers.iter() {
            let (offset, size) = (descriptor.offset(), descriptor.length());
            let end = offset.checked_add(size);
            let in_range = offset >= 0 && size >= 0 && end.is_some_and(|e| e as u64 <= body.len() as u64);
            if !in_range {
                return Err(IpcError::MalformedMessage(format!(
                    "buffer (offset {}, size {}) lies outside the {} byte body",
                    offset,
                    size,
                    body.len()
                )));
            }
            buffers.push(body.slice_with_length(offset as usize, size as usize));
        }
    }
    drop(body);

    log::trace!("decoded batch: {} rows, {} nodes, {} buffers", length, nodes.len(), buffers.len());
    Ok(ArrowRecordBatch::new(length, nodes, buffers))
}

fn decode_dictionary_batch(
    header: ipc::DictionaryBatch<'_>,
    body: Buffer,
) -> Result<ArrowDictionaryBatch, IpcError> {
    let data = header.data().ok_or_else(|| {
        IpcError::MalformedMessage("dictionary batch carries no record batch".to_string())
    })?;
    let dictionary = decode_record_batch(data, body)?;
    Ok(if header.isDelta() {
        ArrowDictionaryBatch::new_delta(header.id(), dictionary)
    } else {
        ArrowDictionaryBatch::new(header.id(), dictionary)
    })
}

//==================================================================================
// 6. Generic Message Dispatch
//==================================================================================

/// Reads the next record batch or dictionary batch from `reader`.
///
/// Returns `Ok(None)` at a clean end of stream. Any header type other than the
/// two batch kinds is an `UnrecognizedMessageKind`.
pub fn deserialize_message_batch<M: MessageReader + ?Sized>(
    reader: &mut M,
    allocator: &dyn BufferAllocator,
) -> Result<Option<ArrowMessage>, IpcError> {
    let Some(envelope) = reader.read_next_message()? else {
        return Ok(None);
    };
    check_version(&envelope)?;

    match envelope.header_type() {
        MessageHeader::RecordBatch => {
            deserialize_record_batch(reader, &envelope, allocator).map(|b| Some(ArrowMessage::RecordBatch(b)))
        }
        MessageHeader::DictionaryBatch => deserialize_dictionary_batch(reader, &envelope, allocator)
            .map(|b| Some(ArrowMessage::DictionaryBatch(b))),
        other => {
            log::warn!("unexpected message header type {:?}", other);
            Err(IpcError::UnrecognizedMessageKind(format!("{:?}", other)))
        }
    }
}
