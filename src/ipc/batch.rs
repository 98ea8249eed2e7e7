// In: src/ipc/batch.rs

//! In-memory forms of the two body-carrying messages.
//!
//! An `ArrowRecordBatch` is a row count, one field node per logical column, and
//! the flat list of buffers those columns own, in depth-first schema order. The
//! body layout (where each buffer sits relative to the start of the body) is
//! computed once at construction and is what both the flatbuffer header and the
//! buffer writer agree on.

use arrow::buffer::Buffer;
use arrow::ipc::{self, MessageHeader};
use flatbuffers::{FlatBufferBuilder, WIPOffset};

use crate::error::IpcError;
use crate::types::{ArrowFieldNode, BufferDescriptor};
use crate::utils::padding_to_8;

//==================================================================================
// 1. Record Batch
//==================================================================================

#[derive(Debug, Clone)]
pub struct ArrowRecordBatch {
    length: i32,
    nodes: Vec<ArrowFieldNode>,
    buffers: Vec<Buffer>,
    buffers_layout: Vec<BufferDescriptor>,
}

impl ArrowRecordBatch {
    /// Builds a batch and lays its buffers out back to back, each one starting on
    /// an 8-byte boundary relative to the body start.
    pub fn new(length: i32, nodes: Vec<ArrowFieldNode>, buffers: Vec<Buffer>) -> Self {
        let mut buffers_layout = Vec::with_capacity(buffers.len());
        let mut offset = 0u64;
        for buffer in &buffers {
            let size = buffer.len() as u64;
            buffers_layout.push(BufferDescriptor::new(offset as i64, size as i64));
            offset += size;
            offset += padding_to_8(offset);
        }
        Self {
            length,
            nodes,
            buffers,
            buffers_layout,
        }
    }

    /// Builds a batch with a caller-supplied body layout.
    ///
    /// The layout is trusted as-is; a layout that does not match the buffers is
    /// only detected when the batch is written.
    pub fn try_with_layout(
        length: i32,
        nodes: Vec<ArrowFieldNode>,
        buffers: Vec<Buffer>,
        buffers_layout: Vec<BufferDescriptor>,
    ) -> Result<Self, IpcError> {
        if buffers.len() != buffers_layout.len() {
            return Err(IpcError::MalformedMessage(format!(
                "{} buffers but {} layout entries",
                buffers.len(),
                buffers_layout.len()
            )));
        }
        Ok(Self {
            length,
            nodes,
            buffers,
            buffers_layout,
        })
    }

    /// Number of rows in the batch.
    pub fn length(&self) -> i32 {
        self.length
    }

    pub fn nodes(&self) -> &[ArrowFieldNode] {
        &self.nodes
    }

    pub fn buffers(&self) -> &[Buffer] {
        &self.buffers
    }

    pub fn buffers_layout(&self) -> &[BufferDescriptor] {
        &self.buffers_layout
    }

    /// Length of the serialized body: the end of the last buffer rounded up to a
    /// multiple of 8.
    pub fn compute_body_length(&self) -> i64 {
        let mut size = 0u64;
        for (buffer, layout) in self.buffers.iter().zip(&self.buffers_layout) {
            size = layout.offset() as u64 + buffer.len() as u64;
            size += padding_to_8(size);
        }
        size as i64
    }

    /// Writes the `RecordBatch` flatbuffer table for this batch.
    pub(crate) fn write_to<'fbb>(
        &self,
        fbb: &mut FlatBufferBuilder<'fbb>,
    ) -> WIPOffset<ipc::RecordBatch<'fbb>> {
        let nodes: Vec<ipc::FieldNode> = self.nodes.iter().map(|n| n.to_fb()).collect();
        let buffers: Vec<ipc::Buffer> = self.buffers_layout.iter().map(|b| b.to_fb()).collect();
        let nodes = fbb.create_vector(&nodes);
        let buffers = fbb.create_vector(&buffers);

        let mut builder = ipc::RecordBatchBuilder::new(fbb);
        builder.add_length(i64::from(self.length));
        builder.add_nodes(nodes);
        builder.add_buffers(buffers);
        builder.finish()
    }

    /// Releases the batch, handing its buffers to the caller.
    pub fn into_buffers(self) -> Vec<Buffer> {
        self.buffers
    }
}

//==================================================================================
// 2. Dictionary Batch
//==================================================================================

/// The values of one dictionary, carried as a single-column record batch.
#[derive(Debug, Clone)]
pub struct ArrowDictionaryBatch {
    id: i64,
    dictionary: ArrowRecordBatch,
    is_delta: bool,
}

impl ArrowDictionaryBatch {
    pub fn new(id: i64, dictionary: ArrowRecordBatch) -> Self {
        Self {
            id,
            dictionary,
            is_delta: false,
        }
    }

    /// A batch whose values extend, rather than replace, the dictionary with `id`.
    pub fn new_delta(id: i64, dictionary: ArrowRecordBatch) -> Self {
        Self {
            id,
            dictionary,
            is_delta: true,
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn dictionary(&self) -> &ArrowRecordBatch {
        &self.dictionary
    }

    pub fn is_delta(&self) -> bool {
        self.is_delta
    }

    pub fn compute_body_length(&self) -> i64 {
        self.dictionary.compute_body_length()
    }

    pub(crate) fn write_to<'fbb>(
        &self,
        fbb: &mut FlatBufferBuilder<'fbb>,
    ) -> WIPOffset<ipc::DictionaryBatch<'fbb>> {
        let data = self.dictionary.write_to(fbb);
        let mut builder = ipc::DictionaryBatchBuilder::new(fbb);
        builder.add_id(self.id);
        builder.add_data(data);
        builder.add_isDelta(self.is_delta);
        builder.finish()
    }

    pub fn into_dictionary(self) -> ArrowRecordBatch {
        self.dictionary
    }
}

//==================================================================================
// 3. Message Sum Type
//==================================================================================

/// Either kind of body-carrying message, as returned by
/// [`deserialize_message_batch`](crate::ipc::serializer::deserialize_message_batch).
#[derive(Debug, Clone)]
pub enum ArrowMessage {
    RecordBatch(ArrowRecordBatch),
    DictionaryBatch(ArrowDictionaryBatch),
}

impl ArrowMessage {
    pub fn header_type(&self) -> MessageHeader {
        match self {
            ArrowMessage::RecordBatch(_) => MessageHeader::RecordBatch,
            ArrowMessage::DictionaryBatch(_) => MessageHeader::DictionaryBatch,
        }
    }

    pub fn compute_body_length(&self) -> i64 {
        match self {
            ArrowMessage::RecordBatch(batch) => batch.compute_body_length(),
            ArrowMessage::DictionaryBatch(batch) => batch.compute_body_length(),
        }
    }
}
