//! Value types describing how a batch is laid out on the wire.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Row count and null count of one logical column within a batch.
///
/// Invariant: `0 <= null_count <= length`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArrowFieldNode {
    length: i32,
    null_count: i32,
}

impl ArrowFieldNode {
    pub fn new(length: i32, null_count: i32) -> Self {
        debug_assert!(length >= 0 && null_count >= 0 && null_count <= length);
        Self { length, null_count }
    }

    pub fn length(&self) -> i32 {
        self.length
    }

    pub fn null_count(&self) -> i32 {
        self.null_count
    }

    /// The flatbuffer struct written into a `RecordBatch` header.
    pub(crate) fn to_fb(self) -> arrow::ipc::FieldNode {
        arrow::ipc::FieldNode::new(i64::from(self.length), i64::from(self.null_count))
    }
}

impl fmt::Display for ArrowFieldNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldNode [length={}, nullCount={}]", self.length, self.null_count)
    }
}

/// Location of one buffer inside a message body, relative to the body start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferDescriptor {
    offset: i64,
    size: i64,
}

impl BufferDescriptor {
    pub fn new(offset: i64, size: i64) -> Self {
        Self { offset, size }
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn size(&self) -> i64 {
        self.size
    }

    pub(crate) fn to_fb(self) -> arrow::ipc::Buffer {
        arrow::ipc::Buffer::new(self.offset, self.size)
    }
}

/// Index entry locating one serialized message for random access.
///
/// `metadata_length` includes the 4-byte length prefix and the padding after the
/// flatbuffer envelope, so the body always starts at `offset + metadata_length`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArrowBlock {
    offset: i64,
    metadata_length: i32,
    body_length: i64,
}

impl ArrowBlock {
    pub fn new(offset: i64, metadata_length: i32, body_length: i64) -> Self {
        Self {
            offset,
            metadata_length,
            body_length,
        }
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn metadata_length(&self) -> i32 {
        self.metadata_length
    }

    pub fn body_length(&self) -> i64 {
        self.body_length
    }

    pub(crate) fn to_fb(self) -> arrow::ipc::Block {
        arrow::ipc::Block::new(self.offset, self.metadata_length, self.body_length)
    }

    pub(crate) fn from_fb(block: &arrow::ipc::Block) -> Self {
        Self::new(block.offset(), block.metaDataLength(), block.bodyLength())
    }
}
