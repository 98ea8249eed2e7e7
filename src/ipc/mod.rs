//! This module is the message framing and batch codec of the tambak IPC layer.
//!
//! It moves schema, record batch and dictionary batch messages onto and off a
//! byte stream. Buffer contents are opaque here: the codec only accounts for their
//! byte ranges, padding and alignment. Interpreting validity buffers is the job of
//! `crate::null_handling`.

use arrow::ipc::MetadataVersion;

//==================================================================================
// 1. Module Declarations
//==================================================================================

/// `ArrowRecordBatch`, `ArrowDictionaryBatch` and the `ArrowMessage` sum type.
pub mod batch;

/// Position-tracking read and write channels.
pub mod channel;

/// Random-access file format with a footer index.
pub mod file;

/// Reading envelopes and bodies from a byte stream.
pub mod message_reader;

/// The core serialize/deserialize functions.
pub mod serializer;

/// Sequential stream format.
pub mod stream;

//==================================================================================
// 2. Wire Constants
//==================================================================================

/// The only metadata version this codec reads or writes.
pub const METADATA_VERSION: MetadataVersion = MetadataVersion::V4;

/// Prefix value newer writers place before the real metadata length.
pub const CONTINUATION_MARKER: u32 = 0xFFFF_FFFF;

/// Magic bytes at both ends of a file.
pub const ARROW_MAGIC: &[u8; 6] = b"ARROW1";

//==================================================================================
// 3. Public API Re-exports
//==================================================================================
pub use batch::{ArrowDictionaryBatch, ArrowMessage, ArrowRecordBatch};
pub use channel::{ReadChannel, WriteChannel};
pub use file::{FileReader, FileWriter};
pub use message_reader::{MessageChannelReader, MessageEnvelope, MessageReader};
pub use serializer::{
    deserialize_dictionary_batch, deserialize_dictionary_batch_from_block,
    deserialize_message_batch, deserialize_record_batch, deserialize_record_batch_from_block,
    deserialize_schema, serialize_dictionary_batch, serialize_record_batch, serialize_schema,
    write_batch_buffers,
};
pub use stream::{StreamReader, StreamWriter};
