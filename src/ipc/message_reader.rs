// In: src/ipc/message_reader.rs

//! Reading framed metadata envelopes and their bodies from a byte stream.

use std::io::Read;
use std::sync::Arc;

use arrow::buffer::Buffer;
use arrow::ipc::{self, MessageHeader, MetadataVersion};

use crate::config::IpcConfig;
use crate::error::IpcError;
use crate::ipc::channel::ReadChannel;
use crate::ipc::CONTINUATION_MARKER;
use crate::memory::BufferAllocator;

//==================================================================================
// 1. Message Envelope
//==================================================================================

/// A verified flatbuffer `Message` together with the bytes that hold it.
///
/// The header type, version and body length are cached at construction, so kind
/// and version checks need no decoding. Reaching the header itself goes through
/// [`MessageEnvelope::message`], which verifies the bytes again.
#[derive(Debug, Clone)]
pub struct MessageEnvelope {
    bytes: Buffer,
    header_type: MessageHeader,
    version: MetadataVersion,
    body_length: i64,
}

impl MessageEnvelope {
    /// Verifies `bytes` as a `Message` flatbuffer. Trailing padding is allowed.
    pub fn try_new(bytes: Buffer) -> Result<Self, IpcError> {
        let message = ipc::root_as_message(bytes.as_slice())?;
        let header_type = message.header_type();
        let version = message.version();
        let body_length = message.bodyLength();
        Ok(Self {
            bytes,
            header_type,
            version,
            body_length,
        })
    }

    /// The decoded flatbuffer view.
    pub fn message(&self) -> Result<ipc::Message<'_>, IpcError> {
        Ok(ipc::root_as_message(self.bytes.as_slice())?)
    }

    pub fn header_type(&self) -> MessageHeader {
        self.header_type
    }

    pub fn version(&self) -> MetadataVersion {
        self.version
    }

    pub fn body_length(&self) -> i64 {
        self.body_length
    }

    /// Size of the envelope bytes, padding included.
    pub fn metadata_len(&self) -> usize {
        self.bytes.len()
    }
}

//==================================================================================
// 2. Reader Contract
//==================================================================================

/// **CONTRACT:** a source of framed messages.
pub trait MessageReader {
    /// Reads the next envelope. `Ok(None)` is a clean end of stream.
    fn read_next_message(&mut self) -> Result<Option<MessageEnvelope>, IpcError>;

    /// Reads exactly `envelope.body_length()` bytes into one freshly allocated buffer.
    fn read_message_body(
        &mut self,
        envelope: &MessageEnvelope,
        allocator: &dyn BufferAllocator,
    ) -> Result<Buffer, IpcError>;
}

//==================================================================================
// 3. Channel-backed Reader
//==================================================================================

pub struct MessageChannelReader<R: Read> {
    input: ReadChannel<R>,
    config: Arc<IpcConfig>,
}

impl<R: Read> MessageChannelReader<R> {
    pub fn new(input: R, config: Arc<IpcConfig>) -> Self {
        Self::from_channel(ReadChannel::new(input), config)
    }

    pub fn from_channel(input: ReadChannel<R>, config: Arc<IpcConfig>) -> Self {
        Self { input, config }
    }

    pub fn bytes_read(&self) -> u64 {
        self.input.bytes_read()
    }

    pub fn config(&self) -> &IpcConfig {
        &self.config
    }

    pub fn into_inner(self) -> ReadChannel<R> {
        self.input
    }

    /// Reads a 4-byte little-endian prefix. `Ok(None)` if the input was already
    /// exhausted before the first byte.
    fn read_prefix(&mut self) -> Result<Option<i32>, IpcError> {
        let mut prefix = [0u8; 4];
        let n = self.input.read_fully(&mut prefix)?;
        match n {
            0 => Ok(None),
            4 => Ok(Some(i32::from_le_bytes(prefix))),
            actual => Err(IpcError::TruncatedRead {
                expected: 4,
                actual,
            }),
        }
    }
}

impl<R: Read> MessageReader for MessageChannelReader<R> {
    fn read_next_message(&mut self) -> Result<Option<MessageEnvelope>, IpcError> {
        let Some(mut length) = self.read_prefix()? else {
            log::debug!("input exhausted at a message boundary");
            return Ok(None);
        };

        if length as u32 == CONTINUATION_MARKER {
            length = self.read_prefix()?.ok_or_else(|| {
                IpcError::EndOfStream("stream ended after a continuation marker".to_string())
            })?;
        }

        if length == 0 {
            log::debug!("end-of-stream marker after {} bytes", self.input.bytes_read());
            return Ok(None);
        }
        if length < 0 {
            log::warn!("rejecting negative metadata length {}", length);
            return Err(IpcError::MalformedMessage(format!(
                "negative metadata length {}",
                length
            )));
        }

        let length = length as usize;
        if length > self.config.max_metadata_bytes {
            log::warn!(
                "rejecting {} byte envelope, limit is {}",
                length,
                self.config.max_metadata_bytes
            );
            return Err(IpcError::UnsupportedSize(format!(
                "metadata envelope of {} bytes exceeds the {} byte limit",
                length, self.config.max_metadata_bytes
            )));
        }

        let mut bytes = vec![0u8; length];
        let actual = self.input.read_fully(&mut bytes)?;
        if actual != length {
            return Err(IpcError::TruncatedRead {
                expected: length,
                actual,
            });
        }

        let envelope = MessageEnvelope::try_new(Buffer::from_vec(bytes))?;
        log::debug!(
            "read {:?} envelope ({} bytes, body {} bytes)",
            envelope.header_type(),
            length,
            envelope.body_length()
        );
        Ok(Some(envelope))
    }

    fn read_message_body(
        &mut self,
        envelope: &MessageEnvelope,
        allocator: &dyn BufferAllocator,
    ) -> Result<Buffer, IpcError> {
        let body_length = checked_body_length(envelope.body_length(), &self.config)?;
        self.input.read_buffer(body_length, allocator)
    }
}

/// Validates a declared body length against the configured limit.
pub(crate) fn checked_body_length(body_length: i64, config: &IpcConfig) -> Result<usize, IpcError> {
    if body_length < 0 {
        return Err(IpcError::MalformedMessage(format!(
            "negative body length {}",
            body_length
        )));
    }
    if body_length as u64 > config.max_body_bytes {
        return Err(IpcError::UnsupportedSize(format!(
            "cannot deserialize bodies over {} bytes, got {}",
            config.max_body_bytes, body_length
        )));
    }
    usize::try_from(body_length)
        .map_err(|_| IpcError::UnsupportedSize(format!("body length {} is not addressable", body_length)))
}
