// In: src/ipc/stream.rs

//! The sequential stream format: one schema message, then any mix of dictionary
//! and record batches, then an optional zero-length end marker.

use std::io::{Read, Write};
use std::sync::Arc;

use arrow::datatypes::{Schema, SchemaRef};
use hashbrown::HashMap;

use crate::config::IpcConfig;
use crate::error::IpcError;
use crate::ipc::batch::{ArrowDictionaryBatch, ArrowMessage, ArrowRecordBatch};
use crate::ipc::channel::WriteChannel;
use crate::ipc::message_reader::MessageChannelReader;
use crate::ipc::serializer;
use crate::memory::HeapAllocator;
use crate::types::ArrowBlock;

//==================================================================================
// 1. StreamWriter
//==================================================================================

pub struct StreamWriter<W: Write> {
    out: WriteChannel<W>,
    schema: SchemaRef,
    config: Arc<IpcConfig>,
    started: bool,
    finished: bool,
}

impl<W: Write> StreamWriter<W> {
    pub fn new(out: W, schema: SchemaRef, config: Arc<IpcConfig>) -> Self {
        Self {
            out: WriteChannel::new(out),
            schema,
            config,
            started: false,
            finished: false,
        }
    }

    /// Writes the schema message. Called implicitly by the first batch write.
    pub fn start(&mut self) -> Result<(), IpcError> {
        if !self.started {
            serializer::serialize_schema(&mut self.out, &self.schema)?;
            self.started = true;
        }
        Ok(())
    }

    pub fn write_dictionary_batch(
        &mut self,
        batch: &ArrowDictionaryBatch,
    ) -> Result<ArrowBlock, IpcError> {
        self.ensure_writable()?;
        serializer::serialize_dictionary_batch(&mut self.out, batch)
    }

    pub fn write_record_batch(&mut self, batch: &ArrowRecordBatch) -> Result<ArrowBlock, IpcError> {
        self.ensure_writable()?;
        serializer::serialize_record_batch(&mut self.out, batch)
    }

    /// Writes the end marker (if configured) and flushes. Idempotent.
    pub fn finish(&mut self) -> Result<(), IpcError> {
        if self.finished {
            return Ok(());
        }
        self.start()?;
        if self.config.write_end_of_stream_marker {
            self.out.write_i32_le(0)?;
        }
        self.out.flush()?;
        self.finished = true;
        log::debug!("stream finished after {} bytes", self.out.current_position());
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.out.current_position()
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }

    fn ensure_writable(&mut self) -> Result<(), IpcError> {
        if self.finished {
            return Err(IpcError::UnexpectedMessage(
                "cannot write to a finished stream".to_string(),
            ));
        }
        self.start()
    }
}

//==================================================================================
// 2. StreamReader
//==================================================================================

pub struct StreamReader<R: Read> {
    reader: MessageChannelReader<R>,
    schema: SchemaRef,
    allocator: HeapAllocator,
    /// Dictionary batches seen so far, by id. A delta batch is appended to the
    /// existing entry, any other batch replaces it.
    dictionaries: HashMap<i64, Vec<ArrowDictionaryBatch>>,
}

impl<R: Read> StreamReader<R> {
    /// Opens a stream and reads its schema message.
    pub fn try_new(input: R, config: Arc<IpcConfig>) -> Result<Self, IpcError> {
        let allocator = HeapAllocator::from_config(&config);
        let mut reader = MessageChannelReader::new(input, config);
        let schema = serializer::deserialize_schema(&mut reader)?;
        Ok(Self {
            reader,
            schema: Arc::new(schema),
            allocator,
            dictionaries: HashMap::new(),
        })
    }

    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    pub fn schema_ref(&self) -> &Schema {
        &self.schema
    }

    /// Returns the next record batch, retaining any dictionary batches read on the
    /// way. `Ok(None)` at the end of the stream.
    pub fn next_record_batch(&mut self) -> Result<Option<ArrowRecordBatch>, IpcError> {
        loop {
            match serializer::deserialize_message_batch(&mut self.reader, &self.allocator)? {
                None => return Ok(None),
                Some(ArrowMessage::RecordBatch(batch)) => return Ok(Some(batch)),
                Some(ArrowMessage::DictionaryBatch(batch)) => self.retain_dictionary(batch),
            }
        }
    }

    /// Every batch currently making up the dictionary with `id`, in stream order.
    pub fn dictionary(&self, id: i64) -> Option<&[ArrowDictionaryBatch]> {
        self.dictionaries.get(&id).map(Vec::as_slice)
    }

    pub fn bytes_read(&self) -> u64 {
        self.reader.bytes_read()
    }

    fn retain_dictionary(&mut self, batch: ArrowDictionaryBatch) {
        log::debug!(
            "retaining dictionary {} ({} rows, delta={})",
            batch.id(),
            batch.dictionary().length(),
            batch.is_delta()
        );
        let entry = self.dictionaries.entry(batch.id()).or_default();
        if !batch.is_delta() {
            entry.clear();
        }
        entry.push(batch);
    }
}
