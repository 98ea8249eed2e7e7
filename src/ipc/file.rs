// In: src/ipc/file.rs

//! The random-access file format.
//!
//! ```text
//! ARROW1 <pad to 8> <schema> <dictionary & record batches> [EOS] <Footer> <i32 footer length> ARROW1
//! ```
//!
//! The flatbuffer `Footer` repeats the schema and holds one `Block` per dictionary
//! and record batch, so a reader can load any batch with a single seek and read.

use std::io::{Read, Seek, Write};
use std::sync::Arc;

use arrow::datatypes::{Schema, SchemaRef};
use arrow::ipc::convert::{fb_to_schema, schema_to_fb_offset};
use arrow::ipc;
use flatbuffers::FlatBufferBuilder;
use serde::Serialize;

use crate::config::IpcConfig;
use crate::error::IpcError;
use crate::ipc::batch::{ArrowDictionaryBatch, ArrowRecordBatch};
use crate::ipc::channel::{ReadChannel, WriteChannel};
use crate::ipc::serializer;
use crate::ipc::{ARROW_MAGIC, METADATA_VERSION};
use crate::memory::HeapAllocator;
use crate::types::ArrowBlock;

//==================================================================================
// 1. FileWriter
//==================================================================================

pub struct FileWriter<W: Write> {
    out: WriteChannel<W>,
    schema: SchemaRef,
    config: Arc<IpcConfig>,
    dictionary_blocks: Vec<ArrowBlock>,
    record_blocks: Vec<ArrowBlock>,
    finished: bool,
}

impl<W: Write> FileWriter<W> {
    /// Writes the leading magic and the schema message.
    pub fn try_new(out: W, schema: SchemaRef, config: Arc<IpcConfig>) -> Result<Self, IpcError> {
        let mut out = WriteChannel::new(out);
        out.write(ARROW_MAGIC)?;
        out.align()?;
        serializer::serialize_schema(&mut out, &schema)?;
        Ok(Self {
            out,
            schema,
            config,
            dictionary_blocks: Vec::new(),
            record_blocks: Vec::new(),
            finished: false,
        })
    }

    pub fn write_dictionary_batch(
        &mut self,
        batch: &ArrowDictionaryBatch,
    ) -> Result<ArrowBlock, IpcError> {
        self.ensure_writable()?;
        let block = serializer::serialize_dictionary_batch(&mut self.out, batch)?;
        self.dictionary_blocks.push(block);
        Ok(block)
    }

    pub fn write_record_batch(&mut self, batch: &ArrowRecordBatch) -> Result<ArrowBlock, IpcError> {
        self.ensure_writable()?;
        let block = serializer::serialize_record_batch(&mut self.out, batch)?;
        self.record_blocks.push(block);
        Ok(block)
    }

    /// Writes the footer and trailing magic, then flushes. Idempotent.
    pub fn finish(&mut self) -> Result<(), IpcError> {
        if self.finished {
            return Ok(());
        }
        if self.config.write_end_of_stream_marker {
            self.out.write_i32_le(0)?;
        }

        let mut fbb = FlatBufferBuilder::new();
        let dictionaries: Vec<ipc::Block> = self.dictionary_blocks.iter().map(|b| b.to_fb()).collect();
        let record_batches: Vec<ipc::Block> = self.record_blocks.iter().map(|b| b.to_fb()).collect();
        let dictionaries = fbb.create_vector(&dictionaries);
        let record_batches = fbb.create_vector(&record_batches);
        let schema = schema_to_fb_offset(&mut fbb, &self.schema);

        let root = {
            let mut footer = ipc::FooterBuilder::new(&mut fbb);
            footer.add_version(METADATA_VERSION);
            footer.add_schema(schema);
            footer.add_dictionaries(dictionaries);
            footer.add_recordBatches(record_batches);
            footer.finish()
        };
        fbb.finish(root, None);
        let footer_data = fbb.finished_data();
        let footer_length = i32::try_from(footer_data.len()).map_err(|_| {
            IpcError::UnsupportedSize(format!("footer of {} bytes", footer_data.len()))
        })?;

        self.out.write(footer_data)?;
        self.out.write_i32_le(footer_length)?;
        self.out.write(ARROW_MAGIC)?;
        self.out.flush()?;
        self.finished = true;

        log::debug!(
            "file finished: {} dictionaries, {} record batches, footer {} bytes",
            self.dictionary_blocks.len(),
            self.record_blocks.len(),
            footer_length
        );
        Ok(())
    }

    pub fn record_blocks(&self) -> &[ArrowBlock] {
        &self.record_blocks
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }

    fn ensure_writable(&self) -> Result<(), IpcError> {
        if self.finished {
            return Err(IpcError::UnexpectedMessage(
                "cannot write to a finished file".to_string(),
            ));
        }
        Ok(())
    }
}

//==================================================================================
// 2. FileReader
//==================================================================================

pub struct FileReader<R: Read + Seek> {
    input: ReadChannel<R>,
    schema: SchemaRef,
    config: Arc<IpcConfig>,
    allocator: HeapAllocator,
    dictionary_blocks: Vec<ArrowBlock>,
    record_blocks: Vec<ArrowBlock>,
}

impl<R: Read + Seek> FileReader<R> {
    /// Validates both magics and loads the footer index.
    pub fn try_new(input: R, config: Arc<IpcConfig>) -> Result<Self, IpcError> {
        let mut input = ReadChannel::new(input);
        let file_size = input.size()?;
        let trailer_length = (4 + ARROW_MAGIC.len()) as u64;
        if file_size < 8 + trailer_length {
            return Err(IpcError::MalformedMessage(format!(
                "file of {} bytes is too small",
                file_size
            )));
        }

        input.set_position(0)?;
        let mut magic = [0u8; 6];
        if input.read_fully(&mut magic)? != magic.len() || &magic != ARROW_MAGIC {
            return Err(IpcError::MalformedMessage("missing leading magic".to_string()));
        }

        let trailer_start = file_size - trailer_length;
        input.set_position(trailer_start)?;
        let mut trailer = [0u8; 10];
        let actual = input.read_fully(&mut trailer)?;
        if actual != trailer.len() {
            return Err(IpcError::TruncatedRead {
                expected: trailer.len(),
                actual,
            });
        }
        if &trailer[4..] != ARROW_MAGIC {
            return Err(IpcError::MalformedMessage("missing trailing magic".to_string()));
        }

        let footer_length = serializer::bytes_to_int([trailer[0], trailer[1], trailer[2], trailer[3]]);
        let footer_start = u64::try_from(footer_length)
            .ok()
            .filter(|&len| len > 0 && len + 8 <= trailer_start)
            .map(|len| trailer_start - len)
            .ok_or_else(|| {
                IpcError::MalformedMessage(format!("invalid footer length {}", footer_length))
            })?;

        input.set_position(footer_start)?;
        let mut footer_bytes = vec![0u8; footer_length as usize];
        let actual = input.read_fully(&mut footer_bytes)?;
        if actual != footer_bytes.len() {
            return Err(IpcError::TruncatedRead {
                expected: footer_bytes.len(),
                actual,
            });
        }

        let footer = ipc::root_as_footer(&footer_bytes)?;
        if footer.version() != METADATA_VERSION {
            return Err(IpcError::IncompatibleVersion {
                expected: METADATA_VERSION.0,
                found: footer.version().0,
            });
        }
        let schema = footer
            .schema()
            .map(fb_to_schema)
            .ok_or_else(|| IpcError::MalformedMessage("footer has no schema".to_string()))?;
        let dictionary_blocks: Vec<ArrowBlock> = footer
            .dictionaries()
            .map(|blocks| blocks.iter().map(|b| ArrowBlock::from_fb(b)).collect())
            .unwrap_or_default();
        let record_blocks: Vec<ArrowBlock> = footer
            .recordBatches()
            .map(|blocks| blocks.iter().map(|b| ArrowBlock::from_fb(b)).collect())
            .unwrap_or_default();

        log::debug!(
            "opened file: {} bytes, {} dictionaries, {} record batches",
            file_size,
            dictionary_blocks.len(),
            record_blocks.len()
        );
        Ok(Self {
            input,
            schema: Arc::new(schema),
            allocator: HeapAllocator::from_config(&config),
            config,
            dictionary_blocks,
            record_blocks,
        })
    }

    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    pub fn schema_ref(&self) -> &Schema {
        &self.schema
    }

    pub fn record_batch_count(&self) -> usize {
        self.record_blocks.len()
    }

    pub fn dictionary_batch_count(&self) -> usize {
        self.dictionary_blocks.len()
    }

    pub fn record_blocks(&self) -> &[ArrowBlock] {
        &self.record_blocks
    }

    pub fn dictionary_blocks(&self) -> &[ArrowBlock] {
        &self.dictionary_blocks
    }

    /// The footer's block index as JSON, for tooling that inspects a file without
    /// decoding its batches.
    pub fn block_index_json(&self) -> Result<String, IpcError> {
        let index = BlockIndex {
            dictionaries: &self.dictionary_blocks,
            record_batches: &self.record_blocks,
        };
        Ok(serde_json::to_string(&index)?)
    }

    /// Loads record batch `index`. `Ok(None)` if the file has no such batch.
    pub fn read_record_batch(&mut self, index: usize) -> Result<Option<ArrowRecordBatch>, IpcError> {
        let Some(block) = self.record_blocks.get(index).copied() else {
            return Ok(None);
        };
        self.seek_to(&block)?;
        serializer::deserialize_record_batch_from_block(&mut self.input, &block, &self.allocator, &self.config)
            .map(Some)
    }

    /// Loads dictionary batch `index`. `Ok(None)` if the file has no such batch.
    pub fn read_dictionary_batch(
        &mut self,
        index: usize,
    ) -> Result<Option<ArrowDictionaryBatch>, IpcError> {
        let Some(block) = self.dictionary_blocks.get(index).copied() else {
            return Ok(None);
        };
        self.seek_to(&block)?;
        serializer::deserialize_dictionary_batch_from_block(
            &mut self.input,
            &block,
            &self.allocator,
            &self.config,
        )
        .map(Some)
    }

    fn seek_to(&mut self, block: &ArrowBlock) -> Result<(), IpcError> {
        let offset = u64::try_from(block.offset()).map_err(|_| {
            IpcError::MalformedMessage(format!("negative block offset {}", block.offset()))
        })?;
        self.input.set_position(offset)
    }
}

#[derive(Serialize)]
struct BlockIndex<'a> {
    dictionaries: &'a [ArrowBlock],
    record_batches: &'a [ArrowBlock],
}
