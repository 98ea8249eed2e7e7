// In: src/ipc/channel.rs

//! Position-tracking wrappers around `std::io` readers and writers.
//!
//! Every alignment decision in the codec is made against the absolute position of
//! the underlying stream, so the write side counts every byte that passes through
//! it. The read side counts bytes as well and turns short reads into explicit
//! counts instead of silently returning partial data.

use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};

use arrow::buffer::Buffer;

use crate::error::IpcError;
use crate::memory::BufferAllocator;
use crate::utils::padding_to_8;

const ZEROS: [u8; 64] = [0u8; 64];

//==================================================================================
// 1. WriteChannel
//==================================================================================

pub struct WriteChannel<W: Write> {
    out: W,
    current_position: u64,
}

impl<W: Write> WriteChannel<W> {
    pub fn new(out: W) -> Self {
        Self::with_position(out, 0)
    }

    /// Wraps a writer that is already `position` bytes into its stream.
    pub fn with_position(out: W, position: u64) -> Self {
        Self {
            out,
            current_position: position,
        }
    }

    pub fn current_position(&self) -> u64 {
        self.current_position
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<u64, IpcError> {
        self.out.write_all(bytes)?;
        self.current_position += bytes.len() as u64;
        Ok(bytes.len() as u64)
    }

    pub fn write_buffer(&mut self, buffer: &Buffer) -> Result<u64, IpcError> {
        self.write(buffer.as_slice())
    }

    pub fn write_zeros(&mut self, count: usize) -> Result<u64, IpcError> {
        let mut remaining = count;
        while remaining > 0 {
            let n = remaining.min(ZEROS.len());
            self.write(&ZEROS[..n])?;
            remaining -= n;
        }
        Ok(count as u64)
    }

    /// Pads with zeros up to the next multiple of 8. Returns the padding written.
    pub fn align(&mut self) -> Result<u64, IpcError> {
        let padding = padding_to_8(self.current_position);
        if padding > 0 {
            self.write_zeros(padding as usize)?;
        }
        Ok(padding)
    }

    pub fn write_i32_le(&mut self, value: i32) -> Result<u64, IpcError> {
        self.write(&value.to_le_bytes())
    }

    pub fn flush(&mut self) -> Result<(), IpcError> {
        self.out.flush()?;
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

//==================================================================================
// 2. ReadChannel
//==================================================================================

pub struct ReadChannel<R: Read> {
    input: R,
    bytes_read: u64,
}

impl<R: Read> ReadChannel<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            bytes_read: 0,
        }
    }

    /// Total bytes consumed through this channel.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Reads until `buf` is full or the input is exhausted, returning the number of
    /// bytes actually read. A return value smaller than `buf.len()` means the input
    /// ended early; it is up to the caller to decide whether that is an error.
    pub fn read_fully(&mut self, buf: &mut [u8]) -> Result<usize, IpcError> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.input.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        self.bytes_read += filled as u64;
        Ok(filled)
    }

    /// Reads exactly `length` bytes into a buffer obtained from `allocator`.
    pub fn read_buffer(
        &mut self,
        length: usize,
        allocator: &dyn BufferAllocator,
    ) -> Result<Buffer, IpcError> {
        let mut buffer = allocator.allocate(length)?;
        let actual = self.read_fully(buffer.as_slice_mut())?;
        if actual != length {
            return Err(IpcError::TruncatedRead {
                expected: length,
                actual,
            });
        }
        Ok(buffer.into())
    }

    pub fn into_inner(self) -> R {
        self.input
    }
}

impl<R: Read + Seek> ReadChannel<R> {
    /// Moves the read cursor to an absolute offset.
    pub fn set_position(&mut self, position: u64) -> Result<(), IpcError> {
        self.input.seek(SeekFrom::Start(position))?;
        Ok(())
    }

    /// Total size of the underlying input. The cursor is left where it was.
    pub fn size(&mut self) -> Result<u64, IpcError> {
        let current = self.input.stream_position()?;
        let end = self.input.seek(SeekFrom::End(0))?;
        self.input.seek(SeekFrom::Start(current))?;
        Ok(end)
    }
}
