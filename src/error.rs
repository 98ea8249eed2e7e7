// In: src/error.rs

//! This module defines the single, unified error type for the entire tambak IPC library.
//! It uses the `thiserror` crate to provide ergonomic, context-aware error handling.
//!
//! Clean end of a message stream is never an error: readers report it as `Ok(None)`.
//! The variants below are reserved for conditions the caller must act on.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IpcError {
    // =========================================================================
    // === Framing & Protocol Errors (bad or unexpected input)
    // =========================================================================
    /// The stream ended where more bytes were mandatory (e.g. a schema message
    /// was required, or the prefix itself was cut short).
    #[error("Unexpected end of stream: {0}")]
    EndOfStream(String),

    #[error("Received metadata with an incompatible version number: expected {expected}, found {found}")]
    IncompatibleVersion { expected: i16, found: i16 },

    #[error("Unrecognized message header type: {0}")]
    UnrecognizedMessageKind(String),

    /// A valid message of the wrong kind arrived where a specific kind is required.
    #[error("Unexpected message: {0}")]
    UnexpectedMessage(String),

    /// A length or count exceeds what this implementation can address (2GiB bodies,
    /// `i32` row and null counts).
    #[error("Unsupported size: {0}")]
    UnsupportedSize(String),

    #[error("Truncated read: expected {expected} bytes, got {actual}")]
    TruncatedRead { expected: usize, actual: usize },

    /// Metadata that verifies as a flatbuffer but describes an impossible layout.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    // =========================================================================
    // === Internal Errors
    // =========================================================================
    /// A buffer write landed somewhere other than its computed offset.
    #[error("Buffer layout inconsistency (this is a bug): {0}")]
    LayoutInconsistency(String),

    #[error("Buffer allocation failed: {0}")]
    AllocationFailed(String),

    // =========================================================================
    // === External Error Wrappers (Using #[from] for automatic conversion)
    // =========================================================================
    /// The metadata envelope failed flatbuffer verification.
    #[error("Invalid flatbuffer: {0}")]
    InvalidFlatbuffer(#[from] flatbuffers::InvalidFlatbuffer),

    /// An error originating from the Arrow library.
    #[error("Arrow operation failed: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// An error originating from the underlying I/O subsystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An error from the Serde JSON library, typically while loading configuration.
    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
}

impl IpcError {
    /// Returns `true` when the error signals a defect in the codec itself rather
    /// than bad input. Callers should abort the whole stream on a fatal error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, IpcError::LayoutInconsistency(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_layout_inconsistency_is_fatal() {
        assert!(IpcError::LayoutInconsistency("wrong offset".into()).is_fatal());
        assert!(!IpcError::TruncatedRead { expected: 8, actual: 3 }.is_fatal());
        assert!(!IpcError::UnsupportedSize("too big".into()).is_fatal());
        assert!(!IpcError::EndOfStream("missing schema".into()).is_fatal());
    }

    #[test]
    fn test_io_error_converts_with_question_mark() {
        fn fails() -> Result<(), IpcError> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk gone"))?;
            Ok(())
        }
        let err = fails().unwrap_err();
        assert!(matches!(err, IpcError::Io(_)));
        assert!(err.to_string().contains("disk gone"));
    }
}
