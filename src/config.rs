// In: src/config.rs

//! The single source of truth for all tambak IPC reader/writer configuration.
//!
//! `IpcConfig` is created once at the application boundary (e.g. from a JSON file)
//! and then passed down to stream and file readers/writers as a shared, read-only
//! `Arc<IpcConfig>`. The codec functions themselves are configuration-free; only
//! the stateful readers and writers consult these limits.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::IpcError;

/// Bodies and blocks above this size cannot be addressed by `i32` offsets.
pub const DEFAULT_MAX_BODY_BYTES: u64 = i32::MAX as u64;
/// A reasonable limit to prevent OOM from malformed length prefixes. (16MB)
pub const DEFAULT_MAX_METADATA_BYTES: usize = 16 * 1024 * 1024;

//==================================================================================
// I. The Unified IpcConfig
//==================================================================================

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct IpcConfig {
    /// Largest flatbuffer envelope a reader will allocate for. A length prefix above
    /// this is rejected with `UnsupportedSize` before any allocation happens.
    #[serde(default = "default_max_metadata_bytes")]
    pub max_metadata_bytes: usize,

    /// Largest message body (or `metadata + body` block) a reader will accept.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: u64,

    /// If true, writers emit the zero-length end-of-stream sentinel on `finish`.
    #[serde(default = "default_true")]
    pub write_end_of_stream_marker: bool,

    /// Optional cap on any single allocation made by the `HeapAllocator`.
    #[serde(default)]
    pub allocation_limit: Option<usize>,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            max_metadata_bytes: default_max_metadata_bytes(),
            max_body_bytes: default_max_body_bytes(),
            write_end_of_stream_marker: true,
            allocation_limit: None,
        }
    }
}

impl IpcConfig {
    /// Parses a configuration from a JSON document. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self, IpcError> {
        let config: IpcConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, IpcError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    fn validate(&self) -> Result<(), IpcError> {
        if self.max_body_bytes > DEFAULT_MAX_BODY_BYTES {
            return Err(IpcError::UnsupportedSize(format!(
                "max_body_bytes {} exceeds the addressable limit {}",
                self.max_body_bytes, DEFAULT_MAX_BODY_BYTES
            )));
        }
        Ok(())
    }
}

/// Helper for `serde` to default a boolean field to true.
fn default_true() -> bool {
    true
}

fn default_max_metadata_bytes() -> usize {
    DEFAULT_MAX_METADATA_BYTES
}

fn default_max_body_bytes() -> u64 {
    DEFAULT_MAX_BODY_BYTES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_takes_defaults() {
        let config = IpcConfig::from_json_str("{}").unwrap();
        assert_eq!(config, IpcConfig::default());
        assert!(config.write_end_of_stream_marker);
        assert_eq!(config.max_body_bytes, i32::MAX as u64);
    }

    #[test]
    fn test_partial_json_overrides() {
        let config = IpcConfig::from_json_str(
            r#"{"write_end_of_stream_marker": false, "allocation_limit": 4096}"#,
        )
        .unwrap();
        assert!(!config.write_end_of_stream_marker);
        assert_eq!(config.allocation_limit, Some(4096));
        assert_eq!(config.max_metadata_bytes, DEFAULT_MAX_METADATA_BYTES);
    }

    #[test]
    fn test_body_limit_above_addressable_range_is_rejected() {
        let result = IpcConfig::from_json_str(r#"{"max_body_bytes": 4294967296}"#);
        assert!(matches!(result, Err(IpcError::UnsupportedSize(_))));
    }

    #[test]
    fn test_malformed_json_is_serde_error() {
        let result = IpcConfig::from_json_str("{ not json");
        assert!(matches!(result, Err(IpcError::SerdeJson(_))));
    }
}
