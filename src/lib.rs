//! This file is the root of the `tambak_ipc` Rust crate.
//!
//! It is the wire layer of tambak: a validity-bitmap engine and the framing and
//! batch codec that move schema, record batch and dictionary batch messages onto and
//! off a byte stream, byte-compatible with other Arrow IPC implementations.
//!
//! Its responsibilities are strictly limited to:
//! 1.  Declaring all the top-level modules of our library (`ipc`, `null_handling`,
//!     etc.) so the Rust compiler knows they exist.
//! 2.  Re-exporting the handful of types most callers need.

//==================================================================================
// 0. Constants
//==================================================================================
/// The crate version, automatically set from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
//==================================================================================
// 1. Module Declarations
//==================================================================================
pub mod config;
pub mod error;
pub mod ipc;
pub mod memory;
pub mod null_handling;
pub mod observability;
pub mod types;
pub mod utils;

//==================================================================================
// 2. Public API Re-exports
//==================================================================================
pub use config::IpcConfig;
pub use error::IpcError;
pub use ipc::{ArrowDictionaryBatch, ArrowMessage, ArrowRecordBatch};
pub use memory::{BufferAllocator, HeapAllocator};
pub use null_handling::ValidityBuffer;
pub use types::{ArrowBlock, ArrowFieldNode, BufferDescriptor};
