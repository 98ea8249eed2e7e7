//! This module defines the core, strongly-typed layout descriptors shared by the
//! validity bitmap engine and the IPC batch codec.
//!
//! They are plain value types: a field node describes one column's row and null
//! counts, a buffer descriptor locates one buffer inside a message body, and a block
//! locates one whole message inside a file.

pub mod layout;

// Re-export the main type(s) for easier access.
pub use layout::{ArrowBlock, ArrowFieldNode, BufferDescriptor};
