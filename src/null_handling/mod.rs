//! This module serves as the public API for all validity-bitmap logic within the
//! tambak IPC layer.
//!
//! It is a leaf component: it knows nothing about messages or framing. The batch
//! codec moves validity buffers around as opaque byte ranges, and column loaders
//! use the kernels here to interpret or rebuild them.

//==================================================================================
// 1. Module Declarations
//==================================================================================

/// Stateless bit-level kernels: get/set, sizing, null counting, re-alignment and
/// reconstruction from a field node.
pub mod bitmap;

/// The lazily allocated validity buffer used by row-at-a-time builders.
pub mod validity_buffer;

//==================================================================================
// 2. Public API Re-exports
//==================================================================================
pub use bitmap::{load_validity_buffer, null_count, slice_validity_buffer, validity_buffer_size};
pub use validity_buffer::ValidityBuffer;

//==================================================================================
// 3. Unit Tests (Module-level integration tests)
//==================================================================================
