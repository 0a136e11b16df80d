//! Wire protocol definitions for talking to a ZP cluster.
//!
//! Two message families share one framing (4-byte big-endian length prefix,
//! then one protobuf message):
//! - [`meta`]: control-plane commands served by the meta service (table
//!   lifecycle, topology pulls, replica management, listings).
//! - [`data`]: key-value commands served by data nodes (point ops, batched
//!   gets, node statistics).
//!
//! Messages are hand-authored `prost` types with explicit field tags, so the
//! crate builds without a protoc step while keeping the protobuf encoding.

pub mod data;
pub mod meta;

// Re-export commonly used types for convenience
pub use data::*;
pub use meta::*;
