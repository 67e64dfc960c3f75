//! Protocol module - wire type tags and the binary codec.
//!
//! This module implements the self-describing binary wire format:
//! - one-byte type tags and message kinds
//! - envelope, field stream, and primitive value encoding
//! - defensive decoding (negative lengths, unknown tags, bounded reads)

mod binary;
mod types;

pub use binary::{BinaryReader, BinaryWriter, Envelope, READ_CHUNK_LIMIT};
pub use types::{MessageKind, WireType};
