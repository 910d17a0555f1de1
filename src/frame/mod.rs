//! Length-prefixed BSON frame handling.
//!
//! A wire frame is a single BSON document: its first four bytes are a
//! little-endian `u32` holding the total document length including those
//! four bytes, so the document is self-delimiting and no extra envelope is
//! required. The codec in this module assembles inbound frames, classifies
//! them (request, ping, malformed, oversized), and serialises outbound
//! responses.

pub mod codec;
pub mod errors;
pub mod io;

pub use codec::{Inbound, Outbound, ServerCodec};
pub use errors::FrameError;
pub use io::{encode, read_frame, validate};

/// Number of bytes in the length prefix shared with the BSON header.
pub const LENGTH_PREFIX: usize = 4;
/// Smallest well-formed BSON document (length prefix plus terminator).
pub const MIN_DOCUMENT_SIZE: usize = 5;
/// Largest frame accepted from a client.
pub const MAX_DOCUMENT_SIZE: usize = 8 * 1024 * 1024; // 8 MiB
