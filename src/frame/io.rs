//! Free-standing frame operations for clients of the wire protocol.
//!
//! The server side speaks through [`super::ServerCodec`]; client tooling
//! and the integration suite use these helpers instead: read one frame
//! from a stream, validate bytes into a document, and encode a document
//! into its wire form.

use std::io::Cursor;

use bson::Document;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::{FrameError, LENGTH_PREFIX, MAX_DOCUMENT_SIZE, MIN_DOCUMENT_SIZE};

/// Read one complete frame from `reader`.
///
/// The returned buffer holds the full document including its length
/// prefix.
///
/// # Errors
/// [`FrameError::PayloadTooLarge`] when the advertised length exceeds
/// the cap or undercuts the minimal document, or the underlying I/O
/// error.
#[must_use = "handle the result"]
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, FrameError> {
    let mut prefix = [0u8; LENGTH_PREFIX];
    reader.read_exact(&mut prefix).await?;
    let advertised = u32::from_le_bytes(prefix) as usize;
    if advertised < MIN_DOCUMENT_SIZE {
        return Err(FrameError::InvalidLength(advertised));
    }
    if advertised > MAX_DOCUMENT_SIZE {
        return Err(FrameError::PayloadTooLarge(advertised));
    }
    let mut bytes = vec![0u8; advertised];
    bytes[..LENGTH_PREFIX].copy_from_slice(&prefix);
    reader.read_exact(&mut bytes[LENGTH_PREFIX..]).await?;
    Ok(bytes)
}

/// Validate frame bytes into a document.
///
/// Validation never dereferences past the advertised length; malformed
/// structure yields `None`, matching the broker's not-BSON handling.
#[must_use]
pub fn validate(bytes: &[u8]) -> Option<Document> {
    if bytes.len() < MIN_DOCUMENT_SIZE {
        return None;
    }
    Document::from_reader(&mut Cursor::new(bytes)).ok()
}

/// Encode a document into its wire form.
///
/// # Errors
/// Returns the serialisation failure reported by the codec.
#[must_use = "handle the result"]
pub fn encode(document: &Document) -> Result<Vec<u8>, FrameError> {
    let mut bytes = Vec::new();
    document.to_writer(&mut bytes)?;
    Ok(bytes)
}
