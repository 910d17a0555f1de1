//! Tokio codec for the length-prefixed BSON session protocol.
//!
//! Decoding mirrors the behaviour of the service this broker replaces: an
//! advertised length below the minimum document size is a no-op/ping whose
//! bytes are echoed back, an advertised length above the cap short-circuits
//! accumulation, and anything that fails BSON validation is answered with
//! the not-BSON error document rather than tearing the connection down.

use std::io::Cursor;

use bson::Document;
use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::{FrameError, LENGTH_PREFIX, MAX_DOCUMENT_SIZE, MIN_DOCUMENT_SIZE};

/// A classified inbound frame.
#[derive(Debug)]
pub enum Inbound {
    /// Advertised length below the minimum document size. The received
    /// bytes are echoed back verbatim.
    Ping(Bytes),
    /// A complete, structurally valid BSON document.
    Request {
        /// The decoded request envelope.
        document: Document,
        /// Size of the frame on the wire, reported in metrics.
        size: usize,
    },
    /// Bytes that do not form a valid BSON document.
    Invalid,
}

/// An outbound reply.
#[derive(Debug)]
pub enum Outbound {
    /// A BSON response document, written as a single frame.
    Document(Document),
    /// Raw bytes echoed back for ping frames.
    Raw(Bytes),
}

impl From<Document> for Outbound {
    fn from(document: Document) -> Self { Self::Document(document) }
}

/// Codec turning a TCP stream into classified frames and back.
#[derive(Debug, Default)]
pub struct ServerCodec;

/// Whether `tag` could start the first element of a BSON document.
///
/// Used to tell an oversized but plausibly real document apart from raw
/// bytes that merely decode to a huge length prefix. Element tags occupy
/// `0x01..=0x13` plus the deprecated `0x7F`/`0xFF` min/max keys; `0x00`
/// terminates the (empty) document.
const fn plausible_element_tag(tag: u8) -> bool {
    matches!(tag, 0x00..=0x13 | 0x7F | 0xFF)
}

fn advertised_length(src: &BytesMut) -> usize {
    let mut prefix = [0u8; LENGTH_PREFIX];
    prefix.copy_from_slice(&src[..LENGTH_PREFIX]);
    u32::from_le_bytes(prefix) as usize
}

impl Decoder for ServerCodec {
    type Item = Inbound;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Inbound>, FrameError> {
        if src.len() < LENGTH_PREFIX {
            return Ok(None);
        }
        let advertised = advertised_length(src);

        if advertised < MIN_DOCUMENT_SIZE {
            // No-op/ping. Echo the advertised number of bytes and drop the
            // remainder of the read, as the original service does.
            let take = advertised.min(src.len());
            let bytes = src.split_to(take).freeze();
            src.clear();
            return Ok(Some(Inbound::Ping(bytes)));
        }

        if advertised > MAX_DOCUMENT_SIZE {
            if src.len() == LENGTH_PREFIX {
                // Cannot classify until the first element tag arrives.
                return Ok(None);
            }
            if plausible_element_tag(src[LENGTH_PREFIX]) {
                return Err(FrameError::PayloadTooLarge(advertised));
            }
            // Raw bytes whose prefix merely decodes to a huge length. Judge
            // what arrived as-is; validation below fails and the session
            // answers with the not-BSON document.
            src.clear();
            return Ok(Some(Inbound::Invalid));
        }

        if src.len() < advertised {
            src.reserve(advertised - src.len());
            return Ok(None);
        }

        let bytes = src.split_to(advertised);
        match Document::from_reader(&mut Cursor::new(&bytes[..])) {
            Ok(document) => Ok(Some(Inbound::Request {
                document,
                size: advertised,
            })),
            Err(_) => Ok(Some(Inbound::Invalid)),
        }
    }
}

impl Encoder<Outbound> for ServerCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Outbound, dst: &mut BytesMut) -> Result<(), FrameError> {
        match item {
            Outbound::Document(document) => {
                let mut buf = Vec::new();
                document.to_writer(&mut buf)?;
                dst.extend_from_slice(&buf);
            }
            Outbound::Raw(bytes) => dst.extend_from_slice(&bytes),
        }
        Ok(())
    }
}
