//! Minimal client connection for the wire protocol.
//!
//! One request in flight per connection, strict request/response
//! pairing: [`Connection::send`] writes a single envelope frame and reads
//! back exactly one response document. Used by client tooling and the
//! integration suite; no pooling is provided here.

use bson::Document;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::frame;

/// Errors raised while talking to a broker.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection or stream failure.
    #[error("I/O error: {0}")]
    Io(#[from] tokio::io::Error),
    /// The request or response frame was malformed.
    #[error(transparent)]
    Frame(#[from] frame::FrameError),
    /// The response bytes did not validate as a BSON document.
    #[error("response payload is not BSON")]
    NotBson,
}

/// A connected broker session.
pub struct Connection {
    stream: TcpStream,
}

impl Connection {
    /// Connect to a broker endpoint.
    ///
    /// # Errors
    /// Returns the connection failure.
    #[must_use = "handle the result"]
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        Ok(Self {
            stream: TcpStream::connect(addr).await?,
        })
    }

    /// Send one envelope and read the paired response document.
    ///
    /// # Errors
    /// Returns any framing or I/O failure; protocol-level errors arrive
    /// as response documents carrying an `error` field.
    #[must_use = "handle the result"]
    pub async fn send(&mut self, envelope: &Document) -> Result<Document, ClientError> {
        let bytes = frame::encode(envelope)?;
        self.stream.write_all(&bytes).await?;
        let reply = frame::read_frame(&mut self.stream).await?;
        frame::validate(&reply).ok_or(ClientError::NotBson)
    }
}
