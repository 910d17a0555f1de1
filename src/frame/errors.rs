//! Error types for frame assembly and serialisation.

use thiserror::Error;
use tokio::io;

/// Errors that can occur while reading or writing frames.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Advertised document length exceeds the accepted maximum.
    #[error("payload of {0} bytes exceeds allowed maximum")]
    PayloadTooLarge(usize),
    /// Advertised document length undercuts the minimal document.
    #[error("invalid frame length {0}")]
    InvalidLength(usize),
    /// The response document could not be serialised.
    #[error("error serialising response document: {0}")]
    Serialise(#[from] bson::ser::Error),
    /// I/O error occurred during read or write.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
