//! Error types for chunkstream.

use std::io::{Error as IoError, ErrorKind as IoErrorKind};
use thiserror::Error;

/// Error type for chunk and stream operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("buffer allocation failed: {size} bytes aligned to {align}")]
    Alloc { size: usize, align: usize },

    #[error("range out of bounds: offset={offset}, len={len}, size={size}")]
    OutOfRange {
        offset: usize,
        len: usize,
        size: usize,
    },

    #[error("logic error: {0}")]
    Logic(&'static str),

    #[error("transport error: {0}")]
    Transport(#[from] IoError),

    #[error("invalid config: {0}")]
    Config(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for failures surfaced by the underlying source or sink.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

impl From<Error> for IoError {
    fn from(e: Error) -> Self {
        match e {
            Error::Transport(e) => e,
            Error::Alloc { .. } => IoError::new(IoErrorKind::OutOfMemory, e),
            Error::OutOfRange { .. } => IoError::new(IoErrorKind::InvalidInput, e),
            Error::Logic(_) => IoError::other(e),
            Error::Config(_) => IoError::new(IoErrorKind::InvalidData, e),
        }
    }
}
