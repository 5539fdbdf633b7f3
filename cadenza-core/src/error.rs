//! Error types shared across the cadenza workspace.

use thiserror::Error;

/// Workspace-level error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Bitstream parsing errors.
    #[error("bitstream: {0}")]
    Bitstream(#[from] BitstreamError),

    /// I/O errors from the underlying byte source or sink.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid parameter provided by the caller.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Bitstream parsing errors.
#[derive(Error, Debug)]
pub enum BitstreamError {
    /// The byte source ran dry in the middle of a read.
    #[error("(protocol error) unexpected end of bitstream")]
    UnexpectedEnd,
}

/// Result type alias using the workspace [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an invalid parameter error.
    pub fn invalid_param(msg: impl Into<String>) -> Self {
        Error::InvalidParameter(msg.into())
    }

    /// Check if this error marks the byte source running dry mid-read.
    #[must_use]
    pub fn is_unexpected_end(&self) -> bool {
        matches!(self, Error::Bitstream(BitstreamError::UnexpectedEnd))
    }
}
