//! WAVE encoder error types.

use thiserror::Error;

/// WAVE encoder errors.
#[derive(Error, Debug)]
pub enum WaveError {
    /// A sample width the PCM writer cannot emit.
    #[error("wave::encoder: (protocol error) unexpected sample bit size ({0})")]
    UnsupportedBitSize(u8),

    /// I/O failure in the underlying byte sink.
    #[error("wave::encoder: i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// WAVE encoder result type.
pub type Result<T> = std::result::Result<T, WaveError>;
