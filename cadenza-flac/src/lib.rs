//! # cadenza-flac
//!
//! A streaming decoder for the Free Lossless Audio Codec (FLAC) bitstream.
//!
//! The decoder is a pull-model state machine over any [`std::io::Read`]
//! source. It walks the stream in protocol order: the `fLaC` marker, the
//! metadata blocks (STREAMINFO is parsed, everything else is skipped), then
//! one audio frame per call, decoded into an internal per-channel sample
//! buffer that is reused from frame to frame.
//!
//! ## Example
//!
//! ```no_run
//! use cadenza_flac::{DecoderState, FlacDecoder};
//! use std::fs::File;
//! use std::io::BufReader;
//!
//! let file = File::open("audio.flac").unwrap();
//! let mut decoder = FlacDecoder::new(BufReader::new(file));
//!
//! decoder.decode_marker().unwrap();
//! while decoder.state() != DecoderState::HasMetadata {
//!     decoder.decode_metadata().unwrap();
//! }
//! while decoder.state() != DecoderState::Complete {
//!     decoder.decode_audio().unwrap();
//!     // Samples for the latest frame: decoder.block_data()
//! }
//! ```

pub mod decoder;

pub use decoder::FlacDecoder;

use thiserror::Error;

/// Most channels a decoder instance will accept.
pub const MAX_CHANNEL_COUNT: usize = 2;

/// Default per-channel sample buffer capacity.
pub const DEFAULT_BUFFER_CAPACITY: usize = 8192;

/// FLAC decoder error types.
///
/// Two categories cover everything the decoder can reject: `(protocol
/// error)` for streams that violate FLAC, `(assertion failed)` for
/// structurally valid streams beyond this decoder's configured limits.
#[derive(Error, Debug)]
pub enum FlacError {
    /// The stream does not start with the `fLaC` marker.
    #[error("flac::decoder: (protocol error) unexpected stream marker; got {got:#010x}, expected 0x664c6143")]
    UnexpectedMarker {
        /// First 32 bits of the stream.
        got: u32,
    },

    /// A frame does not start with the 14-bit sync code.
    #[error("flac::decoder: (protocol error) unexpected frame sync code; got {got:#06x}, expected 0x3ffe")]
    UnexpectedSyncCode {
        /// The 14 bits read in place of the sync code.
        got: u16,
    },

    /// A frame header reserved bit is set.
    #[error("flac::decoder: (protocol error) unexpected frame reserved bit #{0}")]
    ReservedHeaderBit(u8),

    /// Reserved blocksize code in a frame header.
    #[error("flac::decoder: (protocol error) reserved blocksize code ({0})")]
    ReservedBlockSizeCode(u8),

    /// Reserved sample-rate code in a frame header.
    #[error("flac::decoder: (protocol error) reserved sample rate code ({0})")]
    ReservedSampleRateCode(u8),

    /// Reserved sample-size code in a frame header.
    #[error("flac::decoder: (protocol error) reserved sample bit size code ({0})")]
    ReservedSampleSizeCode(u8),

    /// Reserved subframe type code.
    #[error("flac::decoder: (protocol error) reserved subframe type ({0})")]
    ReservedSubframeType(u8),

    /// Reserved residual coding method.
    #[error("flac::decoder: (protocol error) reserved residual coding method ({0})")]
    ReservedCodingMethod(u8),

    /// The Rice partition count does not divide the blocksize.
    #[error("flac::decoder: (protocol error) invalid partition count vs. blocksize ({block_size} % {partitions} != 0)")]
    InvalidPartitionCount {
        /// Samples per channel in the current frame.
        block_size: usize,
        /// Partition count derived from the partition order.
        partitions: usize,
    },

    /// A subframe claims more wasted bits than its sample width holds.
    #[error("flac::decoder: (protocol error) wasted bits exceed sample bit size; got {got} of {sample_bit_size}")]
    InvalidWastedBits {
        /// Unary-coded wasted-bit count.
        got: u32,
        /// Sample width of the subframe.
        sample_bit_size: u8,
    },

    /// More channels than this decoder supports.
    #[error("flac::decoder: (assertion failed) expecting at most 2 channels; got {got}")]
    ChannelsExceeded {
        /// Channel count declared by the stream.
        got: u8,
    },

    /// A blocksize beyond the decoder's buffer capacity.
    #[error("flac::decoder: (assertion failed) expecting at most {capacity} samples per block; got {got}")]
    BlockSizeExceeded {
        /// Samples per block declared by the stream.
        got: u32,
        /// Configured buffer capacity.
        capacity: usize,
    },

    /// Reserved channel-assignment code.
    #[error("flac::decoder: (assertion failed) unsupported channel assignment ({0})")]
    UnsupportedChannelAssignment(u8),

    /// Bit reader or I/O failure in the underlying byte source.
    #[error(transparent)]
    Core(#[from] cadenza_core::Error),
}

/// FLAC decoder result type.
pub type Result<T> = std::result::Result<T, FlacError>;

impl FlacError {
    /// Check if this error marks a bitstream that violates FLAC.
    #[must_use]
    pub fn is_protocol(&self) -> bool {
        match self {
            FlacError::UnexpectedMarker { .. }
            | FlacError::UnexpectedSyncCode { .. }
            | FlacError::ReservedHeaderBit(_)
            | FlacError::ReservedBlockSizeCode(_)
            | FlacError::ReservedSampleRateCode(_)
            | FlacError::ReservedSampleSizeCode(_)
            | FlacError::ReservedSubframeType(_)
            | FlacError::ReservedCodingMethod(_)
            | FlacError::InvalidPartitionCount { .. }
            | FlacError::InvalidWastedBits { .. } => true,
            FlacError::Core(err) => err.is_unexpected_end(),
            _ => false,
        }
    }

    /// Check if this error marks a valid stream beyond the decoder's
    /// configured limits.
    #[must_use]
    pub fn is_assertion(&self) -> bool {
        matches!(
            self,
            FlacError::ChannelsExceeded { .. }
                | FlacError::BlockSizeExceeded { .. }
                | FlacError::UnsupportedChannelAssignment(_)
        )
    }
}

/// STREAMINFO metadata fields.
///
/// Valid once the decoder reaches [`DecoderState::HasMetadata`]. All fields
/// are decoded from the 34-byte STREAMINFO body; the trailing 128-bit MD5
/// signature is consumed but not captured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamInfo {
    /// Minimum blocksize in samples.
    pub min_block_size: u16,
    /// Maximum blocksize in samples.
    pub max_block_size: u16,
    /// Minimum frame size in bytes (0 = unknown).
    pub min_frame_size: u32,
    /// Maximum frame size in bytes (0 = unknown).
    pub max_frame_size: u32,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of channels.
    pub channel_count: u8,
    /// Bits per sample (4-32).
    pub sample_bit_size: u8,
    /// Total samples per channel (0 = unknown).
    pub sample_count: u64,
}

/// Decoder lifecycle states.
///
/// Driven solely by the three public decode operations; no state is ever
/// revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// Freshly constructed; nothing read yet.
    Init,
    /// The `fLaC` marker has been verified.
    HasMarker,
    /// The last metadata block has been read.
    HasMetadata,
    /// End of stream reached; no more audio frames.
    Complete,
}

/// FLAC metadata block types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataBlockType {
    /// Stream information (always first in practice).
    StreamInfo,
    /// Padding bytes.
    Padding,
    /// Application-specific data.
    Application,
    /// Seek table.
    SeekTable,
    /// Vorbis comment (tags).
    VorbisComment,
    /// Cue sheet.
    CueSheet,
    /// Embedded picture.
    Picture,
    /// Reserved block type.
    Reserved(u8),
}

impl From<u8> for MetadataBlockType {
    fn from(value: u8) -> Self {
        match value {
            0 => MetadataBlockType::StreamInfo,
            1 => MetadataBlockType::Padding,
            2 => MetadataBlockType::Application,
            3 => MetadataBlockType::SeekTable,
            4 => MetadataBlockType::VorbisComment,
            5 => MetadataBlockType::CueSheet,
            6 => MetadataBlockType::Picture,
            n => MetadataBlockType::Reserved(n),
        }
    }
}

/// Channel assignment of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelAssignment {
    /// Independently coded channels.
    Independent(u8),
    /// Channel 0 is left, channel 1 is side (left - right).
    LeftSide,
    /// Channel 0 is side (left - right), channel 1 is right.
    RightSide,
    /// Channel 0 is mid ((left + right) >> 1), channel 1 is side.
    MidSide,
}

/// Subframe prediction types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubframeType {
    /// A single value filling the whole block.
    Constant,
    /// Uncoded samples.
    Verbatim,
    /// Fixed predictor of the given order (0-4).
    Fixed(u8),
    /// Linear predictive coding of the given order (1-32).
    Lpc(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_block_type_from() {
        assert_eq!(MetadataBlockType::from(0), MetadataBlockType::StreamInfo);
        assert_eq!(MetadataBlockType::from(1), MetadataBlockType::Padding);
        assert_eq!(MetadataBlockType::from(4), MetadataBlockType::VorbisComment);
        assert_eq!(MetadataBlockType::from(6), MetadataBlockType::Picture);
        assert!(matches!(MetadataBlockType::from(127), MetadataBlockType::Reserved(127)));
    }

    #[test]
    fn test_error_categories() {
        let err = FlacError::UnexpectedMarker { got: 0x4f676753 };
        assert!(err.is_protocol());
        assert!(!err.is_assertion());
        assert!(err.to_string().contains("0x4f676753"));
        assert!(err.to_string().contains("(protocol error)"));

        let err = FlacError::ChannelsExceeded { got: 6 };
        assert!(err.is_assertion());
        assert!(!err.is_protocol());
        assert!(err.to_string().contains("(assertion failed)"));

        let err = FlacError::from(cadenza_core::Error::from(
            cadenza_core::BitstreamError::UnexpectedEnd,
        ));
        assert!(err.is_protocol());
    }
}
