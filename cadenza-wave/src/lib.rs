//! # cadenza-wave
//!
//! Uncompressed linear-PCM output in the RIFF/WAVE container.
//!
//! The encoder writes a canonical little-endian WAVE header derived from a
//! [`WaveStreamInfo`], then interleaved integer samples at 8, 16, 24 or 32
//! bits per sample.
//!
//! ## Example
//!
//! ```no_run
//! use cadenza_wave::{WaveEncoder, WaveStreamInfo};
//! use std::fs::File;
//! use std::io::BufWriter;
//!
//! let file = File::create("output.wav").unwrap();
//! let mut encoder = WaveEncoder::new(BufWriter::new(file));
//! encoder
//!     .write_header(&WaveStreamInfo {
//!         sample_rate: 44100,
//!         sample_bit_size: 16,
//!         channel_count: 2,
//!         sample_count: 44100,
//!     })
//!     .unwrap();
//! // One sample per channel per frame, channel 0 first.
//! encoder.write_sample(0).unwrap();
//! encoder.write_sample(0).unwrap();
//! ```

#![warn(missing_docs)]

mod encoder;
mod error;

pub use encoder::WaveEncoder;
pub use error::{Result, WaveError};

/// Describes the PCM stream a WAVE header is built from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WaveStreamInfo {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Bits per sample; 8, 16, 24 and 32 are encodable.
    pub sample_bit_size: u8,
    /// Number of interleaved channels.
    pub channel_count: u8,
    /// Total samples per channel; zero when unknown (header sizes then
    /// read zero).
    pub sample_count: u64,
}
