//! FLAC decoder implementation: a pull-model state machine over a byte
//! source.
//!
//! The decode order mirrors the bitstream: marker, metadata blocks, then
//! audio frames. Each frame is parsed bit-by-bit into the decoder's
//! per-channel buffer: frame header, one subframe per channel (constant,
//! verbatim, fixed predictor, or LPC, each with partitioned Rice residuals),
//! then in-place reversal of the stereo decorrelation. CRC-8 and CRC-16
//! fields are consumed but not verified.

#![allow(clippy::needless_range_loop)]

use std::io::Read;

use cadenza_core::bitstream::BitReader;

use crate::{
    ChannelAssignment, DecoderState, FlacError, MetadataBlockType, Result, StreamInfo,
    SubframeType, DEFAULT_BUFFER_CAPACITY, MAX_CHANNEL_COUNT,
};

/// The `fLaC` stream marker as a 32-bit big-endian word.
const STREAM_MARKER: u32 = 0x664c_6143;

/// The 14-bit frame sync code, `0b11111111111110`.
const FRAME_SYNC_CODE: u16 = 0x3ffe;

/// Fixed-predictor coefficient table, one row per order.
const FIXED_PREDICTION_COEFFICIENTS: [&[i16]; 5] = [
    &[],
    &[1],
    &[2, -1],
    &[3, -3, 1],
    &[4, -6, 4, -1],
];

/// Decoded frame header fields needed past the header itself.
struct FrameHeader {
    block_size: u16,
    sample_rate: u32,
    channel_assignment: ChannelAssignment,
    sample_bit_size: u8,
}

/// A streaming FLAC decoder.
///
/// The decoder borrows nothing and buffers nothing beyond the current frame:
/// it owns a per-channel sample buffer allocated once at construction and
/// reused for every frame, plus a fixed array of 32 predictor coefficients.
/// Samples are stored as `i64` so order-32 predictors over 32-bit sources
/// cannot overflow the restoration accumulator.
///
/// The three decode operations must be called in protocol order (see
/// [`DecoderState`]); calling one outside its legal state reads the stream
/// out of phase and is a caller bug, not a detected condition.
pub struct FlacDecoder<R> {
    bits: BitReader<R>,
    state: DecoderState,
    stream_info: StreamInfo,
    capacity: usize,
    block_size: u16,
    block_sample_rate: u32,
    samples_decoded: u64,
    frames_decoded: u64,
    coefficients: [i16; 32],
    buffer: Vec<Vec<i64>>,
}

impl<R: Read> FlacDecoder<R> {
    /// Create a decoder with the default buffer capacity of 8192 samples
    /// per channel.
    pub fn new(reader: R) -> Self {
        Self::with_capacity(reader, DEFAULT_BUFFER_CAPACITY)
    }

    /// Create a decoder whose buffer holds up to `capacity` samples per
    /// channel. Streams declaring a larger maximum blocksize are rejected
    /// when STREAMINFO is parsed.
    pub fn with_capacity(reader: R, capacity: usize) -> Self {
        Self {
            bits: BitReader::new(reader),
            state: DecoderState::Init,
            stream_info: StreamInfo::default(),
            capacity,
            block_size: 0,
            block_sample_rate: 0,
            samples_decoded: 0,
            frames_decoded: 0,
            coefficients: [0; 32],
            buffer: (0..MAX_CHANNEL_COUNT).map(|_| vec![0i64; capacity]).collect(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Stream information; valid once [`state`](Self::state) is
    /// [`DecoderState::HasMetadata`] or later.
    pub fn stream_info(&self) -> &StreamInfo {
        &self.stream_info
    }

    /// Blocksize of the most recent frame, in samples per channel.
    pub fn block_size(&self) -> u16 {
        self.block_size
    }

    /// Sample rate of the most recent frame. May differ from the STREAMINFO
    /// rate; callers that cannot handle that should reject such frames.
    pub fn block_sample_rate(&self) -> u32 {
        self.block_sample_rate
    }

    /// Per-channel samples of the most recent frame.
    ///
    /// Only the first [`StreamInfo::channel_count`] rows and the first
    /// [`block_size`](Self::block_size) samples of each are meaningful. The
    /// data is valid until the next call to [`decode_audio`](Self::decode_audio).
    pub fn block_data(&self) -> &[Vec<i64>] {
        &self.buffer
    }

    /// Total samples per channel decoded so far.
    pub fn samples_decoded(&self) -> u64 {
        self.samples_decoded
    }

    /// Audio frames decoded so far.
    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    /// Read and verify the 32-bit `fLaC` stream marker.
    ///
    /// Legal in [`DecoderState::Init`]; on success the decoder moves to
    /// [`DecoderState::HasMarker`].
    pub fn decode_marker(&mut self) -> Result<()> {
        let got = self.bits.read_bits(32)?;
        if got != STREAM_MARKER {
            return Err(FlacError::UnexpectedMarker { got });
        }
        self.state = DecoderState::HasMarker;
        Ok(())
    }

    /// Read one metadata block, returning its type.
    ///
    /// Legal in [`DecoderState::HasMarker`]. STREAMINFO bodies are parsed
    /// and validated against the decoder's limits; all other bodies are
    /// skipped byte-wise. When the block's "last" flag is set the decoder
    /// moves to [`DecoderState::HasMetadata`].
    pub fn decode_metadata(&mut self) -> Result<MetadataBlockType> {
        let is_last = self.bits.read_bit()?;
        let block_type = MetadataBlockType::from(self.bits.read_bits(7)? as u8);
        let byte_size = self.bits.read_bits(24)?;

        if block_type == MetadataBlockType::StreamInfo {
            self.read_stream_info()?;
        } else {
            for _ in 0..byte_size {
                self.bits.read_u8()?;
            }
        }

        if is_last {
            self.state = DecoderState::HasMetadata;
        }
        Ok(block_type)
    }

    fn read_stream_info(&mut self) -> Result<()> {
        let info = StreamInfo {
            min_block_size: self.bits.read_bits(16)? as u16,
            max_block_size: self.bits.read_bits(16)? as u16,
            min_frame_size: self.bits.read_bits(24)?,
            max_frame_size: self.bits.read_bits(24)?,
            sample_rate: self.bits.read_bits(20)?,
            channel_count: self.bits.read_bits(3)? as u8 + 1,
            sample_bit_size: self.bits.read_bits(5)? as u8 + 1,
            sample_count: self.bits.read_bits_u64(36)?,
        };

        if usize::from(info.channel_count) > MAX_CHANNEL_COUNT {
            return Err(FlacError::ChannelsExceeded {
                got: info.channel_count,
            });
        }
        if usize::from(info.max_block_size) > self.capacity {
            return Err(FlacError::BlockSizeExceeded {
                got: u32::from(info.max_block_size),
                capacity: self.capacity,
            });
        }

        // The 128-bit MD5 signature is not captured.
        for _ in 0..16 {
            self.bits.read_u8()?;
        }

        self.stream_info = info;
        Ok(())
    }

    /// Decode one audio frame into the sample buffer.
    ///
    /// Legal in [`DecoderState::HasMetadata`] and [`DecoderState::Complete`].
    /// End of stream before a frame header is not an error: the decoder
    /// moves to [`DecoderState::Complete`] and the block accessors keep
    /// their previous contents. End of stream inside a frame surfaces as a
    /// protocol error from the bit reader.
    pub fn decode_audio(&mut self) -> Result<()> {
        if self.bits.is_eof()? {
            self.state = DecoderState::Complete;
            return Ok(());
        }

        let header = self.read_frame_header()?;
        self.block_size = header.block_size;
        self.block_sample_rate = header.sample_rate;
        let block_size = usize::from(header.block_size);

        match header.channel_assignment {
            ChannelAssignment::Independent(count) => {
                for channel in 0..usize::from(count) {
                    self.buffer[channel].resize(block_size, 0);
                    self.decode_subframe(channel, header.sample_bit_size)?;
                }
            }
            assignment => {
                // The side channel carries one extra bit of precision.
                let (extra0, extra1) = match assignment {
                    ChannelAssignment::RightSide => (1, 0),
                    _ => (0, 1),
                };
                self.buffer[0].resize(block_size, 0);
                self.decode_subframe(0, header.sample_bit_size + extra0)?;
                self.buffer[1].resize(block_size, 0);
                self.decode_subframe(1, header.sample_bit_size + extra1)?;

                match assignment {
                    ChannelAssignment::LeftSide => {
                        for i in 0..block_size {
                            self.buffer[1][i] = self.buffer[0][i] - self.buffer[1][i];
                        }
                    }
                    ChannelAssignment::RightSide => {
                        for i in 0..block_size {
                            self.buffer[0][i] += self.buffer[1][i];
                        }
                    }
                    ChannelAssignment::MidSide => {
                        for i in 0..block_size {
                            let side = self.buffer[1][i];
                            let right = self.buffer[0][i] - (side >> 1);
                            self.buffer[1][i] = right;
                            self.buffer[0][i] = right + side;
                        }
                    }
                    ChannelAssignment::Independent(_) => unreachable!(),
                }
            }
        }

        self.samples_decoded += u64::from(header.block_size);
        self.frames_decoded += 1;

        self.bits.align_to_byte();
        self.bits.read_bits(16)?; // frame footer CRC-16, not verified

        Ok(())
    }

    fn read_frame_header(&mut self) -> Result<FrameHeader> {
        let sync = self.bits.read_bits(14)? as u16;
        if sync != FRAME_SYNC_CODE {
            return Err(FlacError::UnexpectedSyncCode { got: sync });
        }
        if self.bits.read_bit()? {
            return Err(FlacError::ReservedHeaderBit(1));
        }
        // Blocking strategy: fixed- and variable-blocksize frames decode the
        // same way once the blocksize is known.
        let _blocking_strategy = self.bits.read_bit()?;

        let block_size_code = self.bits.read_bits(4)? as u8;
        let sample_rate_code = self.bits.read_bits(4)? as u8;
        let channel_code = self.bits.read_bits(4)? as u8;
        let sample_size_code = self.bits.read_bits(3)? as u8;
        if self.bits.read_bit()? {
            return Err(FlacError::ReservedHeaderBit(2));
        }

        // UTF-8-style coded frame/sample number. The leading-ones count of
        // the first byte gives the continuation length; the value itself is
        // not needed for contiguous streams.
        let first = self.bits.read_u8()?;
        for _ in 0..first.leading_ones().saturating_sub(1) {
            self.bits.read_u8()?;
        }

        let block_size = self.read_block_size(block_size_code)?;
        let sample_rate = self.read_sample_rate(sample_rate_code)?;
        let sample_bit_size = self.read_sample_bit_size(sample_size_code)?;

        let channel_assignment = match channel_code {
            0..=7 => {
                let count = channel_code + 1;
                if usize::from(count) > MAX_CHANNEL_COUNT {
                    return Err(FlacError::ChannelsExceeded { got: count });
                }
                ChannelAssignment::Independent(count)
            }
            8 => ChannelAssignment::LeftSide,
            9 => ChannelAssignment::RightSide,
            10 => ChannelAssignment::MidSide,
            code => return Err(FlacError::UnsupportedChannelAssignment(code)),
        };

        self.bits.read_bits(8)?; // frame header CRC-8, not verified

        Ok(FrameHeader {
            block_size,
            sample_rate,
            channel_assignment,
            sample_bit_size,
        })
    }

    fn read_block_size(&mut self, code: u8) -> Result<u16> {
        let samples: u32 = match code {
            1 => 192,
            2..=5 => 144 << code,
            6 => self.bits.read_bits(8)? + 1,
            7 => self.bits.read_bits(16)? + 1,
            8..=15 => 256 << (code - 8),
            _ => return Err(FlacError::ReservedBlockSizeCode(code)),
        };
        if samples as usize > self.capacity {
            return Err(FlacError::BlockSizeExceeded {
                got: samples,
                capacity: self.capacity,
            });
        }
        Ok(samples as u16)
    }

    fn read_sample_rate(&mut self, code: u8) -> Result<u32> {
        match code {
            0 => Ok(self.stream_info.sample_rate),
            1 => Ok(88_200),
            2 => Ok(176_400),
            3 => Ok(192_000),
            4 => Ok(8_000),
            5 => Ok(16_000),
            6 => Ok(22_050),
            7 => Ok(24_000),
            8 => Ok(32_000),
            9 => Ok(44_100),
            10 => Ok(48_000),
            11 => Ok(96_000),
            12 => Ok(self.bits.read_bits(8)? * 1_000),
            13 => Ok(self.bits.read_bits(16)?),
            14 => Ok(self.bits.read_bits(16)? * 10),
            _ => Err(FlacError::ReservedSampleRateCode(code)),
        }
    }

    fn read_sample_bit_size(&mut self, code: u8) -> Result<u8> {
        match code {
            0 => Ok(self.stream_info.sample_bit_size),
            1 => Ok(8),
            2 => Ok(12),
            4 => Ok(16),
            5 => Ok(20),
            6 => Ok(24),
            7 => Ok(32),
            _ => Err(FlacError::ReservedSampleSizeCode(code)),
        }
    }

    fn decode_subframe(&mut self, channel: usize, sample_bit_size: u8) -> Result<()> {
        self.bits.read_bit()?; // zero padding, not enforced
        let type_code = self.bits.read_bits(6)? as u8;

        let mut wasted_bits = 0u32;
        if self.bits.read_bit()? {
            wasted_bits = self.bits.read_unary()?;
            if wasted_bits >= u32::from(sample_bit_size) {
                return Err(FlacError::InvalidWastedBits {
                    got: wasted_bits,
                    sample_bit_size,
                });
            }
        }
        let bits_per_sample = sample_bit_size - wasted_bits as u8;

        let subframe_type = match type_code {
            0 => SubframeType::Constant,
            1 => SubframeType::Verbatim,
            8..=12 => SubframeType::Fixed(type_code - 8),
            32..=63 => SubframeType::Lpc(type_code - 31),
            _ => return Err(FlacError::ReservedSubframeType(type_code)),
        };

        match subframe_type {
            SubframeType::Constant => {
                let value = self.bits.read_signed(bits_per_sample)?;
                self.buffer[channel].fill(value);
            }
            SubframeType::Verbatim => {
                for i in 0..self.buffer[channel].len() {
                    self.buffer[channel][i] = self.bits.read_signed(bits_per_sample)?;
                }
            }
            SubframeType::Fixed(order) => self.decode_fixed(channel, order, bits_per_sample)?,
            SubframeType::Lpc(order) => self.decode_lpc(channel, order, bits_per_sample)?,
        }

        if wasted_bits > 0 {
            for sample in &mut self.buffer[channel] {
                *sample <<= wasted_bits;
            }
        }

        Ok(())
    }

    fn decode_fixed(&mut self, channel: usize, order: u8, sample_bit_size: u8) -> Result<()> {
        for i in 0..usize::from(order) {
            self.buffer[channel][i] = self.bits.read_signed(sample_bit_size)?;
        }
        self.decode_residuals(channel, order)?;
        self.restore_linear_prediction(channel, FIXED_PREDICTION_COEFFICIENTS[usize::from(order)], 0);
        Ok(())
    }

    fn decode_lpc(&mut self, channel: usize, order: u8, sample_bit_size: u8) -> Result<()> {
        for i in 0..usize::from(order) {
            self.buffer[channel][i] = self.bits.read_signed(sample_bit_size)?;
        }

        let precision = self.bits.read_bits(4)? as u8 + 1;
        let shift = self.bits.read_signed(5)? as i8;
        for i in 0..usize::from(order) {
            self.coefficients[i] = self.bits.read_signed(precision)? as i16;
        }

        self.decode_residuals(channel, order)?;
        let coefficients = self.coefficients;
        self.restore_linear_prediction(channel, &coefficients[..usize::from(order)], shift);
        Ok(())
    }

    fn decode_residuals(&mut self, channel: usize, order: u8) -> Result<()> {
        let coding_method = self.bits.read_bits(2)? as u8;
        if coding_method > 1 {
            return Err(FlacError::ReservedCodingMethod(coding_method));
        }
        let (parameter_bits, escape_code) = if coding_method == 0 {
            (4u8, 0xFu8)
        } else {
            (5u8, 0x1Fu8)
        };

        let partition_order = self.bits.read_bits(4)?;
        let partition_count = 1usize << partition_order;

        let block_size = self.buffer[channel].len();
        if block_size % partition_count != 0 {
            return Err(FlacError::InvalidPartitionCount {
                block_size,
                partitions: partition_count,
            });
        }
        let partition_size = block_size / partition_count;

        for partition in 0..partition_count {
            // Partition 0 starts past the warmup samples.
            let start = partition * partition_size
                + if partition == 0 { usize::from(order) } else { 0 };
            let end = (partition + 1) * partition_size;

            let parameter = self.bits.read_bits(parameter_bits)? as u8;
            if parameter < escape_code {
                for i in start..end {
                    self.buffer[channel][i] = rice_int(&mut self.bits, parameter)?;
                }
            } else {
                let bit_count = self.bits.read_bits(5)? as u8;
                for i in start..end {
                    self.buffer[channel][i] = self.bits.read_signed(bit_count)?;
                }
            }
        }

        Ok(())
    }

    fn restore_linear_prediction(&mut self, channel: usize, coefficients: &[i16], shift: i8) {
        let order = coefficients.len();
        let samples = &mut self.buffer[channel];
        for i in order..samples.len() {
            let mut sum = 0i64;
            for (j, &coefficient) in coefficients.iter().enumerate() {
                sum += samples[i - 1 - j] * i64::from(coefficient);
            }
            samples[i] += if shift >= 0 { sum >> shift } else { sum << -shift };
        }
    }
}

/// Read one Rice-coded signed integer: a unary quotient, `parameter`
/// remainder bits, then the folded zig-zag mapping back to signed.
fn rice_int<R: Read>(bits: &mut BitReader<R>, parameter: u8) -> Result<i64> {
    let quotient = bits.read_unary()?;
    let remainder = bits.read_bits(parameter)?;
    Ok(zigzag_decode(
        (u64::from(quotient) << parameter) | u64::from(remainder),
    ))
}

/// Map a folded zig-zag code back to a signed value.
fn zigzag_decode(value: u64) -> i64 {
    if value & 1 != 0 {
        -((value >> 1) as i64) - 1
    } else {
        (value >> 1) as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadenza_core::bitstream::BitWriter;
    use std::io::Cursor;

    fn zigzag_encode(value: i64) -> u64 {
        if value < 0 {
            (((-(value + 1)) as u64) << 1) | 1
        } else {
            (value as u64) << 1
        }
    }

    #[test]
    fn test_zigzag_decode() {
        assert_eq!(zigzag_decode(0), 0);
        assert_eq!(zigzag_decode(1), -1);
        assert_eq!(zigzag_decode(2), 1);
        assert_eq!(zigzag_decode(3), -2);
        assert_eq!(zigzag_decode(4), 2);
    }

    #[test]
    fn test_zigzag_involution() {
        for value in [
            0i64,
            1,
            -1,
            12345,
            -12345,
            i64::from(i32::MAX),
            i64::from(i32::MIN),
        ] {
            assert_eq!(zigzag_decode(zigzag_encode(value)), value, "value {}", value);
        }
    }

    #[test]
    fn test_rice_int_round_trip() {
        for parameter in [0u8, 1, 4, 14] {
            let values = [0i64, 1, -1, 7, -120, 4095, -4096];
            let mut w = BitWriter::new();
            for &value in &values {
                let folded = zigzag_encode(value);
                for _ in 0..(folded >> parameter) {
                    w.write_bit(false);
                }
                w.write_bit(true);
                w.write_bits_u64(folded & ((1u64 << parameter) - 1), parameter);
            }
            w.align_to_byte();

            let mut bits = BitReader::new(Cursor::new(w.into_data()));
            for &value in &values {
                assert_eq!(rice_int(&mut bits, parameter).unwrap(), value);
            }
        }
    }

    #[test]
    fn test_fixed_coefficients_shape() {
        for (order, coefficients) in FIXED_PREDICTION_COEFFICIENTS.iter().enumerate() {
            assert_eq!(coefficients.len(), order);
        }
    }

    #[test]
    fn test_initial_state() {
        let decoder = FlacDecoder::new(Cursor::new(Vec::<u8>::new()));
        assert_eq!(decoder.state(), DecoderState::Init);
        assert_eq!(decoder.block_size(), 0);
        assert_eq!(decoder.samples_decoded(), 0);
        assert_eq!(decoder.block_data().len(), MAX_CHANNEL_COUNT);
    }
}
