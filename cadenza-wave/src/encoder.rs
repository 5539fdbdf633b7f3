//! WAVE encoder implementation.

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::error::{Result, WaveError};
use crate::WaveStreamInfo;

/// Bytes of the RIFF chunk that are not audio payload: the `WAVE` tag plus
/// the complete `fmt ` and `data` chunk headers.
const RIFF_OVERHEAD: u32 = 4 + 8 + 16 + 8;

/// WAVE encoder writing a canonical RIFF header followed by interleaved
/// little-endian PCM samples.
#[derive(Debug)]
pub struct WaveEncoder<W> {
    writer: W,
    stream_info: WaveStreamInfo,
    samples_written: u64,
}

impl<W: Write> WaveEncoder<W> {
    /// Create an encoder over a byte sink. Nothing is written until
    /// [`write_header`](Self::write_header).
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            stream_info: WaveStreamInfo::default(),
            samples_written: 0,
        }
    }

    /// Write the RIFF/WAVE header for `info`.
    ///
    /// Must be called once, before any samples. Chunk sizes are derived
    /// from `info.sample_count`, in bytes; a stream of unknown length
    /// (zero) produces zero-valued sizes.
    pub fn write_header(&mut self, info: &WaveStreamInfo) -> Result<()> {
        if !matches!(info.sample_bit_size, 8 | 16 | 24 | 32) {
            return Err(WaveError::UnsupportedBitSize(info.sample_bit_size));
        }

        let bytes_per_sample = u32::from(info.sample_bit_size) / 8;
        let frame_size = bytes_per_sample * u32::from(info.channel_count);
        let byte_rate = frame_size * info.sample_rate;
        let data_size = (u64::from(info.channel_count)
            * info.sample_count
            * u64::from(bytes_per_sample)) as u32;

        self.writer.write_all(b"RIFF")?;
        self.writer.write_u32::<LittleEndian>(RIFF_OVERHEAD + data_size)?;
        self.writer.write_all(b"WAVE")?;

        self.writer.write_all(b"fmt ")?;
        self.writer.write_u32::<LittleEndian>(16)?;
        self.writer.write_u16::<LittleEndian>(1)?; // PCM format code
        self.writer.write_u16::<LittleEndian>(u16::from(info.channel_count))?;
        self.writer.write_u32::<LittleEndian>(info.sample_rate)?;
        self.writer.write_u32::<LittleEndian>(byte_rate)?;
        self.writer.write_u16::<LittleEndian>(frame_size as u16)?;
        self.writer.write_u16::<LittleEndian>(u16::from(info.sample_bit_size))?;

        self.writer.write_all(b"data")?;
        self.writer.write_u32::<LittleEndian>(data_size)?;

        self.stream_info = *info;
        Ok(())
    }

    /// Write one sample at the header's bit depth, little-endian.
    ///
    /// Interleaving is the caller's concern: within each frame, emit
    /// channel 0's sample first.
    pub fn write_sample(&mut self, sample: i32) -> Result<()> {
        match self.stream_info.sample_bit_size {
            8 => self.writer.write_i8(sample as i8)?,
            16 => self.writer.write_i16::<LittleEndian>(sample as i16)?,
            24 => self.writer.write_i24::<LittleEndian>(sample)?,
            32 => self.writer.write_i32::<LittleEndian>(sample)?,
            other => return Err(WaveError::UnsupportedBitSize(other)),
        }
        self.samples_written += 1;
        Ok(())
    }

    /// Samples written so far, across all channels.
    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }

    /// Flush the sink and hand the writer back.
    pub fn finish(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::ByteOrder;

    fn encoder_with_header(info: WaveStreamInfo) -> WaveEncoder<Vec<u8>> {
        let mut encoder = WaveEncoder::new(Vec::new());
        encoder.write_header(&info).unwrap();
        encoder
    }

    #[test]
    fn test_header_layout() {
        let encoder = encoder_with_header(WaveStreamInfo {
            sample_rate: 44100,
            sample_bit_size: 16,
            channel_count: 2,
            sample_count: 1000,
        });
        let data = encoder.finish().unwrap();
        assert_eq!(data.len(), 44);

        assert_eq!(&data[0..4], b"RIFF");
        // data payload: 2 channels x 1000 samples x 2 bytes
        assert_eq!(LittleEndian::read_u32(&data[4..8]), 36 + 4000);
        assert_eq!(&data[8..12], b"WAVE");

        assert_eq!(&data[12..16], b"fmt ");
        assert_eq!(LittleEndian::read_u32(&data[16..20]), 16);
        assert_eq!(LittleEndian::read_u16(&data[20..22]), 1);
        assert_eq!(LittleEndian::read_u16(&data[22..24]), 2);
        assert_eq!(LittleEndian::read_u32(&data[24..28]), 44100);
        assert_eq!(LittleEndian::read_u32(&data[28..32]), 44100 * 4);
        assert_eq!(LittleEndian::read_u16(&data[32..34]), 4);
        assert_eq!(LittleEndian::read_u16(&data[34..36]), 16);

        assert_eq!(&data[36..40], b"data");
        assert_eq!(LittleEndian::read_u32(&data[40..44]), 4000);
    }

    #[test]
    fn test_header_unknown_length() {
        let encoder = encoder_with_header(WaveStreamInfo {
            sample_rate: 48000,
            sample_bit_size: 24,
            channel_count: 1,
            sample_count: 0,
        });
        let data = encoder.finish().unwrap();
        assert_eq!(LittleEndian::read_u32(&data[4..8]), 36);
        assert_eq!(LittleEndian::read_u32(&data[40..44]), 0);
    }

    #[test]
    fn test_header_rejects_odd_widths() {
        let mut encoder = WaveEncoder::new(Vec::new());
        for bits in [0u8, 4, 12, 20, 33] {
            let result = encoder.write_header(&WaveStreamInfo {
                sample_rate: 44100,
                sample_bit_size: bits,
                channel_count: 1,
                sample_count: 0,
            });
            assert!(
                matches!(result, Err(WaveError::UnsupportedBitSize(b)) if b == bits),
                "width {} must be rejected",
                bits
            );
        }
    }

    #[test]
    fn test_sample_widths() {
        let mut encoder = encoder_with_header(WaveStreamInfo {
            sample_rate: 8000,
            sample_bit_size: 8,
            channel_count: 1,
            sample_count: 1,
        });
        encoder.write_sample(-1).unwrap();
        assert_eq!(encoder.finish().unwrap()[44..], [0xFF]);

        let mut encoder = encoder_with_header(WaveStreamInfo {
            sample_rate: 8000,
            sample_bit_size: 16,
            channel_count: 1,
            sample_count: 1,
        });
        encoder.write_sample(-2).unwrap();
        assert_eq!(encoder.finish().unwrap()[44..], [0xFE, 0xFF]);

        let mut encoder = encoder_with_header(WaveStreamInfo {
            sample_rate: 8000,
            sample_bit_size: 24,
            channel_count: 1,
            sample_count: 1,
        });
        encoder.write_sample(0x0123_45).unwrap();
        assert_eq!(encoder.finish().unwrap()[44..], [0x45, 0x23, 0x01]);

        let mut encoder = encoder_with_header(WaveStreamInfo {
            sample_rate: 8000,
            sample_bit_size: 32,
            channel_count: 1,
            sample_count: 1,
        });
        encoder.write_sample(0x0123_4567).unwrap();
        assert_eq!(encoder.finish().unwrap()[44..], [0x67, 0x45, 0x23, 0x01]);
    }

    #[test]
    fn test_samples_written_counter() {
        let mut encoder = encoder_with_header(WaveStreamInfo {
            sample_rate: 8000,
            sample_bit_size: 16,
            channel_count: 2,
            sample_count: 2,
        });
        assert_eq!(encoder.samples_written(), 0);
        for _ in 0..4 {
            encoder.write_sample(0).unwrap();
        }
        assert_eq!(encoder.samples_written(), 4);
    }

    #[test]
    fn test_write_sample_without_header() {
        let mut encoder = WaveEncoder::new(Vec::new());
        assert!(matches!(
            encoder.write_sample(0),
            Err(WaveError::UnsupportedBitSize(0))
        ));
    }
}
