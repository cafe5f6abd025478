//! # WAV Header Parsing
//!
//! Reads the two things the pipeline needs from a WAV file: the sample rate
//! and where the PCM payload starts.
//!
//! ## Limitation:
//! This is a fixed-offset reader for the canonical 44-byte PCM header, not a
//! RIFF chunk walker. The `RIFF`/`WAVE`/`fmt ` tags, bit depth and channel
//! count are not checked, and files with extra sub-chunks before `data`
//! (e.g. `LIST`) will have their payload start misplaced.

use crate::error::PipelineError;
use byteorder::{ByteOrder, LittleEndian};

/// Length of a canonical PCM WAV header; the payload starts right after it.
pub const CANONICAL_HEADER_LEN: usize = 44;

/// Byte offset of the little-endian `u32` sample rate in the `fmt ` chunk.
pub const SAMPLE_RATE_OFFSET: usize = 24;

/// Read-only view of the header fields the pipeline uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    pub sample_rate: u32,
    /// Where the PCM payload begins in the buffer
    pub data_offset: usize,
}

impl WavHeader {
    /// Read the header from the start of `buffer`.
    ///
    /// The length check happens before any indexing, so a short buffer is a
    /// `TruncatedHeader` error, never an out-of-bounds panic.
    pub fn read(buffer: &[u8]) -> Result<Self, PipelineError> {
        if buffer.len() < CANONICAL_HEADER_LEN {
            return Err(PipelineError::TruncatedHeader {
                len: buffer.len(),
                required: CANONICAL_HEADER_LEN,
            });
        }

        let sample_rate =
            LittleEndian::read_u32(&buffer[SAMPLE_RATE_OFFSET..SAMPLE_RATE_OFFSET + 4]);

        Ok(Self {
            sample_rate,
            data_offset: CANONICAL_HEADER_LEN,
        })
    }

    /// The PCM payload of the buffer this header was read from.
    pub fn payload<'a>(&self, buffer: &'a [u8]) -> &'a [u8] {
        &buffer[self.data_offset..]
    }
}

/// Split a complete WAV buffer into `(sample_rate, pcm_bytes)`.
pub fn parse(buffer: &[u8]) -> Result<(u32, &[u8]), PipelineError> {
    let header = WavHeader::read(buffer)?;
    Ok((header.sample_rate, header.payload(buffer)))
}

/// Build a canonical mono PCM16 WAV file. Test helper shared across modules.
#[cfg(test)]
pub fn canonical_wav(sample_rate: u32, samples: &[i16]) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let mut out = Vec::with_capacity(CANONICAL_HEADER_LEN + samples.len() * 2);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&1u16.to_le_bytes()); // mono
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * 2).to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_header_layout() {
        let wav = canonical_wav(16000, &[]);
        assert_eq!(wav.len(), CANONICAL_HEADER_LEN);
        assert_eq!(&wav[SAMPLE_RATE_OFFSET..SAMPLE_RATE_OFFSET + 4], &[0x80, 0x3E, 0x00, 0x00]);
    }

    #[test]
    fn test_parse_extracts_rate_and_payload() {
        let mut wav = canonical_wav(16000, &[]);
        wav.extend_from_slice(&[0x00, 0x40, 0x00, 0xC0]);

        let (sample_rate, pcm) = parse(&wav).unwrap();
        assert_eq!(sample_rate, 16000);
        assert_eq!(pcm, &[0x00, 0x40, 0x00, 0xC0]);
    }

    #[test]
    fn test_short_buffer_is_truncated_header() {
        let buffer = vec![0u8; 40];
        assert_eq!(
            parse(&buffer).unwrap_err(),
            PipelineError::TruncatedHeader { len: 40, required: 44 }
        );
        assert!(parse(&[]).is_err());
        assert!(parse(&[0u8; 43]).is_err());
    }

    #[test]
    fn test_header_only_has_empty_payload() {
        let wav = canonical_wav(8000, &[]);
        let (sample_rate, pcm) = parse(&wav).unwrap();
        assert_eq!(sample_rate, 8000);
        assert!(pcm.is_empty());
    }

    #[test]
    fn test_chunk_tags_are_not_validated() {
        // Only the length and the rate field matter to the fixed-offset reader.
        let mut buffer = vec![0xFFu8; 48];
        buffer[SAMPLE_RATE_OFFSET..SAMPLE_RATE_OFFSET + 4].copy_from_slice(&44100u32.to_le_bytes());
        let header = WavHeader::read(&buffer).unwrap();
        assert_eq!(header.sample_rate, 44100);
        assert_eq!(header.payload(&buffer).len(), 4);
    }
}
