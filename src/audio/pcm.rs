//! # PCM16 to Float Conversion
//!
//! Scales signed 16-bit little-endian samples from [-32768, 32767] to
//! [-1.0, 1.0) by a fixed division. No resampling, no clipping and no channel
//! handling happen here.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// Divisor mapping the i16 range onto [-1.0, 1.0).
pub const PCM16_SCALE: f32 = 32768.0;

/// Convert raw PCM16 bytes into normalized float samples.
///
/// Produces `pcm.len() / 2` samples. A trailing odd byte is not part of any
/// complete sample and is ignored.
pub fn convert(pcm: &[u8]) -> Vec<f32> {
    let mut samples = Vec::with_capacity(pcm.len() / 2);
    let mut cursor = Cursor::new(pcm);

    // read_i16 fails on a lone trailing byte, which ends the loop
    while let Ok(sample) = cursor.read_i16::<LittleEndian>() {
        samples.push(sample as f32 / PCM16_SCALE);
    }

    samples
}

/// Length in seconds of `sample_count` samples at `sample_rate`.
pub fn duration_secs(sample_count: usize, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    sample_count as f64 / sample_rate as f64
}
