//! # Audio Ingestion
//!
//! The request-scoped half of the pipeline, in data-flow order:
//!
//! - **collector**: bounded streaming accumulation of the uploaded file part
//! - **wav**: fixed-offset reader for the canonical 44-byte WAV header
//! - **pcm**: 16-bit little-endian PCM to normalized `f32` samples
//!
//! ## Audio Format Requirements:
//! - **Container**: canonical RIFF/WAVE, 44-byte header, `data` chunk last
//! - **Bit Depth**: 16-bit signed PCM, little-endian
//! - **Channels**: mono (interleaved stereo is not de-interleaved)
//! - **Sample Rate**: whatever the header declares; the engine decides if it can use it

pub mod collector; // Streaming upload buffer with a size ceiling
pub mod pcm;       // PCM16 to float conversion
pub mod wav;       // WAV header parsing
