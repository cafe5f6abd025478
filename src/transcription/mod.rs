//! # Transcription Module
//!
//! Speech-to-text for complete waveforms using Whisper models via the Candle-rs
//! framework (pure Rust, no FFI bindings to whisper.cpp).
//!
//! ## Key Components:
//! - **recognizer**: the engine contract (`SpeechRecognizer`, `DecodeStream`)
//! - **invoker**: runs one recognition per request off the I/O threads
//! - **whisper**: the Candle Whisper engine
//! - **mel**: mel filter bank generation for Whisper's front end

pub mod invoker;    // Per-request recognition on the blocking pool
pub mod mel;        // Mel filter bank
pub mod recognizer; // Engine traits and errors
#[cfg(test)]
pub mod stub;       // Deterministic engine for tests
pub mod whisper;    // Candle Whisper engine

pub use invoker::RecognitionInvoker;
pub use whisper::WhisperRecognizer;
