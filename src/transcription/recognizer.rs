//! # Recognition Engine Contract
//!
//! The pipeline talks to the speech engine through two object-safe traits
//! that mirror the engine's call sequence:
//!
//! 1. `SpeechRecognizer::create_stream` makes a fresh decoding context
//! 2. `DecodeStream::accept_waveform` feeds it the whole utterance at once
//! 3. `DecodeStream::decode` runs decoding to completion
//! 4. `DecodeStream::text` reads the transcript back
//!
//! The recognizer itself is built once at startup and shared by every request;
//! streams belong to exactly one request and are dropped with it.

use crate::error::PipelineError;
use thiserror::Error;

/// Errors raised by an engine while decoding.
#[derive(Debug, Error)]
pub enum RecognizerError {
    #[error("unsupported sample rate {sample_rate} Hz (engine expects {expected} Hz)")]
    UnsupportedSampleRate { sample_rate: u32, expected: u32 },
    #[error("no waveform was accepted before decoding")]
    NoWaveform,
    #[error("stream has not been decoded yet")]
    NotDecoded,
    #[error("inference failed: {0}")]
    Inference(String),
}

impl From<candle_core::Error> for RecognizerError {
    fn from(err: candle_core::Error) -> Self {
        RecognizerError::Inference(err.to_string())
    }
}

impl From<RecognizerError> for PipelineError {
    fn from(err: RecognizerError) -> Self {
        PipelineError::RecognitionFailure(err.to_string())
    }
}

/// One request's decoding context.
pub trait DecodeStream: Send {
    /// Hand over the complete waveform. Called once per stream.
    fn accept_waveform(&mut self, sample_rate: u32, samples: Vec<f32>)
        -> Result<(), RecognizerError>;

    /// Decode everything accepted so far. Blocking, CPU-bound.
    fn decode(&mut self) -> Result<(), RecognizerError>;

    /// The transcript produced by `decode`.
    fn text(&self) -> Result<String, RecognizerError>;
}

/// A process-wide speech engine.
pub trait SpeechRecognizer: Send + Sync {
    /// Short human-readable description (model, device) for logs and health output.
    fn describe(&self) -> String;

    /// Whether `create_stream` may be called from several threads at once.
    ///
    /// When this returns `false` the invoker serializes stream creation;
    /// decoding itself still runs in parallel.
    fn supports_concurrent_streams(&self) -> bool {
        true
    }

    /// Allocate a fresh decoding context that shares no mutable state with
    /// any other stream.
    fn create_stream(&self) -> Result<Box<dyn DecodeStream>, RecognizerError>;
}
