//! Deterministic in-process recognizer for tests.

use crate::transcription::recognizer::{DecodeStream, RecognizerError, SpeechRecognizer};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Every `(sample_rate, samples)` pair handed to a stream, in arrival order.
type Received = Arc<Mutex<Vec<(u32, Vec<f32>)>>>;

/// Answers every stream with `"<transcript> [<n> samples @ <rate> Hz]"`, so a
/// test can tell which waveform a transcript came from.
pub struct StubRecognizer {
    transcript: String,
    fail_decode: bool,
    concurrent: bool,
    streams_created: AtomicUsize,
    received: Received,
}

impl StubRecognizer {
    pub fn new(transcript: &str) -> Self {
        Self {
            transcript: transcript.to_string(),
            fail_decode: false,
            concurrent: true,
            streams_created: AtomicUsize::new(0),
            received: Received::default(),
        }
    }

    /// A recognizer whose decode step always errors.
    pub fn failing() -> Self {
        Self {
            fail_decode: true,
            ..Self::new("")
        }
    }

    pub fn with_concurrent_streams(mut self, concurrent: bool) -> Self {
        self.concurrent = concurrent;
        self
    }

    pub fn streams_created(&self) -> usize {
        self.streams_created.load(Ordering::SeqCst)
    }

    /// Waveforms the engine was fed, across all streams.
    pub fn received(&self) -> Vec<(u32, Vec<f32>)> {
        self.received.lock().unwrap().clone()
    }
}

impl SpeechRecognizer for StubRecognizer {
    fn describe(&self) -> String {
        "stub".to_string()
    }

    fn supports_concurrent_streams(&self) -> bool {
        self.concurrent
    }

    fn create_stream(&self) -> Result<Box<dyn DecodeStream>, RecognizerError> {
        self.streams_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubStream {
            transcript: self.transcript.clone(),
            fail_decode: self.fail_decode,
            received: self.received.clone(),
            waveform: None,
            text: None,
        }))
    }
}

struct StubStream {
    transcript: String,
    fail_decode: bool,
    received: Received,
    waveform: Option<(u32, Vec<f32>)>,
    text: Option<String>,
}

impl DecodeStream for StubStream {
    fn accept_waveform(&mut self, sample_rate: u32, samples: Vec<f32>) -> Result<(), RecognizerError> {
        self.received.lock().unwrap().push((sample_rate, samples.clone()));
        self.waveform = Some((sample_rate, samples));
        Ok(())
    }

    fn decode(&mut self) -> Result<(), RecognizerError> {
        if self.fail_decode {
            return Err(RecognizerError::Inference("stub decoder failure".to_string()));
        }
        let (sample_rate, samples) = self.waveform.take().ok_or(RecognizerError::NoWaveform)?;
        self.text = Some(format!(
            "{} [{} samples @ {} Hz]",
            self.transcript,
            samples.len(),
            sample_rate
        ));
        Ok(())
    }

    fn text(&self) -> Result<String, RecognizerError> {
        self.text.clone().ok_or(RecognizerError::NotDecoded)
    }
}
