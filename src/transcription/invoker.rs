//! # Recognition Invoker
//!
//! Runs one recognition per request against the shared engine. Decoding is
//! CPU-bound, so it is moved onto actix's blocking thread pool and the I/O
//! workers keep serving other uploads in the meantime.

use crate::error::PipelineError;
use crate::transcription::recognizer::SpeechRecognizer;
use actix_web::web;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

/// Handle to the shared recognizer, injected into every request through `AppState`.
///
/// ## Thread Safety:
/// - The recognizer is `Send + Sync` and shared through an `Arc`
/// - Each call gets its own `DecodeStream`; nothing from one request's
///   decoding is visible to another
/// - If the engine reports that stream creation is not thread-safe, creation
///   is guarded by a mutex (decoding is not)
#[derive(Clone)]
pub struct RecognitionInvoker {
    recognizer: Arc<dyn SpeechRecognizer>,
    creation_lock: Option<Arc<Mutex<()>>>,
}

impl RecognitionInvoker {
    pub fn new(recognizer: Arc<dyn SpeechRecognizer>) -> Self {
        let creation_lock = if recognizer.supports_concurrent_streams() {
            None
        } else {
            Some(Arc::new(Mutex::new(())))
        };

        Self {
            recognizer,
            creation_lock,
        }
    }

    /// Description of the underlying engine.
    pub fn describe(&self) -> String {
        self.recognizer.describe()
    }

    /// Transcribe one complete waveform.
    ///
    /// ## Errors:
    /// - Any engine error → `RecognitionFailure`
    /// - The blocking task panicked or was cancelled → `Internal`
    pub async fn recognize(
        &self,
        sample_rate: u32,
        samples: Vec<f32>,
    ) -> Result<String, PipelineError> {
        let recognizer = self.recognizer.clone();
        let creation_lock = self.creation_lock.clone();

        web::block(move || {
            recognize_blocking(recognizer.as_ref(), creation_lock.as_deref(), sample_rate, samples)
        })
        .await
        .map_err(|e| PipelineError::Internal(format!("recognition worker failed: {}", e)))?
    }
}

fn recognize_blocking(
    recognizer: &dyn SpeechRecognizer,
    creation_lock: Option<&Mutex<()>>,
    sample_rate: u32,
    samples: Vec<f32>,
) -> Result<String, PipelineError> {
    let started = Instant::now();
    let sample_count = samples.len();

    let mut stream = {
        // A poisoned lock only means another creation panicked; the () it guards is fine.
        let _guard = creation_lock.map(|lock| lock.lock().unwrap_or_else(PoisonError::into_inner));
        recognizer.create_stream()?
    };

    stream.accept_waveform(sample_rate, samples)?;
    stream.decode()?;
    let text = stream.text()?;

    tracing::debug!(
        sample_rate,
        samples = sample_count,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Recognition finished"
    );

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcription::stub::StubRecognizer;
    use futures_util::future::join_all;

    #[actix_web::test]
    async fn test_recognize_returns_engine_text() {
        let stub = Arc::new(StubRecognizer::new("hello"));
        let invoker = RecognitionInvoker::new(stub.clone());

        let text = invoker.recognize(16000, vec![0.5, -0.5]).await.unwrap();
        assert_eq!(text, "hello [2 samples @ 16000 Hz]");
        assert_eq!(stub.streams_created(), 1);
    }

    #[actix_web::test]
    async fn test_engine_failure_becomes_recognition_failure() {
        let invoker = RecognitionInvoker::new(Arc::new(StubRecognizer::failing()));

        let err = invoker.recognize(16000, vec![0.0; 8]).await.unwrap_err();
        assert_eq!(err.code(), "recognition_failure");
        assert!(err.to_string().contains("stub decoder failure"));
    }

    #[actix_web::test]
    async fn test_concurrent_requests_get_independent_streams() {
        for concurrent in [true, false] {
            let stub = Arc::new(StubRecognizer::new("utt").with_concurrent_streams(concurrent));
            let invoker = RecognitionInvoker::new(stub.clone());

            let calls = (1..=8).map(|n| {
                let invoker = invoker.clone();
                async move { (n, invoker.recognize(8000, vec![0.1; n]).await) }
            });

            for (n, result) in join_all(calls).await {
                assert_eq!(result.unwrap(), format!("utt [{} samples @ 8000 Hz]", n));
            }
            assert_eq!(stub.streams_created(), 8);
        }
    }
}
