//! # Application State Management
//!
//! State shared by every request handler. Almost all of it is read-only after
//! startup; only the metrics are written while requests run.
//!
//! ## Key Rust Concepts:
//!
//! ### Arc (Atomically Reference Counted)
//! - Every actix worker gets a clone of `AppState`; cloning only bumps counters
//! - The configuration and the recognizer are built once and never copied
//!
//! ### RwLock (Reader-Writer Lock)
//! - Metrics are updated by each request and read by `/health` and `/metrics`
//! - Locks are held only for the few instructions of an update
//!
//! ### Dependency injection
//! The recognizer is not a global: it arrives here from `main` and is handed
//! to the pipeline through `web::Data<AppState>`, so tests can inject a stub.

use crate::config::AppConfig;
use crate::transcription::RecognitionInvoker;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Immutable configuration loaded at startup
    pub config: Arc<AppConfig>,

    /// Shared recognizer handle (constructed once, used by every request)
    pub invoker: RecognitionInvoker,

    /// HTTP and pipeline counters
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// When the server started
    pub start_time: Instant,
}

/// Metrics collected across all requests.
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Requests answered with a 4xx/5xx status
    pub error_count: u64,

    /// Requests currently being handled
    pub in_flight: u32,

    /// Per-endpoint statistics, keyed by "METHOD /path"
    pub endpoint_metrics: HashMap<String, EndpointMetric>,

    /// Outcomes of the upload → transcript pipeline
    pub pipeline: PipelineMetrics,
}

/// Statistics for one endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

/// Counters for `POST /asr`.
///
/// Failures are counted per stable error code, since every ASR response is an
/// HTTP 200 and the endpoint error count never sees them.
#[derive(Debug, Default, Clone)]
pub struct PipelineMetrics {
    pub uploads: u64,
    pub successes: u64,
    pub failures: BTreeMap<&'static str, u64>,
    pub bytes_received: u64,
    pub audio_seconds: f64,
    pub recognition_ms: u64,
}

/// What a successful pipeline run contributes to the metrics.
#[derive(Debug, Clone, Copy)]
pub struct RecognitionStats {
    pub bytes: usize,
    pub audio_seconds: f64,
    pub recognition_ms: u64,
}

impl AppState {
    /// Bundle the startup products into the shared state.
    pub fn new(config: AppConfig, invoker: RecognitionInvoker) -> Self {
        Self {
            config: Arc::new(config),
            invoker,
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        }
    }

    /// Run `f` with exclusive access to the metrics.
    ///
    /// A poisoned lock is recovered: a panic halfway through a counter update
    /// leaves nothing worse than a slightly wrong counter.
    fn with_metrics<R>(&self, f: impl FnOnce(&mut AppMetrics) -> R) -> R {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut metrics)
    }

    /// Called by the metrics middleware when a request arrives.
    pub fn request_started(&self) {
        self.with_metrics(|m| {
            m.request_count += 1;
            m.in_flight += 1;
        });
    }

    /// Called by the metrics middleware when the response is ready.
    pub fn request_finished(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        self.with_metrics(|m| {
            m.in_flight = m.in_flight.saturating_sub(1);
            if is_error {
                m.error_count += 1;
            }

            let endpoint_metric = m.endpoint_metrics.entry(endpoint.to_string()).or_default();
            endpoint_metric.request_count += 1;
            endpoint_metric.total_duration_ms += duration_ms;
            if is_error {
                endpoint_metric.error_count += 1;
            }
        });
    }

    /// Record a transcript delivered to the client.
    pub fn record_recognition(&self, stats: RecognitionStats) {
        self.with_metrics(|m| {
            let p = &mut m.pipeline;
            p.uploads += 1;
            p.successes += 1;
            p.bytes_received += stats.bytes as u64;
            p.audio_seconds += stats.audio_seconds;
            p.recognition_ms += stats.recognition_ms;
        });
    }

    /// Record a failed upload under its error code.
    pub fn record_failure(&self, code: &'static str) {
        self.with_metrics(|m| {
            m.pipeline.uploads += 1;
            *m.pipeline.failures.entry(code).or_default() += 1;
        });
    }

    /// Consistent copy of the metrics, taken under the read lock.
    pub fn metrics_snapshot(&self) -> AppMetrics {
        self.metrics.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

impl PipelineMetrics {
    pub fn failure_count(&self) -> u64 {
        self.failures.values().sum()
    }
}

/// Test fixture: state backed by the stub recognizer.
#[cfg(test)]
pub fn test_state(config: AppConfig) -> AppState {
    use crate::transcription::stub::StubRecognizer;
    AppState::new(config, RecognitionInvoker::new(Arc::new(StubRecognizer::new("stub text"))))
}
