//! # `POST /asr`
//!
//! One request walks through these stages, each logged at debug:
//!
//! ```text
//! Receiving → Collected → Parsed → Converted → Recognized → Responded
//! ```
//!
//! Any stage may fail; the failure skips straight to `Responded`. The HTTP
//! status is 200 either way, and the outcome lives in the JSON `success` flag.

use crate::audio::{collector, pcm, wav};
use crate::config::UploadConfig;
use crate::error::PipelineError;
use crate::handlers::response;
use crate::middleware::RequestId;
use crate::state::{AppState, RecognitionStats};
use crate::storage;
use actix_multipart::{Field, Multipart};
use actix_web::{
    error::PayloadError,
    http::header::{self, HeaderMap},
    web::{self, Bytes},
    HttpMessage, HttpRequest, HttpResponse,
};
use futures_util::{Stream, StreamExt};
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Receiving,
    Collected,
    Parsed,
    Converted,
    Recognized,
    Responded,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Receiving => "receiving",
            Stage::Collected => "collected",
            Stage::Parsed => "parsed",
            Stage::Converted => "converted",
            Stage::Recognized => "recognized",
            Stage::Responded => "responded",
        };
        f.write_str(name)
    }
}

struct Recognized {
    text: String,
    stats: RecognitionStats,
}

/// Running count of request body bytes handed to the multipart parser.
///
/// Every part is metered, including form fields skipped before the file, so
/// the body limit holds for chunked requests without a `Content-Length`.
#[derive(Clone)]
struct BodyMeter {
    limit: usize,
    seen: Rc<Cell<usize>>,
}

impl BodyMeter {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            seen: Rc::new(Cell::new(0)),
        }
    }

    /// Pass `body` through, failing with `Overflow` once past the limit.
    fn wrap<S>(&self, body: S) -> impl Stream<Item = Result<Bytes, PayloadError>> + 'static
    where
        S: Stream<Item = Result<Bytes, PayloadError>> + 'static,
    {
        let meter = self.clone();
        body.map(move |chunk| {
            let chunk = chunk?;
            meter.seen.set(meter.seen.get() + chunk.len());
            if meter.exceeded() {
                Err(PayloadError::Overflow)
            } else {
                Ok(chunk)
            }
        })
    }

    fn exceeded(&self) -> bool {
        self.seen.get() > self.limit
    }

    /// The multipart parser reports the overflow as a stream failure; name it.
    fn attribute(&self, err: PipelineError) -> PipelineError {
        match err {
            PipelineError::Internal(_) if self.exceeded() => PipelineError::PayloadTooLarge {
                limit: self.limit,
                received: self.seen.get(),
            },
            other => other,
        }
    }
}

/// Transcribe one uploaded WAV file.
pub async fn recognize_upload(
    req: HttpRequest,
    payload: web::Payload,
    state: web::Data<AppState>,
) -> HttpResponse {
    let request_id = req
        .extensions()
        .get::<RequestId>()
        .map(ToString::to_string)
        .unwrap_or_default();
    let span = info_span!("asr", request_id = %request_id);

    async move {
        let outcome = run_pipeline(req.headers(), payload, &state).await;

        match &outcome {
            Ok(recognized) => {
                state.record_recognition(recognized.stats);
                info!(
                    text = %recognized.text,
                    audio_seconds = recognized.stats.audio_seconds,
                    recognition_ms = recognized.stats.recognition_ms,
                    "ASR result"
                );
            }
            Err(err) => {
                state.record_failure(err.code());
                match err {
                    PipelineError::Internal(_) => error!(code = err.code(), "ASR failed: {}", err),
                    _ => warn!(code = err.code(), "ASR rejected: {}", err),
                }
            }
        }

        let body = response::build(outcome.map(|recognized| recognized.text));
        debug!(stage = %Stage::Responded, success = body.is_success());
        HttpResponse::Ok().json(body)
    }
    .instrument(span)
    .await
}

async fn run_pipeline<S>(
    headers: &HeaderMap,
    body: S,
    state: &AppState,
) -> Result<Recognized, PipelineError>
where
    S: Stream<Item = Result<Bytes, PayloadError>> + 'static,
{
    let upload = &state.config.upload;
    let body_limit = state.config.server.body_limit_bytes;

    debug!(stage = %Stage::Receiving);
    check_declared_length(headers, body_limit)?;

    let meter = BodyMeter::new(body_limit);
    let mut payload = Multipart::new(headers, meter.wrap(body));
    let bytes = receive_file(&mut payload, upload)
        .await
        .map_err(|err| meter.attribute(err))?;
    debug!(stage = %Stage::Collected, bytes = bytes.len());

    if upload.persist {
        storage::spawn_persist(upload.dir.clone(), bytes.clone());
    }

    let (sample_rate, pcm_bytes) = wav::parse(&bytes)?;
    debug!(stage = %Stage::Parsed, sample_rate, pcm_bytes = pcm_bytes.len());

    let samples = pcm::convert(pcm_bytes);
    let audio_seconds = pcm::duration_secs(samples.len(), sample_rate);
    debug!(stage = %Stage::Converted, samples = samples.len(), audio_seconds);

    let started = Instant::now();
    let text = state.invoker.recognize(sample_rate, samples).await?;
    let recognition_ms = started.elapsed().as_millis() as u64;
    debug!(stage = %Stage::Recognized, recognition_ms);

    Ok(Recognized {
        text,
        stats: RecognitionStats {
            bytes: bytes.len(),
            audio_seconds,
            recognition_ms,
        },
    })
}

/// Find the file part and collect it under the file ceiling.
async fn receive_file(
    payload: &mut Multipart,
    upload: &UploadConfig,
) -> Result<Bytes, PipelineError> {
    let field = next_file_field(payload, upload.field_name.as_deref())
        .await?
        .ok_or(PipelineError::EmptyUpload)?;
    collector::collect(field, upload.max_file_bytes).await
}

/// Refuse a request whose declared size is already over the body limit.
fn check_declared_length(headers: &HeaderMap, limit: usize) -> Result<(), PipelineError> {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());

    match declared {
        Some(received) if received > limit => {
            Err(PipelineError::PayloadTooLarge { limit, received })
        }
        _ => Ok(()),
    }
}

/// Advance to the part holding the audio file, skipping over form fields.
async fn next_file_field(
    payload: &mut Multipart,
    wanted: Option<&str>,
) -> Result<Option<Field>, PipelineError> {
    while let Some(field) = payload.next().await {
        let mut field = field.map_err(malformed)?;
        if is_audio_part(&field, wanted) {
            return Ok(Some(field));
        }
        while let Some(chunk) = field.next().await {
            chunk.map_err(malformed)?;
        }
    }
    Ok(None)
}

fn is_audio_part(field: &Field, wanted: Option<&str>) -> bool {
    let Some(disposition) = field.content_disposition() else {
        return false;
    };
    match wanted {
        Some(name) => disposition.get_name() == Some(name),
        None => disposition.get_filename().is_some(),
    }
}

fn malformed(err: actix_multipart::MultipartError) -> PipelineError {
    PipelineError::Internal(format!("malformed multipart body: {}", err))
}
