//! # Whisper Recognizer
//!
//! The production engine: a Whisper checkpoint run with Candle-rs.
//!
//! ## Loading:
//! 1. Resolve `config.json`, `tokenizer.json` and `model.safetensors`, either
//!    from `recognizer.model_dir` or from the Hugging Face hub (cached locally)
//! 2. Check the checkpoint against the configured feature settings
//! 3. Memory-map the weights onto the selected device
//! 4. Build the mel filter bank and the token suppression mask
//!
//! ## Per-request decoding:
//! Every stream clones the model handle. Weights are reference-counted
//! tensors, so the clone is cheap, while the attention KV caches become private
//! to the stream. Audio is cut into 30 s windows and decoded greedily.

use crate::config::RecognizerConfig;
use crate::device::device_label;
use crate::transcription::mel;
use crate::transcription::recognizer::{DecodeStream, RecognizerError, SpeechRecognizer};
use anyhow::{anyhow, bail, Context, Result};
use candle_core::{Device, IndexOp, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::whisper::{self as m, audio, Config};
use hf_hub::api::tokio::{Api, ApiBuilder};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokenizers::Tokenizer;

/// Multilingual checkpoints carry the language tokens; English-only ones have 51864 entries.
const MULTILINGUAL_VOCAB_SIZE: usize = 51865;

/// Read-only state shared by every stream.
struct WhisperShared {
    config: Config,
    tokenizer: Tokenizer,
    device: Device,
    mel_filters: Vec<f32>,
    /// `-inf` at suppressed token ids, `0` elsewhere; added to the logits
    suppress: Tensor,
    sot: u32,
    transcribe: u32,
    eot: u32,
    no_timestamps: u32,
    /// Fixed language token, or `None` to detect per window
    language: Option<u32>,
    language_tokens: Vec<u32>,
    max_decode_tokens: usize,
}

/// A loaded Whisper checkpoint, shared across all requests.
pub struct WhisperRecognizer {
    model: m::model::Whisper,
    shared: Arc<WhisperShared>,
    label: String,
}

/// Paths of the three files a checkpoint needs.
struct ModelFiles {
    config: PathBuf,
    tokenizer: PathBuf,
    weights: PathBuf,
}

impl ModelFiles {
    async fn resolve(cfg: &RecognizerConfig) -> Result<Self> {
        if let Some(dir) = &cfg.model_dir {
            let files = Self {
                config: dir.join("config.json"),
                tokenizer: dir.join("tokenizer.json"),
                weights: dir.join("model.safetensors"),
            };
            for path in [&files.config, &files.tokenizer, &files.weights] {
                if !path.exists() {
                    bail!("model file '{}' does not exist", path.display());
                }
            }
            tracing::info!("Using local Whisper checkpoint in {}", dir.display());
            return Ok(files);
        }

        tracing::info!("Fetching Whisper checkpoint {} from the Hugging Face hub", cfg.model);
        let repo = hub_api()?.model(cfg.model.clone());

        let config = repo
            .get("config.json")
            .await
            .with_context(|| format!("failed to fetch config.json from {}", cfg.model))?;
        let tokenizer = repo
            .get("tokenizer.json")
            .await
            .with_context(|| format!("failed to fetch tokenizer.json from {}", cfg.model))?;
        let weights = repo
            .get("model.safetensors")
            .await
            .with_context(|| format!("failed to fetch model.safetensors from {}", cfg.model))?;

        Ok(Self {
            config,
            tokenizer,
            weights,
        })
    }
}

/// Hub client honouring `HF_TOKEN`, `HF_HUB_CACHE` and `HF_HOME`.
fn hub_api() -> Result<Api> {
    let mut builder = ApiBuilder::new().with_progress(false);

    if let Ok(token) = std::env::var("HF_TOKEN") {
        builder = builder.with_token(Some(token));
    }

    if let Ok(cache_dir) = std::env::var("HF_HUB_CACHE") {
        builder = builder.with_cache_dir(cache_dir.into());
    } else if let Ok(hf_home) = std::env::var("HF_HOME") {
        builder = builder.with_cache_dir(PathBuf::from(hf_home).join("hub"));
    }

    builder.build().context("failed to initialise Hugging Face API client")
}

impl WhisperRecognizer {
    /// Load the configured checkpoint onto `device`.
    pub async fn load(cfg: &RecognizerConfig, device: Device) -> Result<Self> {
        let started = Instant::now();
        let files = ModelFiles::resolve(cfg).await?;

        let config_file = std::fs::File::open(&files.config)
            .with_context(|| format!("failed to open {}", files.config.display()))?;
        let config: Config = serde_json::from_reader(config_file)
            .with_context(|| format!("failed to parse {}", files.config.display()))?;

        if config.num_mel_bins != cfg.feature_dim {
            bail!(
                "checkpoint expects {} mel bins but feature_dim is {}",
                config.num_mel_bins,
                cfg.feature_dim
            );
        }
        if cfg.sample_rate as usize != m::SAMPLE_RATE {
            bail!(
                "Whisper features are computed at {} Hz, configured sample_rate is {}",
                m::SAMPLE_RATE,
                cfg.sample_rate
            );
        }

        let tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(|e| anyhow!("failed to load tokenizer: {}", e))?;

        let token = |name: &str| {
            tokenizer
                .token_to_id(name)
                .ok_or_else(|| anyhow!("tokenizer has no '{}' token", name))
        };
        let sot = token(m::SOT_TOKEN)?;
        let transcribe = token(m::TRANSCRIBE_TOKEN)?;
        let eot = token(m::EOT_TOKEN)?;
        let no_timestamps = token(m::NO_TIMESTAMPS_TOKEN)?;
        let language = match &cfg.language {
            Some(lang) => Some(token(&format!("<|{}|>", lang.to_lowercase()))?),
            None => None,
        };

        let language_tokens = if config.vocab_size >= MULTILINGUAL_VOCAB_SIZE {
            language_token_ids(&tokenizer)
        } else {
            Vec::new()
        };

        let suppress: Vec<f32> = (0..config.vocab_size as u32)
            .map(|id| {
                if config.suppress_tokens.contains(&id) || id == no_timestamps {
                    f32::NEG_INFINITY
                } else {
                    0.0
                }
            })
            .collect();
        let suppress = Tensor::new(suppress.as_slice(), &device)?;

        // SAFETY: the weights file is not modified while the process runs.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[&files.weights], m::DTYPE, &device)? };
        let model = m::model::Whisper::load(&vb, config.clone())?;

        let mel_filters = mel::filter_bank(m::SAMPLE_RATE, m::N_FFT, config.num_mel_bins);

        let source = match &cfg.model_dir {
            Some(dir) => dir.display().to_string(),
            None => cfg.model.clone(),
        };
        let label = format!("whisper {} on {}", source, device_label(&device));

        tracing::info!(
            "Loaded {} in {:.2}s ({} mel bins, {} language tokens)",
            label,
            started.elapsed().as_secs_f64(),
            config.num_mel_bins,
            language_tokens.len()
        );

        Ok(Self {
            model,
            shared: Arc::new(WhisperShared {
                config,
                tokenizer,
                device,
                mel_filters,
                suppress,
                sot,
                transcribe,
                eot,
                no_timestamps,
                language,
                language_tokens,
                max_decode_tokens: cfg.max_decode_tokens,
            }),
            label,
        })
    }
}

impl SpeechRecognizer for WhisperRecognizer {
    fn describe(&self) -> String {
        self.label.clone()
    }

    fn create_stream(&self) -> Result<Box<dyn DecodeStream>, RecognizerError> {
        Ok(Box::new(WhisperStream {
            model: self.model.clone(),
            shared: self.shared.clone(),
            waveform: None,
            text: None,
        }))
    }
}

/// One request's decoding context.
struct WhisperStream {
    model: m::model::Whisper,
    shared: Arc<WhisperShared>,
    waveform: Option<Vec<f32>>,
    text: Option<String>,
}

impl DecodeStream for WhisperStream {
    fn accept_waveform(&mut self, sample_rate: u32, samples: Vec<f32>) -> Result<(), RecognizerError> {
        if sample_rate as usize != m::SAMPLE_RATE {
            return Err(RecognizerError::UnsupportedSampleRate {
                sample_rate,
                expected: m::SAMPLE_RATE as u32,
            });
        }
        self.waveform = Some(samples);
        Ok(())
    }

    fn decode(&mut self) -> Result<(), RecognizerError> {
        let samples = self.waveform.take().ok_or(RecognizerError::NoWaveform)?;
        if samples.is_empty() {
            self.text = Some(String::new());
            return Ok(());
        }

        let shared = self.shared.clone();
        let n_mels = shared.config.num_mel_bins;
        let mel = audio::pcm_to_mel(&shared.config, &samples, &shared.mel_filters);
        let frames = mel.len() / n_mels;
        let mel = Tensor::from_vec(mel, (1, n_mels, frames), &shared.device)?;

        // pcm_to_mel pads the signal; only frames backed by real audio are decoded.
        let content_frames = (samples.len() / m::HOP_LENGTH).clamp(1, frames);

        let mut pieces = Vec::new();
        let mut seek = 0;
        while seek < content_frames {
            let window = (content_frames - seek).min(m::N_FRAMES);
            let segment = mel.narrow(2, seek, window)?;
            let piece = self.decode_window(&shared, &segment)?;
            if !piece.is_empty() {
                pieces.push(piece);
            }
            seek += window;
        }

        self.text = Some(pieces.join(" "));
        Ok(())
    }

    fn text(&self) -> Result<String, RecognizerError> {
        self.text.clone().ok_or(RecognizerError::NotDecoded)
    }
}

impl WhisperStream {
    /// Greedy decode of one mel window of at most 30 s.
    fn decode_window(&mut self, shared: &WhisperShared, mel: &Tensor) -> Result<String, RecognizerError> {
        let audio_features = self.model.encoder.forward(mel, true)?;

        let language = match shared.language {
            Some(token) => Some(token),
            None if !shared.language_tokens.is_empty() => {
                Some(self.detect_language(shared, &audio_features)?)
            }
            None => None,
        };

        let mut tokens = vec![shared.sot];
        if let Some(token) = language {
            tokens.push(token);
        }
        tokens.push(shared.transcribe);
        tokens.push(shared.no_timestamps);
        let prompt_len = tokens.len();

        let budget = shared
            .max_decode_tokens
            .min(shared.config.max_target_positions.saturating_sub(prompt_len));

        for step in 0..budget {
            let logits = self.next_token_logits(&tokens, &audio_features, step == 0)?;
            let logits = logits.broadcast_add(&shared.suppress)?.to_vec1::<f32>()?;
            let next = argmax(&logits, 0..logits.len() as u32);
            if next == shared.eot {
                break;
            }
            tokens.push(next);
        }

        let text = shared
            .tokenizer
            .decode(&tokens[prompt_len..], true)
            .map_err(|e| RecognizerError::Inference(format!("token decoding failed: {}", e)))?;
        Ok(text.trim().to_string())
    }

    /// Pick the most likely language token given only the start-of-transcript prompt.
    fn detect_language(&mut self, shared: &WhisperShared, audio_features: &Tensor) -> Result<u32, RecognizerError> {
        let logits = self
            .next_token_logits(&[shared.sot], audio_features, true)?
            .to_vec1::<f32>()?;
        Ok(argmax(&logits, shared.language_tokens.iter().copied()))
    }

    fn next_token_logits(&mut self, tokens: &[u32], audio_features: &Tensor, flush: bool) -> Result<Tensor, RecognizerError> {
        let tokens = Tensor::new(tokens, audio_features.device())?.unsqueeze(0)?;
        let hidden = self.model.decoder.forward(&tokens, audio_features, flush)?;
        let (_, seq_len, _) = hidden.dims3()?;
        let logits = self
            .model
            .decoder
            .final_linear(&hidden.i((..1, seq_len - 1..))?)?
            .i(0)?
            .i(0)?;
        Ok(logits)
    }
}

/// Index in `candidates` with the largest logit; `-inf` entries never win over finite ones.
fn argmax(logits: &[f32], candidates: impl IntoIterator<Item = u32>) -> u32 {
    candidates
        .into_iter()
        .filter(|&id| (id as usize) < logits.len())
        .max_by(|&a, &b| logits[a as usize].total_cmp(&logits[b as usize]))
        .unwrap_or(0)
}

/// Ids of every `<|xx|>` language token in the vocabulary.
fn language_token_ids(tokenizer: &Tokenizer) -> Vec<u32> {
    let mut ids: Vec<u32> = tokenizer
        .get_vocab(true)
        .into_iter()
        .filter(|(token, _)| is_language_token(token))
        .map(|(_, id)| id)
        .collect();
    ids.sort_unstable();
    ids
}

fn is_language_token(token: &str) -> bool {
    token
        .strip_prefix("<|")
        .and_then(|rest| rest.strip_suffix("|>"))
        .map(|code| (2..=3).contains(&code.len()) && code.chars().all(|c| c.is_ascii_lowercase()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_token_detection() {
        assert!(is_language_token("<|en|>"));
        assert!(is_language_token("<|yue|>"));
        assert!(!is_language_token("<|transcribe|>"));
        assert!(!is_language_token("<|notimestamps|>"));
        assert!(!is_language_token("<|0.00|>"));
        assert!(!is_language_token("en"));
    }

    #[test]
    fn test_argmax_respects_candidates() {
        let logits = [0.1, 5.0, f32::NEG_INFINITY, 2.0];
        assert_eq!(argmax(&logits, 0..4), 1);
        assert_eq!(argmax(&logits, [2, 3]), 3);
        assert_eq!(argmax(&logits, [9]), 0);
    }

    #[actix_web::test]
    async fn test_missing_local_checkpoint_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = crate::config::AppConfig::default().recognizer;
        cfg.model_dir = Some(dir.path().to_path_buf());

        let err = WhisperRecognizer::load(&cfg, Device::Cpu).await.err().unwrap();
        assert!(err.to_string().contains("config.json"));
    }
}
