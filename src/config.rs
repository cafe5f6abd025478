//! # Configuration Management
//!
//! Loads the service configuration from layered sources:
//! - Default values (built into the code, matching the reference deployment)
//! - TOML configuration file (`config.toml`, optional)
//! - Environment variables (`APP_` prefix, `__` between nested keys)
//!
//! ## Key Rust Concepts Used:
//! - **Serde**: converts between these structs and the `config` crate's value tree
//! - **Option<T>**: settings that are legitimately absent (e.g. no local model directory)
//! - **PathBuf**: owned filesystem paths
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `HOST` / `PORT` (deployment platforms)
//! 2. Environment variables (`APP_SERVER__PORT`, `APP_UPLOAD__MAX_FILE_BYTES`, ...)
//! 3. Configuration file (`config.toml`)
//! 4. Default values (the `Default` impl)

use crate::device::ExecutionProvider;
use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// 10 MiB, the ceiling for both the request body and the file part.
pub const DEFAULT_UPLOAD_LIMIT: usize = 10 * 1024 * 1024;

/// Main application configuration.
///
/// ## Sections:
/// - **server**: where to listen and how large a request body may be
/// - **upload**: the streaming ceiling and raw-upload persistence
/// - **recognizer**: static engine settings, consumed once at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub upload: UploadConfig,
    pub recognizer: RecognizerConfig,
}

/// Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Requests declaring a larger `Content-Length` are refused before any read
    pub body_limit_bytes: usize,
}

/// Upload handling settings.
///
/// ## Fields:
/// - `max_file_bytes`: streaming ceiling for the file part; collection aborts
///   as soon as the running total passes it
/// - `persist`: write each accepted upload to `dir` in the background
/// - `field_name`: only accept the multipart part with this name; when unset
///   the first part carrying a filename is the file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub max_file_bytes: usize,
    pub persist: bool,
    pub dir: PathBuf,
    pub field_name: Option<String>,
}

/// Recognition engine settings.
///
/// ## Fields:
/// - `model`: Hugging Face repository holding a Whisper checkpoint
/// - `model_dir`: local directory with `config.json`, `tokenizer.json` and
///   `model.safetensors`; when set, nothing is downloaded
/// - `sample_rate` / `feature_dim`: feature extraction parameters, checked
///   against the checkpoint at load time
/// - `num_threads`: CPU worker threads for inference
/// - `provider`: execution provider (`cpu`, `cuda`, `metal`, `auto`)
/// - `language`: ISO 639-1 hint; `None` lets the model detect it
/// - `max_decode_tokens`: upper bound on generated tokens per 30 s window
/// - `debug`: verbose engine logging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizerConfig {
    pub model: String,
    pub model_dir: Option<PathBuf>,
    pub sample_rate: u32,
    pub feature_dim: usize,
    pub num_threads: usize,
    pub provider: String,
    pub language: Option<String>,
    pub max_decode_tokens: usize,
    pub debug: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3002,
                body_limit_bytes: DEFAULT_UPLOAD_LIMIT,
            },
            upload: UploadConfig {
                max_file_bytes: DEFAULT_UPLOAD_LIMIT,
                persist: true,
                dir: PathBuf::from("uploads"),
                field_name: None,
            },
            recognizer: RecognizerConfig {
                model: "openai/whisper-tiny".to_string(),
                model_dir: None,
                sample_rate: 16000,
                feature_dim: 80,
                num_threads: 2,
                provider: "cpu".to_string(),
                language: None,
                max_decode_tokens: 224,
                debug: false,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from all sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__PORT=8080`
    /// - `APP_UPLOAD__PERSIST=false`
    /// - `APP_RECOGNIZER__MODEL_DIR=/models/whisper-base`
    /// - `HOST=127.0.0.1`, `PORT=3000`
    pub fn load() -> AppResult<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> AppResult<()> {
        if self.server.port == 0 {
            return Err(invalid("Server port cannot be 0"));
        }

        if self.server.body_limit_bytes == 0 {
            return Err(invalid("Request body limit must be greater than 0"));
        }

        if self.upload.max_file_bytes == 0 {
            return Err(invalid("Upload size limit must be greater than 0"));
        }

        // A file part can never be larger than the body that carries it.
        if self.upload.max_file_bytes > self.server.body_limit_bytes {
            return Err(invalid(format!(
                "Upload size limit ({} bytes) exceeds request body limit ({} bytes)",
                self.upload.max_file_bytes, self.server.body_limit_bytes
            )));
        }

        let recognizer = &self.recognizer;
        if recognizer.sample_rate == 0 {
            return Err(invalid("Recognizer sample rate must be greater than 0"));
        }

        if !matches!(recognizer.feature_dim, 80 | 128) {
            return Err(invalid(format!(
                "Recognizer feature_dim must be 80 or 128, got {}",
                recognizer.feature_dim
            )));
        }

        if recognizer.num_threads == 0 {
            return Err(invalid("Recognizer num_threads must be greater than 0"));
        }

        if recognizer.max_decode_tokens == 0 {
            return Err(invalid("Recognizer max_decode_tokens must be greater than 0"));
        }

        self.execution_provider()?;

        Ok(())
    }

    /// The configured provider, parsed.
    pub fn execution_provider(&self) -> AppResult<ExecutionProvider> {
        self.recognizer
            .provider
            .parse::<ExecutionProvider>()
            .map_err(AppError::ConfigError)
    }
}

fn invalid(msg: impl Into<String>) -> AppError {
    AppError::ConfigError(msg.into())
}
