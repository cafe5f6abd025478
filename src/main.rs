//! # WAV ASR Backend - Main Application Entry Point
//!
//! An HTTP service that turns one uploaded WAV file into one transcript.
//!
//! ## Application Architecture:
//! - **config**: layered configuration (defaults, `config.toml`, environment)
//! - **device**: execution provider → candle device
//! - **audio**: bounded upload collection, WAV header, PCM conversion
//! - **transcription**: the recognizer contract and the Whisper engine
//! - **handlers**: `POST /asr` and its JSON payload
//! - **storage**: background copy of each upload to disk
//! - **state / middleware / health**: shared state, request logging, metrics
//! - **error**: pipeline error taxonomy and HTTP error responses

mod audio;
mod config;
mod device;
mod error;
mod handlers;
mod health;
mod middleware;
mod state;
mod storage;
mod transcription;

use crate::config::AppConfig;
use crate::state::AppState;
use crate::transcription::{RecognitionInvoker, WhisperRecognizer};
use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Startup order:
/// 1. `.env`, configuration and logging
/// 2. Recognizer construction (fatal on failure: there is nothing to serve without it)
/// 3. Bind (fatal on failure) and serve until SIGINT/SIGTERM
#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let config = AppConfig::load()?;
    init_tracing(config.recognizer.debug);
    config.validate()?;

    info!("Starting {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);

    device::configure_cpu_threads(config.recognizer.num_threads);
    let provider = config.execution_provider()?;
    let device = device::select_device(provider);
    info!(
        "Recognition device: {} (requested {})",
        device::device_label(&device),
        provider
    );

    let recognizer = WhisperRecognizer::load(&config.recognizer, device)
        .await
        .context("failed to build the speech recognizer")?;
    let invoker = RecognitionInvoker::new(Arc::new(recognizer));
    info!("Recognizer ready: {}", invoker.describe());

    let app_state = AppState::new(config.clone(), invoker);
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(Logger::default())
            .wrap(middleware::MetricsMiddleware)
            .wrap(middleware::RequestLogging)
            .route("/", web::get().to(health::hello))
            .route("/asr", web::post().to(handlers::recognize_upload))
            .route("/health", web::get().to(health::health_check))
            .route("/metrics", web::get().to(health::detailed_metrics))
            .default_service(web::to(health::not_found))
    })
    .disable_signals()
    .bind(&bind_addr)
    .with_context(|| format!("failed to bind {}", bind_addr))?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Console logging through `tracing`.
///
/// `RUST_LOG` wins when set; otherwise the crate logs at debug, or at trace
/// when `recognizer.debug` is on.
fn init_tracing(debug: bool) {
    let default_filter = if debug {
        "wav_asr_backend=trace,actix_web=info"
    } else {
        "wav_asr_backend=debug,actix_web=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Resolves on the first SIGINT or SIGTERM.
#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(term), Ok(int)) => (term, int),
        (Err(e), _) | (_, Err(e)) => {
            error!("Failed to install signal handlers: {}", e);
            return std::future::pending().await;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM"),
        _ = sigint.recv() => info!("Received SIGINT"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
