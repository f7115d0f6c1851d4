//! Vaani server binary — the entry point for the voice agent.
//!
//! Starts an axum HTTP server with structured logging, wires the
//! transcription, generation, synthesis, and history components selected by
//! configuration, and shuts down gracefully on SIGTERM/SIGINT.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use vaani_agent::{
    HistoryStore, LlmBackend, LlmClient, RestKv, SpeechToText, TtsBackend, TtsClient, TurnEngine,
    WhisperTranscriber,
};
use vaani_server::config::{self, Config, LlmProvider, TtsProvider};
use vaani_server::signature::SignatureValidator;
use vaani_server::{app, AppState};

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("VAANI_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

/// Builds the shared application state from configuration. Backend choices
/// are fixed here at startup; handlers never re-select providers.
fn build_state(config: Config) -> AppState {
    let history = match (&config.history.redis_url, &config.history.redis_token) {
        (Some(url), Some(token)) => HistoryStore::new(
            Arc::new(RestKv::new(url.clone(), token.clone())),
            config.history.max_messages,
            config.history.ttl_seconds,
        ),
        _ => {
            tracing::warn!("no history store configured, sessions run stateless");
            HistoryStore::disabled()
        }
    };

    let stt: Arc<dyn SpeechToText> = Arc::new(WhisperTranscriber::new(
        &config.stt.binary,
        &config.stt.model,
    ));

    let generator = match config.llm.provider {
        LlmProvider::Gemini => LlmClient::new(LlmBackend::Gemini {
            api_key: config.llm.gemini_api_key.clone(),
            model: config.llm.gemini_model.clone(),
        }),
        LlmProvider::Grok => LlmClient::new(LlmBackend::Grok {
            api_key: config.llm.grok_api_key.clone(),
            model: config.llm.grok_model.clone(),
        }),
    };

    let synthesizer = match config.tts.provider {
        TtsProvider::Edge => TtsClient::new(
            TtsBackend::Edge {
                binary_path: config.tts.edge_binary.clone().into(),
                voice: config.tts.edge_voice.clone(),
            },
            &config.media.dir,
        ),
        TtsProvider::Elevenlabs => TtsClient::new(
            TtsBackend::ElevenLabs {
                api_key: config.tts.elevenlabs_api_key.clone(),
                voice_id: config.tts.elevenlabs_voice_id.clone(),
            },
            &config.media.dir,
        ),
    };

    let engine = TurnEngine::new(
        history,
        Arc::clone(&stt),
        Arc::new(generator),
        Arc::new(synthesizer),
    );

    let validator = SignatureValidator::new(
        config.telephony.auth_token.clone(),
        config.telephony.validate_signatures,
    );

    AppState {
        config,
        engine,
        stt,
        validator,
    }
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration — the server cannot start without valid config");

    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    if config.telephony.validate_signatures && config.telephony.auth_token.is_none() {
        tracing::warn!(
            "signature validation is on but no auth token is configured; \
             all telephony webhooks will be rejected"
        );
    }

    // Synthesized replies land here; the provider fetches them over /media.
    std::fs::create_dir_all(&config.media.dir)
        .expect("failed to create media directory — check media.dir in config");

    let addr = SocketAddr::new(config.server.host, config.server.port);
    let app = app(build_state(config));

    tracing::info!(%addr, "starting vaani server");

    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind to address — is another process using this port?");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("vaani server shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
