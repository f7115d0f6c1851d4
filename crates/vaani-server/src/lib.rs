//! Vaani server library logic.

pub mod api_stream;
pub mod api_telephony;
pub mod api_token;
pub mod api_upload;
pub mod config;
pub mod signature;
pub mod twiml;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Json, Router,
};
use serde_json::{json, Value};
use signature::SignatureValidator;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use vaani_agent::{SpeechToText, TurnEngine};

/// Maximum request body size (2 MiB). Webhook forms and control frames.
const MAX_REQUEST_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Upload routes need room for a full recorded utterance.
const MAX_UPLOAD_BODY_BYTES: usize = 20 * 1024 * 1024;

/// Application state shared across all request handlers.
pub struct AppState {
    /// Loaded server configuration.
    pub config: config::Config,
    /// The conversation pipeline.
    pub engine: TurnEngine,
    /// Transcription gateway, used directly by the streaming transport
    /// for per-chunk recognition.
    pub stt: Arc<dyn SpeechToText>,
    /// Webhook signature validator.
    pub validator: SignatureValidator,
}

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    // Upload route carries audio payloads and gets its own body ceiling.
    let upload_routes = Router::new()
        .route("/upload", post(api_upload::upload_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BODY_BYTES));

    let router = Router::new()
        .route("/health", get(health))
        .route("/voice", post(api_telephony::voice_handler))
        .route(
            "/process-recording",
            post(api_telephony::process_recording_handler),
        )
        .route("/client-voice", post(api_telephony::client_voice_handler))
        .route("/client-token", get(api_token::client_token_handler))
        .route("/stream", get(api_stream::stream_handler))
        .merge(upload_routes);

    // Synthesized replies are served straight from the media directory;
    // the telephony provider fetches them by public URL.
    let media_dir = state.config.media.dir.clone();
    let router = router.nest_service("/media", ServeDir::new(&media_dir));

    // Serve the demo client if one is present.
    let static_dir = state.config.server.static_dir.clone();
    let router = if std::path::Path::new(&static_dir).join("index.html").exists() {
        tracing::info!(path = %static_dir, "serving static client files");
        router.fallback_service(ServeDir::new(&static_dir))
    } else {
        tracing::debug!(path = %static_dir, "static directory not found, skipping");
        router
    };

    router
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
