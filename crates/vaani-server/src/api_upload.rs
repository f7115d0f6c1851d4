//! One-shot audio upload endpoint.
//!
//! Accepts a multipart form with a recorded utterance, runs a full pipeline
//! turn, and streams the synthesized reply back in the response body. Callers
//! that only want text can read the `X-Reply-Text` header or the JSON
//! fallback bodies.

use crate::AppState;
use axum::{
    extract::{Extension, Multipart},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;
use vaani_agent::{AudioSource, TurnOutcome};

/// Spoken/returned when the upload contained nothing usable.
const UNCLEAR_MESSAGE: &str = "Mujhe theek se sunai nahin diya. Kripya dobara kahe.";

/// `POST /upload` — multipart fields:
/// - `audio` (required): the recorded utterance
/// - `sessionId` (optional): conversation to continue; a fresh one is
///   minted when absent
/// - `language` (optional): transcription language override
pub async fn upload_handler(
    Extension(state): Extension<Arc<AppState>>,
    mut multipart: Multipart,
) -> Response {
    let mut audio: Option<Vec<u8>> = None;
    let mut session_id: Option<String> = None;
    let mut language: Option<String> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(error = %err, "malformed multipart upload");
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": "malformed multipart body" })),
                )
                    .into_response();
            }
        };

        match field.name().unwrap_or("") {
            "audio" => match field.bytes().await {
                Ok(bytes) => audio = Some(bytes.to_vec()),
                Err(err) => {
                    tracing::warn!(error = %err, "failed reading audio field");
                    return (
                        StatusCode::BAD_REQUEST,
                        Json(json!({ "error": "unreadable audio field" })),
                    )
                        .into_response();
                }
            },
            "sessionId" => {
                session_id = field.text().await.ok().filter(|s| !s.trim().is_empty());
            }
            "language" => {
                language = field.text().await.ok().filter(|s| !s.trim().is_empty());
            }
            _ => {}
        }
    }

    let audio = match audio {
        Some(bytes) if !bytes.is_empty() => bytes,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "audio field is required" })),
            )
                .into_response();
        }
    };

    let session_id =
        session_id.unwrap_or_else(|| format!("upload-{}", Uuid::new_v4().simple()));
    let language = language.unwrap_or_else(|| state.config.stt.language.clone());

    let outcome = state
        .engine
        .handle_recorded_audio(&session_id, Some(AudioSource::Bytes(audio)), &language)
        .await;

    match outcome {
        TurnOutcome::RePrompt => Json(json!({
            "status": "reprompt",
            "message": UNCLEAR_MESSAGE,
        }))
        .into_response(),
        TurnOutcome::TextOnly { reply_text } => Json(json!({
            "replyText": reply_text,
            "audioUnavailable": true,
        }))
        .into_response(),
        TurnOutcome::Done {
            artifact,
            reply_text,
        } => match tokio::fs::read(&artifact.path).await {
            Ok(bytes) => {
                let mut response =
                    ([(header::CONTENT_TYPE, "audio/mpeg")], bytes).into_response();
                // Reply text rides along when it is header-representable;
                // multi-line or non-ASCII-control content is simply omitted.
                if let Ok(value) = HeaderValue::from_str(&reply_text) {
                    response.headers_mut().insert("X-Reply-Text", value);
                }
                response
            }
            Err(err) => {
                tracing::error!(error = %err, path = %artifact.path.display(), "synthesized audio unreadable");
                Json(json!({
                    "replyText": reply_text,
                    "audioUnavailable": true,
                }))
                .into_response()
            }
        },
    }
}
