//! Streaming speech endpoint.
//!
//! Browsers open a WebSocket, push base64 audio chunks as they record, and
//! receive partial transcripts while speaking. Chunks below the noise
//! threshold are discarded outright; qualifying chunks are transcribed
//! immediately and the running transcript echoed back. A `flush` frame
//! closes out the utterance and runs a full pipeline turn over the
//! accumulated text. Each connection owns its own partial-transcript
//! buffer; nothing about an in-flight utterance outlives the socket.

use crate::AppState;
use axum::{
    extract::ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
    extract::Extension,
    response::Response,
};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use vaani_agent::{PartialBuffer, TurnOutcome, MIN_CHUNK_BYTES};

/// Frames the client sends.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame {
    Start {
        #[serde(rename = "sessionId")]
        session_id: Option<String>,
        language: Option<String>,
    },
    Audio {
        data: String,
    },
    Flush,
    Stop,
}

/// Frames the server sends.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerFrame {
    Ready {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    Partial {
        text: String,
    },
    Info {
        message: String,
    },
    ReplyAudioUrl {
        url: String,
        text: String,
    },
    ReplyText {
        text: String,
    },
}

/// `GET /stream` — upgrades to the streaming protocol.
pub async fn stream_handler(
    Extension(state): Extension<Arc<AppState>>,
    upgrade: WebSocketUpgrade,
) -> Response {
    upgrade.on_upgrade(move |socket| run_connection(socket, state))
}

async fn send_frame(socket: &mut WebSocket, frame: &ServerFrame) -> bool {
    let text = match serde_json::to_string(frame) {
        Ok(text) => text,
        Err(err) => {
            tracing::error!(error = %err, "unserializable stream frame");
            return false;
        }
    };
    socket
        .send(Message::Text(Utf8Bytes::from(text)))
        .await
        .is_ok()
}

async fn run_connection(mut socket: WebSocket, state: Arc<AppState>) {
    let mut session_id = format!("stream-{}", Uuid::new_v4().simple());
    let mut language = state.config.stt.language.clone();
    let mut transcript = PartialBuffer::new();
    let mut started = false;

    while let Some(message) = socket.recv().await {
        let message = match message {
            Ok(message) => message,
            Err(_) => break,
        };

        let frame = match message {
            Message::Text(text) => match serde_json::from_str::<ClientFrame>(text.as_str()) {
                Ok(frame) => frame,
                Err(_) => {
                    let info = ServerFrame::Info {
                        message: "unrecognized frame".into(),
                    };
                    if !send_frame(&mut socket, &info).await {
                        break;
                    }
                    continue;
                }
            },
            Message::Close(_) => break,
            // Pings are answered by axum; other frame kinds are ignored.
            _ => continue,
        };

        match frame {
            ClientFrame::Start {
                session_id: requested,
                language: requested_language,
            } => {
                if let Some(id) = requested.filter(|id| !id.trim().is_empty()) {
                    session_id = id;
                }
                if let Some(lang) = requested_language.filter(|l| !l.trim().is_empty()) {
                    language = lang;
                }
                started = true;
                tracing::info!(session_id = %session_id, language = %language, "stream opened");
                let ready = ServerFrame::Ready {
                    session_id: session_id.clone(),
                };
                if !send_frame(&mut socket, &ready).await {
                    break;
                }
            }
            ClientFrame::Audio { data } => {
                if !started {
                    let info = ServerFrame::Info {
                        message: "send a start frame first".into(),
                    };
                    if !send_frame(&mut socket, &info).await {
                        break;
                    }
                    continue;
                }
                let chunk = match base64::engine::general_purpose::STANDARD.decode(&data) {
                    Ok(chunk) => chunk,
                    Err(_) => {
                        let info = ServerFrame::Info {
                            message: "audio frame is not valid base64".into(),
                        };
                        if !send_frame(&mut socket, &info).await {
                            break;
                        }
                        continue;
                    }
                };
                // Below the threshold is noise, not speech; it never
                // reaches the transcriber.
                if chunk.len() < MIN_CHUNK_BYTES {
                    tracing::debug!(bytes = chunk.len(), "dropped sub-threshold audio chunk");
                    continue;
                }
                if let Some(text) = transcribe_chunk(&state, &chunk, &mut transcript, &language).await
                {
                    let partial = ServerFrame::Partial { text };
                    if !send_frame(&mut socket, &partial).await {
                        break;
                    }
                }
            }
            ClientFrame::Flush => {
                let utterance = transcript.flush();
                let outcome = state
                    .engine
                    .handle_recognized_text(&session_id, &utterance)
                    .await;

                let frame = match outcome {
                    TurnOutcome::RePrompt => ServerFrame::Info {
                        message: "nothing heard yet".into(),
                    },
                    TurnOutcome::Done {
                        artifact,
                        reply_text,
                    } => ServerFrame::ReplyAudioUrl {
                        url: format!("/media/{}", artifact.file_name),
                        text: reply_text,
                    },
                    TurnOutcome::TextOnly { reply_text } => {
                        ServerFrame::ReplyText { text: reply_text }
                    }
                };
                if !send_frame(&mut socket, &frame).await {
                    break;
                }
            }
            ClientFrame::Stop => break,
        }
    }

    tracing::debug!(session_id = %session_id, "stream closed");
}

/// Transcribes one qualifying chunk and folds the text into the running
/// transcript. Returns the updated partial transcript when anything was
/// recognized.
async fn transcribe_chunk(
    state: &AppState,
    chunk: &[u8],
    transcript: &mut PartialBuffer,
    language: &str,
) -> Option<String> {
    match state.stt.transcribe_bytes(chunk, language).await {
        Ok(text) if !text.trim().is_empty() => {
            transcript.push(&text);
            Some(transcript.preview())
        }
        Ok(_) => None,
        Err(err) => {
            // A failed chunk is dropped; the rest of the utterance still
            // gets through on later chunks.
            tracing::warn!(error = %err, "chunk transcription failed");
            None
        }
    }
}
