//! Telephony webhook handlers.
//!
//! The provider posts urlencoded forms for call initiation, recording
//! completion, and browser soft-phone dial-out; every handler validates the
//! request signature before trusting the payload and answers with a voice
//! control document. Unauthenticated requests get an empty document — never
//! an error page.

use crate::twiml::VoiceResponse;
use crate::AppState;
use axum::{
    extract::{Extension, Form},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;
use vaani_agent::{AudioSource, TurnOutcome};

/// Opening line spoken when a call connects.
const GREETING: &str = "Namaste! Riverwood Projects se baat ho rahi hai.";

/// Prompt before the recording starts.
const RECORD_PROMPT: &str = "Beep ke baad boliye.";

/// Spoken when the callback carried no recording at all.
const NO_RECORDING_PROMPT: &str =
    "Kshama kijiye, awaz record nahi ho payi. Dobara koshish karein.";

/// Spoken when nothing usable was heard in the recording.
const UNCLEAR_PROMPT: &str = "Mujhe theek se sunai nahin diya. Kripya dobara kahe.";

/// Maximum caller recording length in seconds.
const RECORD_MAX_LENGTH_SECS: u32 = 30;

/// Silence, in seconds, that ends a recording.
const RECORD_SILENCE_TIMEOUT_SECS: u32 = 1;

/// Wraps a voice document in a `text/xml` response.
fn twiml(response: VoiceResponse) -> Response {
    ([(header::CONTENT_TYPE, "text/xml")], response.to_xml()).into_response()
}

/// Checks the webhook signature for a handler path. The signed URL is the
/// public base plus the webhook path, matching what the provider signed.
fn authorized(
    state: &AppState,
    path: &str,
    params: &HashMap<String, String>,
    headers: &HeaderMap,
) -> bool {
    let url = format!("{}{}", state.config.server.public_url, path);
    let signature = headers
        .get("X-Twilio-Signature")
        .and_then(|v| v.to_str().ok());

    let ok = state.validator.validate(&url, params, signature);
    if !ok {
        tracing::warn!(path = path, "rejected webhook: invalid or missing signature");
    }
    ok
}

/// `POST /voice` — call initiation. Greets the caller and starts a
/// recording whose completion posts to `/process-recording`.
pub async fn voice_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Form(params): Form<HashMap<String, String>>,
) -> Response {
    if !authorized(&state, "/voice", &params, &headers) {
        return twiml(VoiceResponse::new());
    }

    tracing::info!(
        call_sid = params.get("CallSid").map(String::as_str).unwrap_or(""),
        from = params.get("From").map(String::as_str).unwrap_or(""),
        "inbound call"
    );

    twiml(
        VoiceResponse::new()
            .say(GREETING)
            .say(RECORD_PROMPT)
            .record(
                "/process-recording",
                RECORD_MAX_LENGTH_SECS,
                RECORD_SILENCE_TIMEOUT_SECS,
                false,
            ),
    )
}

/// `POST /process-recording` — recording completion. Runs one full turn of
/// the pipeline and instructs the provider how to render the result, then
/// loops the call back to the listening state.
pub async fn process_recording_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Form(params): Form<HashMap<String, String>>,
) -> Response {
    if !authorized(&state, "/process-recording", &params, &headers) {
        return twiml(VoiceResponse::new());
    }

    let call_sid = params
        .get("CallSid")
        .cloned()
        .unwrap_or_else(|| Uuid::new_v4().simple().to_string());

    let recording_url = params
        .get("RecordingUrl")
        .cloned()
        .filter(|url| !url.is_empty());

    if recording_url.is_none() {
        // Malformed callback; nothing to transcribe, nothing recorded.
        return twiml(
            VoiceResponse::new()
                .say(NO_RECORDING_PROMPT)
                .redirect("/voice"),
        );
    }

    let outcome = state
        .engine
        .handle_recorded_audio(
            &call_sid,
            recording_url.map(AudioSource::Url),
            &state.config.stt.language,
        )
        .await;

    let response = match outcome {
        TurnOutcome::RePrompt => VoiceResponse::new().say(UNCLEAR_PROMPT).redirect("/voice"),
        TurnOutcome::Done { artifact, .. } => {
            let play_url = format!(
                "{}/media/{}",
                state.config.server.public_url, artifact.file_name
            );
            VoiceResponse::new().play(play_url).redirect("/voice")
        }
        // Synthesized audio unavailable: fall back to the carrier's
        // built-in voice for this turn.
        TurnOutcome::TextOnly { reply_text } => {
            VoiceResponse::new().say(reply_text).redirect("/voice")
        }
    };

    twiml(response)
}

/// `POST /client-voice` — outbound leg for the browser soft-phone. Dials
/// the requested number, presenting the configured caller id.
pub async fn client_voice_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Form(params): Form<HashMap<String, String>>,
) -> Response {
    if !authorized(&state, "/client-voice", &params, &headers) {
        return twiml(VoiceResponse::new());
    }

    let to_number = params
        .get("To")
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());

    let response = match to_number {
        Some(number) => {
            VoiceResponse::new().dial(number, state.config.telephony.number.clone())
        }
        None => VoiceResponse::new().say("Destination number missing."),
    };

    twiml(response)
}
