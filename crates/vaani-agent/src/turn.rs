//! The per-utterance turn orchestrator.
//!
//! Each invocation handles exactly one caller utterance and produces exactly
//! one user+assistant history pair, or zero pairs on an early re-prompt.
//! Every stage failure is isolated here — this is the only place gateway
//! errors are converted into caller-visible fallback behavior, which keeps
//! the whole fallback policy auditable in one spot:
//!
//! - no audio, or transcription error/empty → re-prompt, no history writes;
//! - generation failure → fixed fallback reply, still recorded and spoken;
//! - synthesis failure → text-only result, history already complete.

use crate::history::HistoryStore;
use crate::llm::ReplyGenerator;
use crate::message::{ChatMessage, Role};
use crate::stt::SpeechToText;
use crate::tts::{AudioArtifact, SpeechSynthesizer};
use std::sync::Arc;

/// Canned apologetic reply substituted when generation fails. Matches the
/// agent's configured response language and style.
pub const DEFAULT_FALLBACK_REPLY: &str =
    "Namaste! Aapki baat samajh aayi. Thodi der baad phir se koshish karte hain.";

/// Where the caller's audio lives for this turn.
#[derive(Debug, Clone)]
pub enum AudioSource {
    /// Remote recording URL (telephony callback).
    Url(String),
    /// Locally available bytes (upload or streamed chunk assembly).
    Bytes(Vec<u8>),
}

/// Terminal result of one turn.
///
/// `Done` and `TextOnly` are both success terminals, distinguished by
/// payload shape: `TextOnly` means the reply exists but synthesized audio
/// does not, and the transport applies its own rendering fallback.
#[derive(Debug)]
pub enum TurnOutcome {
    /// Nothing usable was heard; ask the caller to repeat. History untouched.
    RePrompt,
    /// Full pipeline success: a playable artifact plus the reply text.
    Done {
        artifact: AudioArtifact,
        reply_text: String,
    },
    /// Reply generated (and recorded) but synthesis was unavailable.
    TextOnly { reply_text: String },
}

/// Composes the history store and the three gateways into the single
/// "process one utterance" operation shared by all transports.
#[derive(Clone)]
pub struct TurnEngine {
    history: HistoryStore,
    stt: Arc<dyn SpeechToText>,
    generator: Arc<dyn ReplyGenerator>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    fallback_reply: String,
}

impl TurnEngine {
    pub fn new(
        history: HistoryStore,
        stt: Arc<dyn SpeechToText>,
        generator: Arc<dyn ReplyGenerator>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        Self {
            history,
            stt,
            generator,
            synthesizer,
            fallback_reply: DEFAULT_FALLBACK_REPLY.to_string(),
        }
    }

    pub fn with_fallback_reply(mut self, reply: impl Into<String>) -> Self {
        self.fallback_reply = reply.into();
        self
    }

    /// Processes one recorded utterance end to end.
    ///
    /// `audio` is `None` when the transport event carried no recording at all
    /// (e.g. a malformed telephony callback) — that short-circuits to a
    /// re-prompt without touching history.
    pub async fn handle_recorded_audio(
        &self,
        session_id: &str,
        audio: Option<AudioSource>,
        language: &str,
    ) -> TurnOutcome {
        let Some(source) = audio else {
            tracing::info!(session_id = %session_id, "turn had no audio reference, re-prompting");
            return TurnOutcome::RePrompt;
        };

        let transcribed = match source {
            AudioSource::Url(url) => self.stt.transcribe_url(&url, language).await,
            AudioSource::Bytes(bytes) => self.stt.transcribe_bytes(&bytes, language).await,
        };

        // Transcription errors and silence are the same signal to the
        // caller: nothing usable was heard. Neither pollutes history.
        let text = match transcribed {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(session_id = %session_id, "transcription failed, re-prompting: {}", e);
                String::new()
            }
        };

        self.handle_recognized_text(session_id, &text).await
    }

    /// Runs the pipeline from already-recognized text (streaming path skips
    /// re-transcription). Blank text degenerates to a re-prompt.
    pub async fn handle_recognized_text(&self, session_id: &str, text: &str) -> TurnOutcome {
        let utterance = text.trim();
        if utterance.is_empty() {
            return TurnOutcome::RePrompt;
        }

        // The user's utterance is real and gets remembered regardless of
        // whether the later stages manage to respond.
        let mut history = self.history.load(session_id).await;
        self.history.append(session_id, Role::User, utterance).await;
        history.push(ChatMessage::user(utterance));

        let reply_text = match self.generator.generate(&history).await {
            Ok(reply) if !reply.trim().is_empty() => reply.trim().to_string(),
            Ok(_) => {
                tracing::warn!(session_id = %session_id, "generator returned empty reply, using fallback");
                self.fallback_reply.clone()
            }
            Err(e) => {
                tracing::warn!(session_id = %session_id, "generation failed, using fallback reply: {}", e);
                self.fallback_reply.clone()
            }
        };

        self.history
            .append(session_id, Role::Assistant, &reply_text)
            .await;

        match self.synthesizer.synthesize(&reply_text).await {
            Ok(artifact) => {
                tracing::info!(
                    session_id = %session_id,
                    file = %artifact.file_name,
                    "turn complete with synthesized audio"
                );
                TurnOutcome::Done {
                    artifact,
                    reply_text,
                }
            }
            Err(e) => {
                tracing::warn!(
                    session_id = %session_id,
                    "synthesis failed, degrading to text-only reply: {}",
                    e
                );
                TurnOutcome::TextOnly { reply_text }
            }
        }
    }
}
