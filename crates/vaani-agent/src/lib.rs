//! Core conversation pipeline for the Vaani voice agent.
//!
//! One caller utterance flows through a fixed sequence: ingest audio,
//! transcribe, record the user turn, generate a reply, record the assistant
//! turn, synthesize audio. The [`TurnEngine`] owns that sequence and its
//! fallback policy; every transport (telephony webhook, HTTP upload,
//! streaming socket) funnels into it and gets the same guarantees.
//!
//! The speech-to-text, reply-generation, and speech-synthesis backends sit
//! behind trait seams so the engine can be exercised without external
//! models. Conversation history lives in an external key-value store and
//! degrades to stateless single-turn behavior when that store is absent.

pub mod error;
pub mod history;
pub mod llm;
pub mod message;
pub mod stream;
pub mod stt;
pub mod tts;
pub mod turn;

pub use error::AgentError;
pub use history::{HistoryStore, KvListStore, RestKv};
pub use llm::{LlmBackend, LlmClient, ReplyGenerator, AGENT_PERSONA};
pub use message::{ChatMessage, Role};
pub use stream::{PartialBuffer, MAX_UTTERANCE_CHARS, MIN_CHUNK_BYTES};
pub use stt::{SpeechToText, WhisperTranscriber};
pub use tts::{AudioArtifact, SpeechSynthesizer, TtsBackend, TtsClient};
pub use turn::{AudioSource, TurnEngine, TurnOutcome, DEFAULT_FALLBACK_REPLY};
