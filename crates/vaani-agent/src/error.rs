use thiserror::Error;

/// Errors raised by the pipeline gateways.
///
/// Only the turn orchestrator is allowed to catch these and convert them
/// into caller-visible fallback behavior; gateways never substitute text
/// themselves, and none of these variants ever reaches a caller raw.
#[derive(Error, Debug)]
pub enum AgentError {
    /// A required credential or setting is absent. Surfaced when a dependent
    /// operation is attempted, not at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Speech-to-text failure (download, decode, or model).
    #[error("transcription error: {0}")]
    Transcribe(String),

    /// Reply-generation backend failure (network, auth, or error status).
    #[error("generation error: {0}")]
    Generate(String),

    /// Speech-synthesis backend failure (network, auth, or error status).
    #[error("synthesis error: {0}")]
    Synthesize(String),

    /// History store failure. Never escapes the store itself; kept as a
    /// variant so the KV boundary can report what went wrong to its logs.
    #[error("history store error: {0}")]
    Storage(String),
}
