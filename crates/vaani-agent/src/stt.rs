//! Speech-to-text gateway.
//!
//! Audio arrives either as a remote recording URL (telephony callback) or as
//! local bytes (upload / streamed chunk). Both land in a scratch file that a
//! whisper.cpp-style binary transcribes. The binary's model load is paid on
//! every invocation, so the gateway is constructed once, shared process-wide,
//! and serializes concurrent transcriptions through a single permit —
//! concurrent callers queue rather than thrash the model.

use crate::error::AgentError;
use async_trait::async_trait;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tokio::sync::Semaphore;

/// Maximum audio input size (10 MiB). Prevents OOM from oversized payloads.
const MAX_AUDIO_INPUT_BYTES: usize = 10 * 1024 * 1024;

/// Timeout for fetching a remote recording.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for the transcription process itself.
const STT_TIMEOUT: Duration = Duration::from_secs(120);

/// The transcription boundary the orchestrator depends on.
///
/// Failures surface as [`AgentError::Transcribe`]; the orchestrator is the
/// single place that maps both errors and empty text to a re-prompt.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Fetches and transcribes a remote audio resource. Returns the
    /// concatenated segment text; empty when no speech was detected.
    async fn transcribe_url(&self, url: &str, language: &str) -> Result<String, AgentError>;

    /// Transcribes locally available audio bytes (uploaded or streamed).
    async fn transcribe_bytes(&self, audio: &[u8], language: &str) -> Result<String, AgentError>;
}

/// Transcription via a local whisper.cpp binary.
#[derive(Debug, Clone)]
pub struct WhisperTranscriber {
    binary_path: PathBuf,
    model_path: PathBuf,
    http: reqwest::Client,
    /// Single permit: the model is not reentrant, so transcriptions queue.
    permit: Arc<Semaphore>,
}

impl WhisperTranscriber {
    pub fn new(binary_path: impl Into<PathBuf>, model_path: impl Into<PathBuf>) -> Self {
        Self {
            binary_path: binary_path.into(),
            model_path: model_path.into(),
            http: reqwest::Client::new(),
            permit: Arc::new(Semaphore::new(1)),
        }
    }

    /// Downloads a remote recording into a scratch file. The file is removed
    /// when the handle drops, on every exit path.
    async fn download(&self, url: &str) -> Result<NamedTempFile, AgentError> {
        let response = self
            .http
            .get(url)
            .timeout(DOWNLOAD_TIMEOUT)
            .send()
            .await
            .map_err(|e| AgentError::Transcribe(format!("recording download failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AgentError::Transcribe(format!(
                "recording download returned status {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AgentError::Transcribe(format!("recording read failed: {}", e)))?;

        self.write_scratch(&bytes)
    }

    fn write_scratch(&self, audio: &[u8]) -> Result<NamedTempFile, AgentError> {
        if audio.len() > MAX_AUDIO_INPUT_BYTES {
            return Err(AgentError::Transcribe(format!(
                "audio exceeds maximum size: {} bytes (limit: {} bytes)",
                audio.len(),
                MAX_AUDIO_INPUT_BYTES
            )));
        }

        let mut file = tempfile::Builder::new()
            .prefix("vaani_stt_")
            .suffix(".mp3")
            .tempfile()
            .map_err(|e| AgentError::Transcribe(format!("scratch file create failed: {}", e)))?;

        file.write_all(audio)
            .map_err(|e| AgentError::Transcribe(format!("scratch file write failed: {}", e)))?;

        Ok(file)
    }

    /// Runs the whisper binary over a local file and joins its output lines
    /// into one utterance. Holds the transcription permit for the duration.
    async fn run_model(&self, file: &NamedTempFile, language: &str) -> Result<String, AgentError> {
        let _guard = self
            .permit
            .acquire()
            .await
            .map_err(|_| AgentError::Transcribe("transcription queue closed".to_string()))?;

        let mut command = Command::new(&self.binary_path);
        command
            .arg("-m")
            .arg(&self.model_path)
            .arg("-f")
            .arg(file.path())
            .arg("-l")
            .arg(language)
            .arg("--no-timestamps")
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        let child = command
            .spawn()
            .map_err(|e| AgentError::Transcribe(format!("failed to spawn STT binary: {}", e)))?;

        let output = tokio::time::timeout(STT_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| {
                AgentError::Transcribe(format!(
                    "STT process timed out after {} seconds",
                    STT_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|e| AgentError::Transcribe(format!("failed to read STT output: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AgentError::Transcribe(format!(
                "STT binary failed: {}",
                stderr
            )));
        }

        // One segment per stdout line; trim each and join with single spaces.
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(join_segments(stdout.lines()))
    }
}

/// Trims segments and joins the non-empty ones with single spaces.
fn join_segments<'a>(segments: impl Iterator<Item = &'a str>) -> String {
    segments
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl SpeechToText for WhisperTranscriber {
    async fn transcribe_url(&self, url: &str, language: &str) -> Result<String, AgentError> {
        let file = self.download(url).await?;
        self.run_model(&file, language).await
    }

    async fn transcribe_bytes(&self, audio: &[u8], language: &str) -> Result<String, AgentError> {
        let file = self.write_scratch(audio)?;
        self.run_model(&file, language).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_are_trimmed_and_joined() {
        let raw = "  namaste ji \n\n kaise hain aap  \n";
        assert_eq!(join_segments(raw.lines()), "namaste ji kaise hain aap");
    }

    #[test]
    fn silence_joins_to_empty() {
        assert_eq!(join_segments("\n   \n".lines()), "");
    }

    #[test]
    fn oversized_audio_is_rejected_before_spawn() {
        let stt = WhisperTranscriber::new("whisper-cli", "model.bin");
        let audio = vec![0u8; MAX_AUDIO_INPUT_BYTES + 1];
        let err = stt.write_scratch(&audio).unwrap_err();
        assert!(matches!(err, AgentError::Transcribe(_)));
    }

    #[tokio::test]
    async fn missing_binary_surfaces_typed_error() {
        let stt = WhisperTranscriber::new("/nonexistent/vaani-whisper", "/nonexistent/model.bin");
        let err = stt.transcribe_bytes(b"not really audio", "hi").await.unwrap_err();
        assert!(matches!(err, AgentError::Transcribe(_)));
    }
}
