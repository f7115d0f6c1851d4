//! Speech synthesis via an interchangeable backend.
//!
//! Both backends write MPEG audio to a freshly named file under the
//! configured media directory, so playback and serving stay
//! backend-agnostic. Failures are typed; the orchestrator owns the
//! text-only fallback.

use crate::error::AgentError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use uuid::Uuid;

/// Maximum text input size for synthesis (8 KiB). Replies are tuned for
/// spoken-turn length; anything bigger indicates a bug upstream.
const MAX_TTS_INPUT_BYTES: usize = 8 * 1024;

/// Timeout for synthesis, local process or hosted call.
const TTS_TIMEOUT: Duration = Duration::from_secs(60);

/// A synthesized, playable audio file (MPEG audio). Written once under the
/// media directory and never mutated; disk lifecycle is external.
#[derive(Debug, Clone)]
pub struct AudioArtifact {
    /// Unique basename, e.g. `3f2a….mp3`. Safe to expose in a media URL.
    pub file_name: String,
    /// Absolute or media-dir-relative path of the written file.
    pub path: PathBuf,
}

/// The synthesis boundary the orchestrator depends on.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<AudioArtifact, AgentError>;
}

/// The closed set of supported synthesis backends.
#[derive(Debug, Clone)]
pub enum TtsBackend {
    /// Local streaming synthesis CLI (edge-tts style); free, no credential.
    Edge { binary_path: PathBuf, voice: String },
    /// Hosted synthesis API; requires a credential.
    ElevenLabs {
        api_key: Option<String>,
        voice_id: String,
    },
}

/// Service for rendering reply text to a playable media file.
#[derive(Debug, Clone)]
pub struct TtsClient {
    backend: TtsBackend,
    media_dir: PathBuf,
    http: reqwest::Client,
}

impl TtsClient {
    pub fn new(backend: TtsBackend, media_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            media_dir: media_dir.into(),
            http: reqwest::Client::new(),
        }
    }

    /// Fresh per-call output path; random names keep concurrent sessions
    /// from colliding.
    fn fresh_artifact(&self) -> AudioArtifact {
        let file_name = format!("{}.mp3", Uuid::new_v4().simple());
        AudioArtifact {
            path: self.media_dir.join(&file_name),
            file_name,
        }
    }

    async fn synthesize_edge(
        &self,
        text: &str,
        binary_path: &PathBuf,
        voice: &str,
    ) -> Result<AudioArtifact, AgentError> {
        let artifact = self.fresh_artifact();

        let mut command = Command::new(binary_path);
        command
            .arg("--text")
            .arg(text)
            .arg("--voice")
            .arg(voice)
            .arg("--write-media")
            .arg(&artifact.path)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        let child = command
            .spawn()
            .map_err(|e| AgentError::Synthesize(format!("failed to spawn TTS binary: {}", e)))?;

        let output = tokio::time::timeout(TTS_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| {
                AgentError::Synthesize(format!(
                    "TTS process timed out after {} seconds",
                    TTS_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|e| AgentError::Synthesize(format!("failed to wait for TTS binary: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AgentError::Synthesize(format!("TTS binary failed: {}", stderr)));
        }

        // The CLI exits zero even for some refusals; an absent or empty file
        // means no audio was produced.
        match tokio::fs::metadata(&artifact.path).await {
            Ok(meta) if meta.len() > 0 => Ok(artifact),
            _ => Err(AgentError::Synthesize(
                "TTS binary produced no audio output".to_string(),
            )),
        }
    }

    async fn synthesize_elevenlabs(
        &self,
        text: &str,
        api_key: &Option<String>,
        voice_id: &str,
    ) -> Result<AudioArtifact, AgentError> {
        let Some(key) = api_key else {
            return Err(AgentError::Synthesize(
                "elevenlabs api key not configured".to_string(),
            ));
        };

        let url = format!("https://api.elevenlabs.io/v1/text-to-speech/{}", voice_id);
        let body = serde_json::json!({
            "text": text,
            "model_id": "eleven_monolingual_v1",
            "voice_settings": { "stability": 0.5, "similarity_boost": 0.6 },
        });

        let response = self
            .http
            .post(&url)
            .header("xi-api-key", key)
            .header("accept", "audio/mpeg")
            .json(&body)
            .timeout(TTS_TIMEOUT)
            .send()
            .await
            .map_err(|e| AgentError::Synthesize(format!("elevenlabs request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AgentError::Synthesize(format!(
                "elevenlabs returned status {}",
                response.status()
            )));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| AgentError::Synthesize(format!("elevenlabs read failed: {}", e)))?;

        let artifact = self.fresh_artifact();
        tokio::fs::write(&artifact.path, &audio)
            .await
            .map_err(|e| AgentError::Synthesize(format!("media file write failed: {}", e)))?;

        tracing::info!(
            file = %artifact.file_name,
            bytes = audio.len(),
            "hosted TTS wrote media file"
        );
        Ok(artifact)
    }
}

#[async_trait]
impl SpeechSynthesizer for TtsClient {
    async fn synthesize(&self, text: &str) -> Result<AudioArtifact, AgentError> {
        if text.len() > MAX_TTS_INPUT_BYTES {
            return Err(AgentError::Synthesize(format!(
                "text exceeds maximum size: {} bytes (limit: {} bytes)",
                text.len(),
                MAX_TTS_INPUT_BYTES
            )));
        }

        match &self.backend {
            TtsBackend::Edge { binary_path, voice } => {
                self.synthesize_edge(text, binary_path, voice).await
            }
            TtsBackend::ElevenLabs { api_key, voice_id } => {
                self.synthesize_elevenlabs(text, api_key, voice_id).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_file_names_are_unique_mp3s() {
        let client = TtsClient::new(
            TtsBackend::Edge {
                binary_path: "edge-tts".into(),
                voice: "en-IN-NeerjaNeural".into(),
            },
            "/tmp/media",
        );
        let a = client.fresh_artifact();
        let b = client.fresh_artifact();
        assert!(a.file_name.ends_with(".mp3"));
        assert_ne!(a.file_name, b.file_name);
        assert_eq!(a.path, PathBuf::from("/tmp/media").join(&a.file_name));
    }

    #[tokio::test]
    async fn oversized_text_is_rejected() {
        let client = TtsClient::new(
            TtsBackend::Edge {
                binary_path: "edge-tts".into(),
                voice: "en-IN-NeerjaNeural".into(),
            },
            "/tmp/media",
        );
        let text = "a".repeat(MAX_TTS_INPUT_BYTES + 1);
        let err = client.synthesize(&text).await.unwrap_err();
        assert!(matches!(err, AgentError::Synthesize(_)));
    }

    #[tokio::test]
    async fn missing_hosted_credential_errors_at_call_time() {
        let client = TtsClient::new(
            TtsBackend::ElevenLabs {
                api_key: None,
                voice_id: "21m00Tcm4TlvDq8ikWAM".into(),
            },
            "/tmp/media",
        );
        let err = client.synthesize("namaste").await.unwrap_err();
        assert!(matches!(err, AgentError::Synthesize(_)));
    }
}
