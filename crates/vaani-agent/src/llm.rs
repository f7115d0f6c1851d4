//! Reply generation via an interchangeable language-model backend.
//!
//! Exactly one backend is active per deployment, chosen once at startup as a
//! closed enum variant. Both backends receive the same chronological
//! role-tagged history with the persona preamble prepended, and both return
//! a single trimmed string. Failures are typed — this module never
//! substitutes fallback text; that policy lives in the orchestrator.

use crate::error::AgentError;
use crate::message::{ChatMessage, Role};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Fixed persona instruction prepended to every generation call. Static
/// configuration, not user data.
pub const AGENT_PERSONA: &str = "You are a friendly AI voice agent for Riverwood Projects in Haryana.
PERSONALITY:
- Warm, conversational Hinglish
- Use: \"Namaste\", \"chai pee li?\", \"kaise hain?\"
- Build relationships, remember conversations
KNOWLEDGE:
- Riverwood Estate: 25 acres, Sector 7 Kharkhauda
- Near Maruti Suzuki plant
- Plots: 90-150 sq meters
- Under DDJAY scheme
STYLE:
- Keep responses short (2-3 sentences for calls)
- Natural and caring tone
- Reference previous conversations
- Invite for weekend visits
CONSTRUCTION UPDATES:
- Positive and specific
- Mention: foundation, walls, roofing progress
- Give realistic timelines
Respond concisely in Hinglish with warmth.
";

/// Timeout for language-model backend calls.
const LLM_TIMEOUT: Duration = Duration::from_secs(60);

/// Sampling temperature, shared by both backends. Tuned for moderately
/// deterministic spoken-turn replies.
const LLM_TEMPERATURE: f32 = 0.6;

/// Output caps keep replies at spoken-turn length (2-3 sentences).
const GEMINI_MAX_OUTPUT_TOKENS: u32 = 200;
const GROK_MAX_TOKENS: u32 = 220;

/// The reply-generation boundary the orchestrator depends on.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    /// Generates a reply for a chronological history whose last element is
    /// the newest user utterance.
    async fn generate(&self, history: &[ChatMessage]) -> Result<String, AgentError>;
}

/// The closed set of supported generation backends.
#[derive(Debug, Clone)]
pub enum LlmBackend {
    Gemini {
        api_key: Option<String>,
        model: String,
    },
    Grok {
        api_key: Option<String>,
        model: String,
    },
}

/// HTTP client for the active generation backend.
#[derive(Debug, Clone)]
pub struct LlmClient {
    backend: LlmBackend,
    http: reqwest::Client,
}

impl LlmClient {
    pub fn new(backend: LlmBackend) -> Self {
        Self {
            backend,
            http: reqwest::Client::new(),
        }
    }

    async fn gemini_chat(
        &self,
        api_key: &Option<String>,
        model: &str,
        history: &[ChatMessage],
    ) -> Result<String, AgentError> {
        let Some(key) = api_key else {
            return Err(AgentError::Generate(
                "gemini api key not configured".to_string(),
            ));
        };

        #[derive(Serialize)]
        struct Part<'a> {
            text: &'a str,
        }
        #[derive(Serialize)]
        struct Content<'a> {
            #[serde(skip_serializing_if = "Option::is_none")]
            role: Option<&'a str>,
            parts: Vec<Part<'a>>,
        }
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct GenerationConfig {
            temperature: f32,
            max_output_tokens: u32,
        }
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Request<'a> {
            system_instruction: Content<'a>,
            contents: Vec<Content<'a>>,
            generation_config: GenerationConfig,
        }

        // Gemini tags assistant turns as "model" rather than "assistant".
        let contents = history
            .iter()
            .map(|m| Content {
                role: Some(match m.role {
                    Role::User => "user",
                    Role::Assistant => "model",
                }),
                parts: vec![Part { text: &m.content }],
            })
            .collect();

        let request = Request {
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: AGENT_PERSONA,
                }],
            },
            contents,
            generation_config: GenerationConfig {
                temperature: LLM_TEMPERATURE,
                max_output_tokens: GEMINI_MAX_OUTPUT_TOKENS,
            },
        };

        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            model, key
        );

        let response = self
            .http
            .post(&url)
            .json(&request)
            .timeout(LLM_TIMEOUT)
            .send()
            .await
            .map_err(|e| AgentError::Generate(format!("gemini request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AgentError::Generate(format!(
                "gemini returned status {}",
                response.status()
            )));
        }

        #[derive(Deserialize)]
        struct RespPart {
            text: Option<String>,
        }
        #[derive(Deserialize)]
        struct RespContent {
            #[serde(default)]
            parts: Vec<RespPart>,
        }
        #[derive(Deserialize)]
        struct Candidate {
            content: Option<RespContent>,
        }
        #[derive(Deserialize)]
        struct Response {
            #[serde(default)]
            candidates: Vec<Candidate>,
        }

        let body: Response = response
            .json()
            .await
            .map_err(|e| AgentError::Generate(format!("gemini response decode failed: {}", e)))?;

        let text = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        Ok(text.trim().to_string())
    }

    async fn grok_chat(
        &self,
        api_key: &Option<String>,
        model: &str,
        history: &[ChatMessage],
    ) -> Result<String, AgentError> {
        let Some(key) = api_key else {
            return Err(AgentError::Generate(
                "grok api key not configured".to_string(),
            ));
        };

        #[derive(Serialize)]
        struct WireMessage<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Request<'a> {
            model: &'a str,
            messages: Vec<WireMessage<'a>>,
            temperature: f32,
            max_tokens: u32,
        }

        let mut messages = vec![WireMessage {
            role: "system",
            content: AGENT_PERSONA,
        }];
        messages.extend(history.iter().map(|m| WireMessage {
            role: m.role.as_str(),
            content: &m.content,
        }));

        let request = Request {
            model,
            messages,
            temperature: LLM_TEMPERATURE,
            max_tokens: GROK_MAX_TOKENS,
        };

        let response = self
            .http
            .post("https://api.x.ai/v1/chat/completions")
            .bearer_auth(key)
            .json(&request)
            .timeout(LLM_TIMEOUT)
            .send()
            .await
            .map_err(|e| AgentError::Generate(format!("grok request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AgentError::Generate(format!(
                "grok returned status {}",
                response.status()
            )));
        }

        #[derive(Deserialize)]
        struct RespMessage {
            content: String,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: RespMessage,
        }
        #[derive(Deserialize)]
        struct Response {
            #[serde(default)]
            choices: Vec<Choice>,
        }

        let body: Response = response
            .json()
            .await
            .map_err(|e| AgentError::Generate(format!("grok response decode failed: {}", e)))?;

        let text = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        Ok(text.trim().to_string())
    }
}

#[async_trait]
impl ReplyGenerator for LlmClient {
    async fn generate(&self, history: &[ChatMessage]) -> Result<String, AgentError> {
        match &self.backend {
            LlmBackend::Gemini { api_key, model } => {
                self.gemini_chat(api_key, model, history).await
            }
            LlmBackend::Grok { api_key, model } => self.grok_chat(api_key, model, history).await,
        }
    }
}
