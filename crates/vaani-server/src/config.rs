//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Telephony webhook settings.
    #[serde(default)]
    pub telephony: TelephonyConfig,

    /// Speech-to-text settings.
    #[serde(default)]
    pub stt: SttConfig,

    /// Reply-generation settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Speech-synthesis settings.
    #[serde(default)]
    pub tts: TtsConfig,

    /// Conversation history store settings.
    #[serde(default)]
    pub history: HistoryConfig,

    /// Media directory settings.
    #[serde(default)]
    pub media: MediaConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Public base URL of this server (no trailing slash). Used for
    /// absolute media URLs in voice documents and for signature validation.
    #[serde(default)]
    pub public_url: String,

    /// Directory of optional static client files (browser soft-phone page).
    #[serde(default = "default_static_dir")]
    pub static_dir: String,
}

/// Telephony provider settings.
#[derive(Clone, Deserialize)]
pub struct TelephonyConfig {
    /// Provider account SID (needed for client tokens).
    pub account_sid: Option<String>,

    /// Webhook signing secret. Inbound requests are HMAC-validated against
    /// this token when `validate_signatures` is on.
    pub auth_token: Option<String>,

    /// Caller id for outbound dial legs.
    pub number: Option<String>,

    /// Whether inbound webhook signatures are enforced. On by default;
    /// turn off only for local testing.
    #[serde(default = "default_true")]
    pub validate_signatures: bool,

    /// API key pair for browser soft-phone access tokens.
    pub api_key_sid: Option<String>,
    pub api_key_secret: Option<String>,

    /// TwiML application SID the soft-phone token routes outgoing calls to.
    pub twiml_app_sid: Option<String>,

    /// Default identity for soft-phone tokens when the client sends none.
    #[serde(default = "default_client_identity")]
    pub client_identity: String,
}

impl fmt::Debug for TelephonyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelephonyConfig")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("number", &self.number)
            .field("validate_signatures", &self.validate_signatures)
            .field("api_key_sid", &self.api_key_sid)
            .field(
                "api_key_secret",
                &self.api_key_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("twiml_app_sid", &self.twiml_app_sid)
            .field("client_identity", &self.client_identity)
            .finish()
    }
}

/// Speech-to-text settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SttConfig {
    /// Path to the whisper.cpp-style binary.
    #[serde(default = "default_stt_binary")]
    pub binary: String,

    /// Path to the GGML model file.
    #[serde(default = "default_stt_model")]
    pub model: String,

    /// Default transcription language hint.
    #[serde(default = "default_language")]
    pub language: String,
}

/// The configured reply-generation backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Gemini,
    Grok,
}

/// Reply-generation settings.
#[derive(Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: LlmProvider,

    pub gemini_api_key: Option<String>,
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,

    pub grok_api_key: Option<String>,
    #[serde(default = "default_grok_model")]
    pub grok_model: String,
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field(
                "gemini_api_key",
                &self.gemini_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("gemini_model", &self.gemini_model)
            .field(
                "grok_api_key",
                &self.grok_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("grok_model", &self.grok_model)
            .finish()
    }
}

/// The configured speech-synthesis backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtsProvider {
    Edge,
    Elevenlabs,
}

/// Speech-synthesis settings.
#[derive(Clone, Deserialize)]
pub struct TtsConfig {
    #[serde(default = "default_tts_provider")]
    pub provider: TtsProvider,

    /// Path of the local streaming-synthesis CLI.
    #[serde(default = "default_edge_binary")]
    pub edge_binary: String,

    /// Voice identifier for the local backend.
    #[serde(default = "default_edge_voice")]
    pub edge_voice: String,

    pub elevenlabs_api_key: Option<String>,
    #[serde(default = "default_elevenlabs_voice_id")]
    pub elevenlabs_voice_id: String,
}

impl fmt::Debug for TtsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtsConfig")
            .field("provider", &self.provider)
            .field("edge_binary", &self.edge_binary)
            .field("edge_voice", &self.edge_voice)
            .field(
                "elevenlabs_api_key",
                &self.elevenlabs_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("elevenlabs_voice_id", &self.elevenlabs_voice_id)
            .finish()
    }
}

/// Conversation history store settings. History is optional: with no REST
/// endpoint configured, the agent runs stateless.
#[derive(Clone, Deserialize)]
pub struct HistoryConfig {
    /// Redis-over-REST endpoint URL.
    pub redis_url: Option<String>,

    /// Bearer token for the REST endpoint.
    pub redis_token: Option<String>,

    /// Session expiry refreshed on every write.
    #[serde(default = "default_history_ttl")]
    pub ttl_seconds: u64,

    /// Cap on retained messages per session.
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
}

impl fmt::Debug for HistoryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistoryConfig")
            .field("redis_url", &self.redis_url)
            .field(
                "redis_token",
                &self.redis_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("ttl_seconds", &self.ttl_seconds)
            .field("max_messages", &self.max_messages)
            .finish()
    }
}

/// Media directory settings.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaConfig {
    /// Directory synthesized audio files are written to and served from.
    #[serde(default = "default_media_dir")]
    pub dir: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "vaani_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    8000
}

fn default_static_dir() -> String {
    "static".to_string()
}

fn default_true() -> bool {
    true
}

fn default_client_identity() -> String {
    "vaani-agent".to_string()
}

fn default_stt_binary() -> String {
    "whisper-cli".to_string()
}

fn default_stt_model() -> String {
    "models/ggml-small.bin".to_string()
}

fn default_language() -> String {
    "hi".to_string()
}

fn default_llm_provider() -> LlmProvider {
    LlmProvider::Gemini
}

fn default_gemini_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_grok_model() -> String {
    "grok-beta".to_string()
}

fn default_tts_provider() -> TtsProvider {
    TtsProvider::Edge
}

fn default_edge_binary() -> String {
    "edge-tts".to_string()
}

fn default_edge_voice() -> String {
    "en-IN-NeerjaNeural".to_string()
}

fn default_elevenlabs_voice_id() -> String {
    "21m00Tcm4TlvDq8ikWAM".to_string()
}

fn default_history_ttl() -> u64 {
    86_400
}

fn default_max_messages() -> usize {
    20
}

fn default_media_dir() -> String {
    "media".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: String::new(),
            static_dir: default_static_dir(),
        }
    }
}

impl Default for TelephonyConfig {
    fn default() -> Self {
        Self {
            account_sid: None,
            auth_token: None,
            number: None,
            validate_signatures: true,
            api_key_sid: None,
            api_key_secret: None,
            twiml_app_sid: None,
            client_identity: default_client_identity(),
        }
    }
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            binary: default_stt_binary(),
            model: default_stt_model(),
            language: default_language(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            gemini_api_key: None,
            gemini_model: default_gemini_model(),
            grok_api_key: None,
            grok_model: default_grok_model(),
        }
    }
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            provider: default_tts_provider(),
            edge_binary: default_edge_binary(),
            edge_voice: default_edge_voice(),
            elevenlabs_api_key: None,
            elevenlabs_voice_id: default_elevenlabs_voice_id(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            redis_token: None,
            ttl_seconds: default_history_ttl(),
            max_messages: default_max_messages(),
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            dir: default_media_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `VAANI_HOST` overrides `server.host`
/// - `VAANI_PORT` overrides `server.port`
/// - `VAANI_PUBLIC_URL` overrides `server.public_url`
/// - `VAANI_LOG_LEVEL` overrides `logging.level`
/// - `VAANI_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `VAANI_TWILIO_AUTH_TOKEN` overrides `telephony.auth_token`
/// - `VAANI_GEMINI_API_KEY` overrides `llm.gemini_api_key`
/// - `VAANI_GROK_API_KEY` overrides `llm.grok_api_key`
/// - `VAANI_ELEVENLABS_API_KEY` overrides `tts.elevenlabs_api_key`
/// - `VAANI_REDIS_URL` overrides `history.redis_url`
/// - `VAANI_REDIS_TOKEN` overrides `history.redis_token`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    // Environment variable overrides
    if let Ok(host) = std::env::var("VAANI_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Ok(port) = std::env::var("VAANI_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Ok(url) = std::env::var("VAANI_PUBLIC_URL") {
        config.server.public_url = url;
    }
    if let Ok(level) = std::env::var("VAANI_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("VAANI_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Ok(token) = std::env::var("VAANI_TWILIO_AUTH_TOKEN") {
        config.telephony.auth_token = Some(token);
    }
    if let Ok(key) = std::env::var("VAANI_GEMINI_API_KEY") {
        config.llm.gemini_api_key = Some(key);
    }
    if let Ok(key) = std::env::var("VAANI_GROK_API_KEY") {
        config.llm.grok_api_key = Some(key);
    }
    if let Ok(key) = std::env::var("VAANI_ELEVENLABS_API_KEY") {
        config.tts.elevenlabs_api_key = Some(key);
    }
    if let Ok(url) = std::env::var("VAANI_REDIS_URL") {
        config.history.redis_url = Some(url);
    }
    if let Ok(token) = std::env::var("VAANI_REDIS_TOKEN") {
        config.history.redis_token = Some(token);
    }

    // Paths are appended to the public URL directly; a trailing slash from
    // either the file or the environment would double up.
    config.server.public_url = config
        .server
        .public_url
        .trim_end_matches('/')
        .to_string();

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_complete() {
        let config = Config::default();
        assert_eq!(config.server.port, 8000);
        assert!(config.telephony.validate_signatures);
        assert_eq!(config.stt.language, "hi");
        assert_eq!(config.llm.provider, LlmProvider::Gemini);
        assert_eq!(config.tts.provider, TtsProvider::Edge);
        assert_eq!(config.history.max_messages, 20);
        assert_eq!(config.history.ttl_seconds, 86_400);
        assert_eq!(config.media.dir, "media");
    }

    #[test]
    fn parses_provider_selection() {
        let toml_str = r#"
            [llm]
            provider = "grok"
            grok_api_key = "xai-123"

            [tts]
            provider = "elevenlabs"
            elevenlabs_api_key = "el-123"
        "#;
        let config: Config = toml::from_str(toml_str).expect("parse TOML");
        assert_eq!(config.llm.provider, LlmProvider::Grok);
        assert_eq!(config.tts.provider, TtsProvider::Elevenlabs);
    }

    #[test]
    fn public_url_trailing_slash_is_trimmed() {
        let file = tempfile::NamedTempFile::new().expect("temp config");
        std::fs::write(
            file.path(),
            "[server]\npublic_url = \"https://agent.example.com/\"\n",
        )
        .expect("write config");

        let config = load_config(file.path().to_str()).expect("load config");
        assert_eq!(config.server.public_url, "https://agent.example.com");
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let mut config = Config::default();
        config.telephony.auth_token = Some("super-secret".to_string());
        config.llm.gemini_api_key = Some("gm-secret".to_string());
        config.tts.elevenlabs_api_key = Some("el-secret".to_string());
        config.history.redis_token = Some("rd-secret".to_string());

        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret"));
        assert!(!debug.contains("gm-secret"));
        assert!(!debug.contains("el-secret"));
        assert!(!debug.contains("rd-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
