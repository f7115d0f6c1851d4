//! Behavioral tests for the turn orchestrator's fallback policy, using
//! in-memory stand-ins for the store and the three gateways.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use vaani_agent::{
    AgentError, AudioArtifact, AudioSource, ChatMessage, HistoryStore, KvListStore,
    ReplyGenerator, Role, SpeechSynthesizer, SpeechToText, TurnEngine, TurnOutcome,
    DEFAULT_FALLBACK_REPLY,
};

#[derive(Default)]
struct MemoryKv {
    lists: Mutex<HashMap<String, Vec<String>>>,
}

#[async_trait]
impl KvListStore for MemoryKv {
    async fn lpush(&self, key: &str, value: &str) -> Result<(), AgentError> {
        self.lists
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .insert(0, value.to_string());
        Ok(())
    }

    async fn ltrim(&self, key: &str, _start: i64, stop: i64) -> Result<(), AgentError> {
        let mut lists = self.lists.lock().unwrap();
        if let Some(list) = lists.get_mut(key) {
            list.truncate(stop.max(0) as usize + 1);
        }
        Ok(())
    }

    async fn expire(&self, _key: &str, _seconds: u64) -> Result<(), AgentError> {
        Ok(())
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, AgentError> {
        let lists = self.lists.lock().unwrap();
        let Some(list) = lists.get(key) else {
            return Ok(Vec::new());
        };
        let start = start.max(0) as usize;
        let stop = (stop.max(0) as usize).min(list.len().saturating_sub(1));
        if start >= list.len() {
            return Ok(Vec::new());
        }
        Ok(list[start..=stop].to_vec())
    }
}

impl MemoryKv {
    /// Stored records for a session, most-recent-first as on the wire.
    fn records(&self, session_id: &str) -> Vec<String> {
        self.lists
            .lock()
            .unwrap()
            .get(&format!("session:{}:history", session_id))
            .cloned()
            .unwrap_or_default()
    }
}

/// Scripted transcriber: `Ok(text)` or a transcription error.
struct FakeStt(Result<String, ()>);

#[async_trait]
impl SpeechToText for FakeStt {
    async fn transcribe_url(&self, _url: &str, _language: &str) -> Result<String, AgentError> {
        self.0
            .clone()
            .map_err(|_| AgentError::Transcribe("model unavailable".into()))
    }

    async fn transcribe_bytes(&self, _audio: &[u8], _language: &str) -> Result<String, AgentError> {
        self.transcribe_url("", "").await
    }
}

/// Scripted generator that records the history it was handed.
struct FakeGenerator {
    reply: Result<String, ()>,
    seen: Mutex<Vec<Vec<ChatMessage>>>,
}

impl FakeGenerator {
    fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn failing() -> Self {
        Self {
            reply: Err(()),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReplyGenerator for FakeGenerator {
    async fn generate(&self, history: &[ChatMessage]) -> Result<String, AgentError> {
        self.seen.lock().unwrap().push(history.to_vec());
        self.reply
            .clone()
            .map_err(|_| AgentError::Generate("backend unreachable".into()))
    }
}

/// Scripted synthesizer that records the text it was asked to render.
struct FakeSynthesizer {
    ok: bool,
    seen: Mutex<Vec<String>>,
}

impl FakeSynthesizer {
    fn working() -> Self {
        Self {
            ok: true,
            seen: Mutex::new(Vec::new()),
        }
    }

    fn failing() -> Self {
        Self {
            ok: false,
            seen: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<AudioArtifact, AgentError> {
        self.seen.lock().unwrap().push(text.to_string());
        if self.ok {
            Ok(AudioArtifact {
                file_name: "abc123.mp3".to_string(),
                path: PathBuf::from("/tmp/media/abc123.mp3"),
            })
        } else {
            Err(AgentError::Synthesize("hosted backend down".into()))
        }
    }
}

fn engine_with(
    kv: Arc<MemoryKv>,
    stt: FakeStt,
    generator: Arc<FakeGenerator>,
    synthesizer: Arc<FakeSynthesizer>,
) -> TurnEngine {
    TurnEngine::new(
        HistoryStore::new(kv, 20, 3600),
        Arc::new(stt),
        generator,
        synthesizer,
    )
}

#[tokio::test]
async fn missing_audio_reprompts_without_history_writes() {
    let kv = Arc::new(MemoryKv::default());
    let generator = Arc::new(FakeGenerator::replying("hello"));
    let synthesizer = Arc::new(FakeSynthesizer::working());
    let engine = engine_with(
        kv.clone(),
        FakeStt(Ok("ignored".into())),
        generator.clone(),
        synthesizer.clone(),
    );

    let outcome = engine.handle_recorded_audio("call-1", None, "hi").await;

    assert!(matches!(outcome, TurnOutcome::RePrompt));
    assert!(kv.records("call-1").is_empty());
    assert!(generator.calls().is_empty());
    assert!(synthesizer.calls().is_empty());
}

#[tokio::test]
async fn empty_transcription_reprompts_without_history_writes() {
    let kv = Arc::new(MemoryKv::default());
    let generator = Arc::new(FakeGenerator::replying("hello"));
    let synthesizer = Arc::new(FakeSynthesizer::working());
    let engine = engine_with(
        kv.clone(),
        FakeStt(Ok("   ".into())),
        generator.clone(),
        synthesizer.clone(),
    );

    let outcome = engine
        .handle_recorded_audio(
            "call-1",
            Some(AudioSource::Url("https://example.com/rec.mp3".into())),
            "hi",
        )
        .await;

    assert!(matches!(outcome, TurnOutcome::RePrompt));
    assert!(kv.records("call-1").is_empty());
    assert!(generator.calls().is_empty());
}

#[tokio::test]
async fn transcription_error_is_treated_as_silence() {
    let kv = Arc::new(MemoryKv::default());
    let generator = Arc::new(FakeGenerator::replying("hello"));
    let synthesizer = Arc::new(FakeSynthesizer::working());
    let engine = engine_with(
        kv.clone(),
        FakeStt(Err(())),
        generator.clone(),
        synthesizer.clone(),
    );

    let outcome = engine
        .handle_recorded_audio(
            "call-1",
            Some(AudioSource::Bytes(vec![0u8; 16])),
            "hi",
        )
        .await;

    assert!(matches!(outcome, TurnOutcome::RePrompt));
    assert!(kv.records("call-1").is_empty());
}

#[tokio::test]
async fn successful_turn_records_both_messages_and_returns_audio() {
    let kv = Arc::new(MemoryKv::default());
    let generator = Arc::new(FakeGenerator::replying(
        "Haan, chai pee li! Aap kaise hain?",
    ));
    let synthesizer = Arc::new(FakeSynthesizer::working());
    let engine = engine_with(
        kv.clone(),
        FakeStt(Ok("chai pee li?".into())),
        generator.clone(),
        synthesizer.clone(),
    );

    let outcome = engine
        .handle_recorded_audio(
            "call-1",
            Some(AudioSource::Url("https://example.com/rec.mp3".into())),
            "hi",
        )
        .await;

    match outcome {
        TurnOutcome::Done {
            artifact,
            reply_text,
        } => {
            assert_eq!(artifact.file_name, "abc123.mp3");
            assert_eq!(reply_text, "Haan, chai pee li! Aap kaise hain?");
        }
        other => panic!("expected Done, got {:?}", other),
    }

    // Wire order is most-recent-first: assistant on top of user.
    let records = kv.records("call-1");
    assert_eq!(
        records,
        vec![
            "assistant::Haan, chai pee li! Aap kaise hain?".to_string(),
            "user::chai pee li?".to_string(),
        ]
    );

    // The generator saw exactly one copy of the new utterance, last.
    let calls = generator.calls();
    assert_eq!(calls.len(), 1);
    let seen = &calls[0];
    assert_eq!(seen.last().unwrap().content, "chai pee li?");
    assert_eq!(
        seen.iter().filter(|m| m.content == "chai pee li?").count(),
        1
    );
}

#[tokio::test]
async fn generator_sees_prior_history_in_chronological_order() {
    let kv = Arc::new(MemoryKv::default());
    let generator = Arc::new(FakeGenerator::replying("reply two"));
    let synthesizer = Arc::new(FakeSynthesizer::working());
    let engine = engine_with(
        kv.clone(),
        FakeStt(Ok("second question".into())),
        generator.clone(),
        synthesizer.clone(),
    );

    // Seed a prior turn.
    let store = HistoryStore::new(kv.clone(), 20, 3600);
    store.append("call-1", Role::User, "first question").await;
    store.append("call-1", Role::Assistant, "first reply").await;

    engine
        .handle_recorded_audio(
            "call-1",
            Some(AudioSource::Bytes(vec![1u8; 16])),
            "hi",
        )
        .await;

    let seen = &generator.calls()[0];
    let contents: Vec<&str> = seen.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(
        contents,
        vec!["first question", "first reply", "second question"]
    );
}

#[tokio::test]
async fn user_turn_is_recorded_even_when_generation_fails() {
    let kv = Arc::new(MemoryKv::default());
    let generator = Arc::new(FakeGenerator::failing());
    let synthesizer = Arc::new(FakeSynthesizer::working());
    let engine = engine_with(
        kv.clone(),
        FakeStt(Ok("chai pee li?".into())),
        generator.clone(),
        synthesizer.clone(),
    );

    let outcome = engine
        .handle_recorded_audio(
            "call-1",
            Some(AudioSource::Bytes(vec![1u8; 16])),
            "hi",
        )
        .await;

    // Fallback reply is recorded AND synthesized — text never diverges.
    let records = kv.records("call-1");
    assert_eq!(records.len(), 2);
    assert_eq!(
        records[0],
        format!("assistant::{}", DEFAULT_FALLBACK_REPLY)
    );
    assert_eq!(records[1], "user::chai pee li?");
    assert_eq!(synthesizer.calls(), vec![DEFAULT_FALLBACK_REPLY.to_string()]);

    match outcome {
        TurnOutcome::Done { reply_text, .. } => {
            assert_eq!(reply_text, DEFAULT_FALLBACK_REPLY)
        }
        other => panic!("expected Done with fallback reply, got {:?}", other),
    }
}

#[tokio::test]
async fn synthesis_failure_degrades_to_text_only() {
    let kv = Arc::new(MemoryKv::default());
    let generator = Arc::new(FakeGenerator::replying("visit this weekend!"));
    let synthesizer = Arc::new(FakeSynthesizer::failing());
    let engine = engine_with(
        kv.clone(),
        FakeStt(Ok("when can I visit?".into())),
        generator.clone(),
        synthesizer.clone(),
    );

    let outcome = engine
        .handle_recorded_audio(
            "call-1",
            Some(AudioSource::Bytes(vec![1u8; 16])),
            "hi",
        )
        .await;

    match outcome {
        TurnOutcome::TextOnly { reply_text } => {
            assert_eq!(reply_text, "visit this weekend!")
        }
        other => panic!("expected TextOnly, got {:?}", other),
    }

    // History already holds the completed generation step.
    let records = kv.records("call-1");
    assert_eq!(records[0], "assistant::visit this weekend!");
    assert_eq!(records[1], "user::when can I visit?");
}

#[tokio::test]
async fn recognized_text_path_skips_transcription() {
    let kv = Arc::new(MemoryKv::default());
    let generator = Arc::new(FakeGenerator::replying("achha!"));
    let synthesizer = Arc::new(FakeSynthesizer::working());
    // Transcriber that would error if consulted.
    let engine = engine_with(kv.clone(), FakeStt(Err(())), generator.clone(), synthesizer);

    let outcome = engine
        .handle_recognized_text("ws-1", "namaste kaise ho")
        .await;

    assert!(matches!(outcome, TurnOutcome::Done { .. }));
    assert_eq!(kv.records("ws-1")[1], "user::namaste kaise ho");
}

#[tokio::test]
async fn blank_recognized_text_reprompts() {
    let kv = Arc::new(MemoryKv::default());
    let generator = Arc::new(FakeGenerator::replying("achha!"));
    let synthesizer = Arc::new(FakeSynthesizer::working());
    let engine = engine_with(
        kv.clone(),
        FakeStt(Ok(String::new())),
        generator.clone(),
        synthesizer,
    );

    let outcome = engine.handle_recognized_text("ws-1", "   ").await;
    assert!(matches!(outcome, TurnOutcome::RePrompt));
    assert!(kv.records("ws-1").is_empty());
}
