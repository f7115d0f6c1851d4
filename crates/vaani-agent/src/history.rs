//! Bounded, session-scoped conversation history.
//!
//! The store wraps an external Redis-compatible key-value collaborator
//! reached over its REST interface. Each session's history is a capped list
//! of `role::content` records, most-recent-first on the wire, with a TTL
//! refreshed on every write. When the collaborator is unreachable or not
//! configured, reads come back empty and writes are no-ops — the agent
//! degrades to stateless single-turn behavior instead of failing calls.

use crate::error::AgentError;
use crate::message::{ChatMessage, Role};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Timeout for key-value store REST calls. History is an enhancement, not a
/// dependency; a slow store must not stall the call pipeline.
const KV_TIMEOUT: Duration = Duration::from_secs(5);

/// The external key-value collaborator, reduced to the four list commands
/// the history store needs.
#[async_trait]
pub trait KvListStore: Send + Sync {
    async fn lpush(&self, key: &str, value: &str) -> Result<(), AgentError>;
    async fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<(), AgentError>;
    async fn expire(&self, key: &str, seconds: u64) -> Result<(), AgentError>;
    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, AgentError>;
}

/// Redis-over-REST client (Upstash-style). Commands are posted as a JSON
/// array to the base URL with a bearer token; replies arrive as
/// `{"result": ...}`.
#[derive(Debug, Clone)]
pub struct RestKv {
    base_url: String,
    token: String,
    http: reqwest::Client,
}

impl RestKv {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            http: reqwest::Client::new(),
        }
    }

    async fn command(&self, cmd: Vec<String>) -> Result<Value, AgentError> {
        let response = self
            .http
            .post(&self.base_url)
            .bearer_auth(&self.token)
            .json(&cmd)
            .timeout(KV_TIMEOUT)
            .send()
            .await
            .map_err(|e| AgentError::Storage(format!("kv request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AgentError::Storage(format!(
                "kv returned status {}",
                response.status()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AgentError::Storage(format!("kv response decode failed: {}", e)))?;

        match body.get("result") {
            Some(result) => Ok(result.clone()),
            None => Err(AgentError::Storage(format!(
                "kv response missing result: {}",
                body
            ))),
        }
    }
}

#[async_trait]
impl KvListStore for RestKv {
    async fn lpush(&self, key: &str, value: &str) -> Result<(), AgentError> {
        self.command(vec!["LPUSH".into(), key.into(), value.into()])
            .await
            .map(|_| ())
    }

    async fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<(), AgentError> {
        self.command(vec![
            "LTRIM".into(),
            key.into(),
            start.to_string(),
            stop.to_string(),
        ])
        .await
        .map(|_| ())
    }

    async fn expire(&self, key: &str, seconds: u64) -> Result<(), AgentError> {
        self.command(vec!["EXPIRE".into(), key.into(), seconds.to_string()])
            .await
            .map(|_| ())
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, AgentError> {
        let result = self
            .command(vec![
                "LRANGE".into(),
                key.into(),
                start.to_string(),
                stop.to_string(),
            ])
            .await?;

        match result {
            Value::Array(items) => Ok(items
                .into_iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()),
            other => Err(AgentError::Storage(format!(
                "kv lrange returned non-array: {}",
                other
            ))),
        }
    }
}

/// Bounded conversation log keyed by opaque session id.
///
/// Owns the cap and ordering contracts: at most `max_messages` records are
/// retained per session (oldest evicted), and [`HistoryStore::load`] always
/// hands back chronological order even though the wire holds
/// most-recent-first.
#[derive(Clone)]
pub struct HistoryStore {
    backend: Option<Arc<dyn KvListStore>>,
    max_messages: usize,
    ttl_seconds: u64,
}

impl HistoryStore {
    pub fn new(backend: Arc<dyn KvListStore>, max_messages: usize, ttl_seconds: u64) -> Self {
        Self {
            backend: Some(backend),
            max_messages,
            ttl_seconds,
        }
    }

    /// A store with no backend: loads are empty, appends are no-ops.
    pub fn disabled() -> Self {
        Self {
            backend: None,
            max_messages: 0,
            ttl_seconds: 0,
        }
    }

    fn key(session_id: &str) -> String {
        format!("session:{}:history", session_id)
    }

    /// Loads the session's history in chronological order, at most
    /// `max_messages` entries. Empty on any failure; never errors.
    pub async fn load(&self, session_id: &str) -> Vec<ChatMessage> {
        let Some(backend) = &self.backend else {
            return Vec::new();
        };
        // A zero cap retains nothing. Guarded explicitly because the
        // (0, -1) range forms below mean "whole list" to the store.
        if self.max_messages == 0 {
            return Vec::new();
        }

        let raw = match backend
            .lrange(&Self::key(session_id), 0, self.max_messages as i64 - 1)
            .await
        {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(session_id = %session_id, "history load failed, continuing without memory: {}", e);
                return Vec::new();
            }
        };

        // Wire order is most-recent-first; reverse into chronological.
        raw.iter()
            .rev()
            .filter_map(|r| ChatMessage::decode(r))
            .collect()
    }

    /// Appends a message as most-recent, trims the list to the cap, and
    /// refreshes the session TTL. Silently a no-op on failure.
    pub async fn append(&self, session_id: &str, role: Role, content: &str) {
        let Some(backend) = &self.backend else {
            return;
        };
        if self.max_messages == 0 {
            return;
        }

        let key = Self::key(session_id);
        let record = ChatMessage {
            role,
            content: content.to_string(),
        }
        .encode();

        if let Err(e) = backend.lpush(&key, &record).await {
            tracing::warn!(session_id = %session_id, "history append failed, turn not persisted: {}", e);
            return;
        }
        if let Err(e) = backend.ltrim(&key, 0, self.max_messages as i64 - 1).await {
            tracing::warn!(session_id = %session_id, "history trim failed: {}", e);
        }
        if let Err(e) = backend.expire(&key, self.ttl_seconds).await {
            tracing::warn!(session_id = %session_id, "history expire failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory stand-in for the external key-value collaborator.
    #[derive(Default)]
    struct MemoryKv {
        lists: Mutex<HashMap<String, Vec<String>>>,
        fail: bool,
    }

    impl MemoryKv {
        fn failing() -> Self {
            Self {
                lists: Mutex::new(HashMap::new()),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl KvListStore for MemoryKv {
        async fn lpush(&self, key: &str, value: &str) -> Result<(), AgentError> {
            if self.fail {
                return Err(AgentError::Storage("kv unavailable".into()));
            }
            let mut lists = self.lists.lock().unwrap();
            lists
                .entry(key.to_string())
                .or_default()
                .insert(0, value.to_string());
            Ok(())
        }

        async fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<(), AgentError> {
            if self.fail {
                return Err(AgentError::Storage("kv unavailable".into()));
            }
            let mut lists = self.lists.lock().unwrap();
            if let Some(list) = lists.get_mut(key) {
                let start = start.max(0) as usize;
                let stop = (stop.max(0) as usize).min(list.len().saturating_sub(1));
                *list = if start <= stop && start < list.len() {
                    list[start..=stop].to_vec()
                } else {
                    Vec::new()
                };
            }
            Ok(())
        }

        async fn expire(&self, _key: &str, _seconds: u64) -> Result<(), AgentError> {
            if self.fail {
                return Err(AgentError::Storage("kv unavailable".into()));
            }
            Ok(())
        }

        async fn lrange(
            &self,
            key: &str,
            start: i64,
            stop: i64,
        ) -> Result<Vec<String>, AgentError> {
            if self.fail {
                return Err(AgentError::Storage("kv unavailable".into()));
            }
            let lists = self.lists.lock().unwrap();
            let Some(list) = lists.get(key) else {
                return Ok(Vec::new());
            };
            let start = start.max(0) as usize;
            let stop = (stop.max(0) as usize).min(list.len().saturating_sub(1));
            if start > stop || start >= list.len() {
                return Ok(Vec::new());
            }
            Ok(list[start..=stop].to_vec())
        }
    }

    #[tokio::test]
    async fn load_returns_chronological_order() {
        let store = HistoryStore::new(Arc::new(MemoryKv::default()), 20, 3600);
        store.append("call-1", Role::User, "namaste").await;
        store.append("call-1", Role::Assistant, "namaste ji").await;
        store.append("call-1", Role::User, "plot available hai?").await;

        let history = store.load("call-1").await;
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].content, "namaste");
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[2].content, "plot available hai?");
    }

    #[tokio::test]
    async fn cap_keeps_only_the_most_recent_messages() {
        let cap = 4;
        let store = HistoryStore::new(Arc::new(MemoryKv::default()), cap, 3600);
        for i in 0..cap + 3 {
            store.append("call-1", Role::User, &format!("turn {}", i)).await;
        }

        let history = store.load("call-1").await;
        assert_eq!(history.len(), cap);
        // Last `cap` messages, still chronological.
        assert_eq!(history[0].content, "turn 3");
        assert_eq!(history[cap - 1].content, "turn 6");
    }

    #[tokio::test]
    async fn zero_cap_retains_nothing() {
        let kv = Arc::new(MemoryKv::default());
        let store = HistoryStore::new(kv.clone(), 0, 3600);
        store.append("call-1", Role::User, "never kept").await;

        assert!(store.load("call-1").await.is_empty());
        assert!(kv.lists.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let store = HistoryStore::new(Arc::new(MemoryKv::default()), 20, 3600);
        store.append("call-1", Role::User, "hello from one").await;
        store.append("call-2", Role::User, "hello from two").await;

        assert_eq!(store.load("call-1").await.len(), 1);
        assert_eq!(store.load("call-2").await[0].content, "hello from two");
    }

    #[tokio::test]
    async fn unavailable_backend_degrades_to_noop() {
        let store = HistoryStore::new(Arc::new(MemoryKv::failing()), 20, 3600);
        store.append("call-1", Role::User, "lost turn").await;
        assert!(store.load("call-1").await.is_empty());
    }

    #[tokio::test]
    async fn disabled_store_is_empty_and_silent() {
        let store = HistoryStore::disabled();
        store.append("call-1", Role::User, "nowhere to go").await;
        assert!(store.load("call-1").await.is_empty());
    }

    #[tokio::test]
    async fn undecodable_records_are_skipped() {
        let kv = Arc::new(MemoryKv::default());
        kv.lpush("session:call-1:history", "garbage-without-separator")
            .await
            .unwrap();
        kv.lpush("session:call-1:history", "user::kaise ho").await.unwrap();

        let store = HistoryStore::new(kv, 20, 3600);
        let history = store.load("call-1").await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "kaise ho");
    }
}
