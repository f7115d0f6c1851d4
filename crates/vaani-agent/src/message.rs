use serde::{Deserialize, Serialize};

/// Who produced a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Stable wire name used in stored records and backend payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// One turn of the conversation. Immutable once appended to history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// Encodes the message as a single `role::content` record for the
    /// key-value store.
    pub fn encode(&self) -> String {
        format!("{}::{}", self.role.as_str(), self.content)
    }

    /// Decodes a stored `role::content` record. Returns `None` for records
    /// that do not split or carry an unknown role; callers skip those.
    pub fn decode(raw: &str) -> Option<ChatMessage> {
        let (role, content) = raw.split_once("::")?;
        Some(ChatMessage {
            role: Role::parse(role)?,
            content: content.to_string(),
        })
    }
}
