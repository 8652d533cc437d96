//! Conversation data model
//!
//! Information Hiding:
//! - Wire field names (camelCase for stored records, snake_case for remote rows) hidden behind serde
//! - Timestamp formatting hidden behind constructors
//! - Title derivation rules kept next to the types they read

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_TITLE: &str = "New chat";
pub const DEFAULT_TITLE_MAX_CHARS: usize = 50;
const TITLE_ELLIPSIS: &str = "...";

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    /// Client-local annotation (upload notices, attachment summaries).
    /// Never sent to the model.
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One turn of a conversation, as displayed and stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// ISO-8601 creation time
    pub timestamp: String,
    /// Set on assistant messages that report a failed model call
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_error: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: now_timestamp(),
            is_error: false,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Assistant message surfacing a failure to the user
    pub fn error(content: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::assistant(content)
        }
    }
}

/// Current time in the same shape as JavaScript's `toISOString`
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Listing metadata for one conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub model: Option<String>,
}

impl ConversationSummary {
    pub fn new(id: impl Into<String>, title: impl Into<String>, model: Option<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            updated_at: Utc::now(),
            model,
        }
    }
}

/// Full record kept by the local store for one conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    pub title: String,
    pub messages: Vec<Message>,
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl ConversationRecord {
    pub fn new(title: impl Into<String>, messages: Vec<Message>, model: Option<String>) -> Self {
        Self {
            title: title.into(),
            messages,
            updated_at: now_timestamp(),
            model,
        }
    }

    /// `updatedAt` parsed back into a timestamp, if it is well formed
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.updated_at)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

/// What the remote store returns for a single conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredConversation {
    #[serde(default)]
    pub messages: Vec<Message>,
    pub title: String,
    #[serde(default)]
    pub model: Option<String>,
}

/// Title rules shared by the registry (renames) and the session (derived titles)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitlePolicy {
    pub placeholder: String,
    pub max_chars: usize,
}

impl Default for TitlePolicy {
    fn default() -> Self {
        Self {
            placeholder: DEFAULT_TITLE.to_string(),
            max_chars: DEFAULT_TITLE_MAX_CHARS,
        }
    }
}

impl TitlePolicy {
    pub fn new(placeholder: impl Into<String>, max_chars: usize) -> Self {
        Self {
            placeholder: placeholder.into(),
            max_chars,
        }
    }

    /// Title taken from the first user message, truncated with an ellipsis
    pub fn derive(&self, messages: &[Message]) -> String {
        messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.trim())
            .find(|content| !content.is_empty())
            .map(|content| self.truncate(content))
            .unwrap_or_else(|| self.placeholder.clone())
    }

    /// Explicit rename input: trimmed, blank falls back to the placeholder
    pub fn normalize(&self, raw: &str) -> String {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            self.placeholder.clone()
        } else {
            trimmed.to_string()
        }
    }

    fn truncate(&self, content: &str) -> String {
        if content.chars().count() <= self.max_chars {
            return content.to_string();
        }
        let mut title: String = content.chars().take(self.max_chars).collect();
        title.push_str(TITLE_ELLIPSIS);
        title
    }
}
