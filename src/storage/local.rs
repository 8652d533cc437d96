//! Local Store
//!
//! Information Hiding:
//! - Key layout and JSON encoding of on-device state hidden behind typed accessors
//! - Corrupt entries read as absent instead of failing
//! - Never fails: every write is best-effort

use super::kv::KeyValueStore;
use crate::core::message::{ConversationRecord, Message};
use std::sync::Arc;
use uuid::Uuid;

const USER_ID_KEY: &str = "user_id";
const ACTIVE_ID_KEY: &str = "active-conversation-id";
const CONVERSATION_IDS_KEY: &str = "conversation-ids";
const CONVERSATION_KEY_PREFIX: &str = "conversation:";
const LEGACY_HISTORY_KEY: &str = "ollama-chat-history";
pub const SERVER_URL_KEY: &str = "ollama-url";
pub const MODEL_KEY: &str = "ollama-model";

/// Typed view over the on-device key-value store
#[derive(Clone)]
pub struct LocalStore {
    kv: Arc<dyn KeyValueStore>,
}

impl LocalStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Known conversation ids, most recent first
    pub fn conversation_ids(&self) -> Vec<String> {
        self.read_json(CONVERSATION_IDS_KEY).unwrap_or_default()
    }

    pub fn set_conversation_ids(&self, ids: &[String]) {
        self.write_json(CONVERSATION_IDS_KEY, &ids);
    }

    /// Put an id at the front of the index unless it is already known
    pub fn remember_conversation_id(&self, id: &str) {
        let mut ids = self.conversation_ids();
        if ids.iter().any(|known| known == id) {
            return;
        }
        ids.insert(0, id.to_string());
        self.set_conversation_ids(&ids);
    }

    pub fn forget_conversation_id(&self, id: &str) -> Vec<String> {
        let ids: Vec<String> = self
            .conversation_ids()
            .into_iter()
            .filter(|known| known != id)
            .collect();
        self.set_conversation_ids(&ids);
        ids
    }

    pub fn conversation(&self, id: &str) -> Option<ConversationRecord> {
        self.read_json(&Self::conversation_key(id))
    }

    pub fn save_conversation(&self, id: &str, record: &ConversationRecord) {
        self.write_json(&Self::conversation_key(id), record);
    }

    pub fn delete_conversation(&self, id: &str) {
        self.kv.remove(&Self::conversation_key(id));
    }

    pub fn active_id(&self) -> Option<String> {
        self.kv.get(ACTIVE_ID_KEY).filter(|id| !id.is_empty())
    }

    pub fn set_active_id(&self, id: Option<&str>) {
        match id {
            Some(id) => self.kv.set(ACTIVE_ID_KEY, id),
            None => self.kv.remove(ACTIVE_ID_KEY),
        }
    }

    /// Stable per-installation user id, generated on first use
    pub fn user_id(&self) -> String {
        if let Some(id) = self.kv.get(USER_ID_KEY).filter(|id| !id.trim().is_empty()) {
            return id;
        }
        let id = format!("user_{}", &Uuid::new_v4().simple().to_string()[..8]);
        self.kv.set(USER_ID_KEY, &id);
        tracing::info!("[LocalStore] Generated user id {}", id);
        id
    }

    /// Messages saved by the single-conversation layout, if any
    pub fn legacy_history(&self) -> Vec<Message> {
        self.read_json(LEGACY_HISTORY_KEY).unwrap_or_default()
    }

    pub fn clear_legacy_history(&self) {
        self.kv.remove(LEGACY_HISTORY_KEY);
    }

    pub fn save_legacy_history(&self, messages: &[Message]) {
        self.write_json(LEGACY_HISTORY_KEY, &messages);
    }

    /// Raw preference value (server URL, model)
    pub fn preference(&self, key: &str) -> Option<String> {
        self.kv.get(key).filter(|value| !value.trim().is_empty())
    }

    pub fn set_preference(&self, key: &str, value: &str) {
        self.kv.set(key, value);
    }

    fn conversation_key(id: &str) -> String {
        format!("{}{}", CONVERSATION_KEY_PREFIX, id)
    }

    fn read_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.kv.get(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("[LocalStore] Ignoring unreadable entry '{}': {}", key, e);
                None
            }
        }
    }

    fn write_json<T: serde::Serialize + ?Sized>(&self, key: &str, value: &T) {
        match serde_json::to_string(value) {
            Ok(json) => self.kv.set(key, &json),
            Err(e) => tracing::warn!("[LocalStore] Could not encode '{}': {}", key, e),
        }
    }
}
