//! Conversation Registry
//!
//! Information Hiding:
//! - Owns the conversation list and the active-id pointer
//! - Remote-first reads with a Local Store fallback
//! - Remote writes are best-effort: failures are logged and swallowed
//! - Local Store is written before the remote so the UI never waits on the network

use crate::core::message::{
    now_timestamp, ConversationRecord, ConversationSummary, Message, TitlePolicy,
};
use crate::storage::{LocalStore, RemoteStore};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
struct RegistryState {
    conversations: Vec<ConversationSummary>,
    active_id: Option<String>,
    /// Ids whose title was set by an explicit rename
    renamed: HashSet<String>,
    ready: bool,
}

impl RegistryState {
    /// Stamp an entry as just updated and move it to the front of the list
    fn touch(&mut self, id: &str) -> Option<&mut ConversationSummary> {
        let index = self.conversations.iter().position(|c| c.id == id)?;
        let mut entry = self.conversations.remove(index);
        entry.updated_at = Utc::now();
        self.conversations.insert(0, entry);
        self.conversations.first_mut()
    }
}

pub struct ConversationRegistry {
    remote: Arc<dyn RemoteStore>,
    local: LocalStore,
    user_id: String,
    titles: TitlePolicy,
    state: RwLock<RegistryState>,
}

impl ConversationRegistry {
    pub fn new(remote: Arc<dyn RemoteStore>, local: LocalStore, titles: TitlePolicy) -> Self {
        let user_id = local.user_id();
        Self {
            remote,
            local,
            user_id,
            titles,
            state: RwLock::new(RegistryState::default()),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn titles(&self) -> &TitlePolicy {
        &self.titles
    }

    /// Load the list once and pick the active conversation.
    ///
    /// Never leaves the registry with zero conversations. Calling it again
    /// after a successful bootstrap returns the current active id.
    pub async fn initialize(&self, default_model: &str) -> Option<String> {
        if self.state.read().await.ready {
            return self.active_id().await;
        }

        self.migrate_legacy_history(default_model).await;

        match self.remote.list(&self.user_id).await {
            Ok(list) if !list.is_empty() => {
                let remembered = self.local.active_id();
                let active = remembered
                    .filter(|id| list.iter().any(|c| &c.id == id))
                    .or_else(|| list.first().map(|c| c.id.clone()));
                tracing::info!(
                    "[Registry] Loaded {} conversations from remote store",
                    list.len()
                );
                self.install(list, active).await;
            }
            Ok(_) => {
                tracing::info!("[Registry] No conversations yet, creating the first one");
                self.state.write().await.ready = true;
                self.new_chat(default_model).await;
            }
            Err(e) => {
                tracing::warn!("[Registry] Remote list failed, using local index: {}", e);
                let list = self.local_summaries();
                if list.is_empty() {
                    self.state.write().await.ready = true;
                    self.new_chat(default_model).await;
                } else {
                    let active = self
                        .local
                        .active_id()
                        .filter(|id| list.iter().any(|c| &c.id == id))
                        .or_else(|| list.first().map(|c| c.id.clone()));
                    self.install(list, active).await;
                }
            }
        }

        self.active_id().await
    }

    /// Create an empty conversation, make it active and return its id
    pub async fn new_chat(&self, model: &str) -> String {
        let id = Uuid::new_v4().to_string();
        let placeholder = self.titles.placeholder.clone();
        let model = Some(model.to_string()).filter(|m| !m.trim().is_empty());

        let record = ConversationRecord::new(placeholder.clone(), Vec::new(), model.clone());
        self.local.save_conversation(&id, &record);
        self.local.remember_conversation_id(&id);

        if let Err(e) = self
            .remote
            .save(&self.user_id, &id, &placeholder, &[], model.as_deref())
            .await
        {
            tracing::warn!("[Registry] Remote create of '{}' failed: {}", id, e);
        }

        {
            let mut state = self.state.write().await;
            state
                .conversations
                .insert(0, ConversationSummary::new(id.clone(), placeholder, model));
            state.active_id = Some(id.clone());
            state.ready = true;
        }
        self.local.set_active_id(Some(&id));

        tracing::info!("[Registry] Created conversation {}", id);
        id
    }

    /// Point the registry at a known conversation. Returns false for unknown ids.
    pub async fn select_chat(&self, id: &str) -> bool {
        let mut state = self.state.write().await;
        if !state.conversations.iter().any(|c| c.id == id) {
            tracing::warn!("[Registry] Ignoring select of unknown conversation {}", id);
            return false;
        }
        state.active_id = Some(id.to_string());
        drop(state);

        self.local.set_active_id(Some(id));
        tracing::debug!("[Registry] Selected {}", id);
        true
    }

    /// Remove a conversation everywhere and return the active id afterwards
    pub async fn delete_chat(&self, id: &str) -> Option<String> {
        if let Err(e) = self.remote.delete(&self.user_id, id).await {
            tracing::warn!("[Registry] Remote delete of '{}' failed: {}", id, e);
        }
        self.local.delete_conversation(id);
        self.local.forget_conversation_id(id);

        let mut state = self.state.write().await;
        state.conversations.retain(|c| c.id != id);
        state.renamed.remove(id);

        if state.active_id.as_deref() == Some(id) {
            let next = state.conversations.first().map(|c| c.id.clone());
            state.active_id = next.clone();
            self.local.set_active_id(next.as_deref());
            tracing::info!("[Registry] Deleted active conversation {}, now {:?}", id, next);
        } else {
            tracing::info!("[Registry] Deleted conversation {}", id);
        }

        state.active_id.clone()
    }

    /// Explicit rename. Blank input resets to the placeholder.
    pub async fn rename_conversation(&self, id: &str, title: &str) -> String {
        let title = self.titles.normalize(title);

        {
            let mut state = self.state.write().await;
            if let Some(entry) = state.touch(id) {
                entry.title = title.clone();
            }
            if title == self.titles.placeholder {
                state.renamed.remove(id);
            } else {
                state.renamed.insert(id.to_string());
            }
        }

        if let Some(mut record) = self.local.conversation(id) {
            record.title = title.clone();
            record.updated_at = now_timestamp();
            self.local.save_conversation(id, &record);
        }

        if let Err(e) = self.remote.update_title(&self.user_id, id, &title).await {
            tracing::warn!("[Registry] Remote rename of '{}' failed: {}", id, e);
        }

        title
    }

    /// Title derived by the session from the messages; in-memory only
    pub async fn set_conversation_title(&self, id: &str, title: &str) {
        if title.is_empty() {
            return;
        }
        let mut state = self.state.write().await;
        if let Some(entry) = state.touch(id) {
            entry.title = title.to_string();
        }
    }

    /// Title to keep when saving, if the user renamed the conversation
    pub async fn explicit_title(&self, id: &str) -> Option<String> {
        let state = self.state.read().await;
        if !state.renamed.contains(id) {
            return None;
        }
        state
            .conversations
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.title.clone())
    }

    /// Mark a loaded title as user-chosen when it does not match what the
    /// messages would derive
    pub async fn adopt_loaded_title(&self, id: &str, title: &str, messages: &[Message]) {
        if messages.is_empty()
            || title == self.titles.placeholder
            || title == self.titles.derive(messages)
        {
            return;
        }
        let mut state = self.state.write().await;
        if let Some(entry) = state.conversations.iter_mut().find(|c| c.id == id) {
            entry.title = title.to_string();
        }
        state.renamed.insert(id.to_string());
    }

    pub async fn set_conversation_model(&self, id: &str, model: &str) {
        let model = model.trim();
        if model.is_empty() {
            return;
        }

        {
            let mut state = self.state.write().await;
            if let Some(entry) = state.touch(id) {
                entry.model = Some(model.to_string());
            }
        }

        if let Some(mut record) = self.local.conversation(id) {
            record.model = Some(model.to_string());
            record.updated_at = now_timestamp();
            self.local.save_conversation(id, &record);
        }

        if let Err(e) = self.remote.update_model(&self.user_id, id, model).await {
            tracing::warn!("[Registry] Remote model update of '{}' failed: {}", id, e);
        }
        tracing::info!("[Registry] Conversation {} now uses {}", id, model);
    }

    pub async fn conversation_model(&self, id: &str) -> Option<String> {
        let state = self.state.read().await;
        state
            .conversations
            .iter()
            .find(|c| c.id == id)
            .and_then(|c| c.model.clone())
    }

    /// Re-list from the remote. On failure the list is rebuilt from the
    /// local index and the active pointer is left alone.
    pub async fn refresh(&self) -> Option<String> {
        match self.remote.list(&self.user_id).await {
            Ok(list) => {
                let mut state = self.state.write().await;
                let keep = state
                    .active_id
                    .as_ref()
                    .filter(|id| list.iter().any(|c| &c.id == *id))
                    .cloned();
                let active = keep.or_else(|| list.first().map(|c| c.id.clone()));
                if list.is_empty() {
                    state.conversations = list;
                    return state.active_id.clone();
                }
                state.conversations = list;
                if state.active_id != active {
                    state.active_id = active.clone();
                    self.local.set_active_id(active.as_deref());
                }
                tracing::debug!("[Registry] Refreshed {} conversations", state.conversations.len());
                state.active_id.clone()
            }
            Err(e) => {
                tracing::warn!("[Registry] Refresh failed, using local index: {}", e);
                let list = self.local_summaries();
                let mut state = self.state.write().await;
                state.conversations = list;
                state.active_id.clone()
            }
        }
    }

    pub async fn conversations(&self) -> Vec<ConversationSummary> {
        self.state.read().await.conversations.clone()
    }

    pub async fn active_id(&self) -> Option<String> {
        self.state.read().await.active_id.clone()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.state.read().await.conversations.iter().any(|c| c.id == id)
    }

    pub async fn is_ready(&self) -> bool {
        self.state.read().await.ready
    }

    async fn install(&self, list: Vec<ConversationSummary>, active: Option<String>) {
        let mut state = self.state.write().await;
        state.conversations = list;
        state.active_id = active.clone();
        state.ready = true;
        drop(state);

        self.local.set_active_id(active.as_deref());
    }

    /// Metadata for every id in the local index, from the local records when present
    fn local_summaries(&self) -> Vec<ConversationSummary> {
        self.local
            .conversation_ids()
            .into_iter()
            .map(|id| match self.local.conversation(&id) {
                Some(record) => ConversationSummary {
                    title: if record.title.trim().is_empty() {
                        self.titles.placeholder.clone()
                    } else {
                        record.title.clone()
                    },
                    updated_at: record.updated_at().unwrap_or_else(Utc::now),
                    model: record.model,
                    id,
                },
                None => ConversationSummary::new(id, self.titles.placeholder.clone(), None),
            })
            .collect()
    }

    /// Move a single-history layout into its own conversation
    async fn migrate_legacy_history(&self, default_model: &str) {
        let messages = self.local.legacy_history();
        if messages.is_empty() {
            return;
        }

        let id = Uuid::new_v4().to_string();
        let title = self.titles.derive(&messages);
        let model = Some(default_model.to_string()).filter(|m| !m.trim().is_empty());
        let record = ConversationRecord::new(title.clone(), messages.clone(), model.clone());

        self.local.save_conversation(&id, &record);
        self.local.remember_conversation_id(&id);
        if self.local.active_id().is_none() {
            self.local.set_active_id(Some(&id));
        }

        if let Err(e) = self
            .remote
            .save(&self.user_id, &id, &title, &messages, model.as_deref())
            .await
        {
            tracing::warn!("[Registry] Remote save of migrated history failed: {}", e);
        }

        self.local.clear_legacy_history();
        tracing::info!(
            "[Registry] Migrated {} legacy messages into conversation {}",
            messages.len(),
            id
        );
    }
}
