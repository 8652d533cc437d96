//! Conversation Session
//!
//! Information Hiding:
//! - Owns the message list of the active conversation only
//! - An ownership marker plus a switch generation decide whether a finished
//!   load or reply may touch the in-memory list
//! - Saves are serialized and always keyed by the id captured when the data was produced
//! - Local writes happen inline; remote writes are queued to a background writer
//! - Empty lists are never saved

use super::registry::ConversationRegistry;
use super::writer::RemoteWriterHandle;
use crate::config::ChatPreferences;
use crate::core::history::build_outbound_history;
use crate::core::message::{ConversationRecord, Message};
use crate::core::ollama::ModelClient;
use crate::storage::{LocalStore, RemoteStore};
use crate::uploads::Attachments;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// What happened to a send request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Input was blank
    Skipped,
    /// Another send is in flight or the conversation is still loading
    Busy,
    NoConversation,
    Replied(Message),
    /// The model call failed; the stored error message is returned
    Failed(Message),
}

#[derive(Debug, Default)]
struct SessionState {
    current_id: Option<String>,
    /// Conversation the in-memory messages belong to; `None` while loading
    owner: Option<String>,
    messages: Vec<Message>,
    input: String,
    /// Replies written to storage while their conversation was not owned
    late_replies: Vec<(String, Message)>,
}

impl SessionState {
    fn owns_current(&self) -> bool {
        self.current_id.is_some() && self.owner == self.current_id
    }
}

/// Holds the loading flag for the lifetime of one send
struct LoadingGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> LoadingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

pub struct ConversationSession {
    registry: Arc<ConversationRegistry>,
    remote: Arc<dyn RemoteStore>,
    local: LocalStore,
    writer: RemoteWriterHandle,
    model_client: Arc<dyn ModelClient>,
    preferences: Arc<RwLock<ChatPreferences>>,
    state: Mutex<SessionState>,
    generation: AtomicU64,
    loading: AtomicBool,
    save_lock: Mutex<()>,
}

impl ConversationSession {
    /// Spawns the remote writer, so this must run inside a Tokio runtime
    pub fn new(
        registry: Arc<ConversationRegistry>,
        remote: Arc<dyn RemoteStore>,
        local: LocalStore,
        model_client: Arc<dyn ModelClient>,
        preferences: Arc<RwLock<ChatPreferences>>,
    ) -> Self {
        let writer = RemoteWriterHandle::new(remote.clone(), registry.clone());
        Self {
            registry,
            remote,
            local,
            writer,
            model_client,
            preferences,
            state: Mutex::new(SessionState::default()),
            generation: AtomicU64::new(0),
            loading: AtomicBool::new(false),
            save_lock: Mutex::new(()),
        }
    }

    /// Follow a change of the active conversation.
    ///
    /// Clears the list at once, then loads the new id. A load that finishes
    /// after a later switch is discarded.
    pub async fn switch_to(&self, id: Option<String>) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut state = self.state.lock().await;
            state.current_id = id.clone();
            state.owner = None;
            state.messages.clear();
        }

        let Some(id) = id else {
            tracing::debug!("[Session] No active conversation");
            return;
        };

        let (mut messages, title) = self.load_messages(&id).await;

        let mut state = self.state.lock().await;
        let still_current = self.generation.load(Ordering::SeqCst) == generation
            && state.current_id.as_deref() == Some(id.as_str());
        if !still_current {
            tracing::debug!("[Session] Discarding stale load of {}", id);
            return;
        }
        let (late, others): (Vec<_>, Vec<_>) = std::mem::take(&mut state.late_replies)
            .into_iter()
            .partition(|(reply_id, _)| *reply_id == id);
        state.late_replies = others;
        for (_, reply) in late {
            if !messages.contains(&reply) {
                messages.push(reply);
            }
        }
        state.messages = messages.clone();
        state.owner = Some(id.clone());
        drop(state);

        if let Some(title) = title {
            self.registry.adopt_loaded_title(&id, &title, &messages).await;
        }
        tracing::debug!("[Session] Loaded {} messages for {}", messages.len(), id);
    }

    /// Remote first; not-found or any failure falls back to the local record.
    /// While remote saves for the id are still queued the local record is newer.
    async fn load_messages(&self, id: &str) -> (Vec<Message>, Option<String>) {
        if self.writer.has_pending(id).await {
            if let Some(record) = self.local.conversation(id) {
                tracing::debug!("[Session] Remote copy of {} is behind, reading local", id);
                return (record.messages, Some(record.title));
            }
        }

        match self.remote.load(self.registry.user_id(), id).await {
            Ok(Some(stored)) => return (stored.messages, Some(stored.title)),
            Ok(None) => tracing::debug!("[Session] No remote row for {}, reading local", id),
            Err(e) => tracing::warn!("[Session] Remote load of {} failed, reading local: {}", id, e),
        }

        match self.local.conversation(id) {
            Some(record) => (record.messages, Some(record.title)),
            None => (Vec::new(), None),
        }
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.state.lock().await.messages.clone()
    }

    pub async fn current_id(&self) -> Option<String> {
        self.state.lock().await.current_id.clone()
    }

    /// True once the in-memory list belongs to the current conversation
    pub async fn is_ready(&self) -> bool {
        self.state.lock().await.owns_current()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    pub async fn input(&self) -> String {
        self.state.lock().await.input.clone()
    }

    pub async fn set_input(&self, text: impl Into<String>) {
        self.state.lock().await.input = text.into();
    }

    /// Append a message (e.g. an upload notice) and save.
    /// Returns false while the conversation is still loading.
    pub async fn add_message(&self, message: Message) -> bool {
        let (id, snapshot) = {
            let mut state = self.state.lock().await;
            if !state.owns_current() {
                return false;
            }
            state.messages.push(message);
            (state.owner.clone(), state.messages.clone())
        };

        if let Some(id) = id {
            self.persist(&id, &snapshot).await;
        }
        true
    }

    /// Send the pending input with the staged attachments
    pub async fn send_message(&self, attachments: &Attachments) -> SendOutcome {
        if self.state.lock().await.input.trim().is_empty() {
            return SendOutcome::Skipped;
        }

        let Some(_guard) = LoadingGuard::acquire(&self.loading) else {
            return SendOutcome::Busy;
        };

        let (id, history, snapshot) = {
            let mut state = self.state.lock().await;
            let Some(id) = state.current_id.clone() else {
                return SendOutcome::NoConversation;
            };
            if !state.owns_current() {
                return SendOutcome::Busy;
            }

            let text = std::mem::take(&mut state.input);
            state.messages.push(Message::user(text));
            let history = state.messages.clone();
            if !attachments.is_empty() {
                state.messages.push(attachments.sending_notice());
            }
            (id, history, state.messages.clone())
        };
        self.persist(&id, &snapshot).await;

        let outbound = build_outbound_history(&history, attachments);
        let model = self.model_for(&id).await;
        let server_url = self.preferences.read().await.server_url().to_string();

        let reply = match self
            .model_client
            .send_chat_message(&server_url, &model, &outbound)
            .await
        {
            Ok(text) => SendOutcome::Replied(Message::assistant(text)),
            Err(e) => {
                tracing::warn!("[Session] Model call for {} failed: {}", id, e);
                SendOutcome::Failed(Message::error(format!("❌ {}", e)))
            }
        };

        if let SendOutcome::Replied(message) | SendOutcome::Failed(message) = &reply {
            self.deliver(&id, message.clone()).await;
        }
        reply
    }

    /// Append a reply to the conversation it was requested for
    async fn deliver(&self, id: &str, message: Message) {
        let in_memory = {
            let mut state = self.state.lock().await;
            if state.owns_current() && state.current_id.as_deref() == Some(id) {
                state.messages.push(message.clone());
                Some(state.messages.clone())
            } else {
                state.late_replies.push((id.to_string(), message.clone()));
                None
            }
        };

        if let Some(snapshot) = in_memory {
            self.persist(id, &snapshot).await;
            return;
        }

        if !self.registry.contains(id).await {
            tracing::debug!("[Session] Dropping reply for deleted conversation {}", id);
            self.state
                .lock()
                .await
                .late_replies
                .retain(|(reply_id, _)| reply_id != id);
            return;
        }

        tracing::debug!("[Session] Routing late reply to stored record of {}", id);
        let mut messages = self
            .local
            .conversation(id)
            .map(|record| record.messages)
            .unwrap_or_default();
        messages.push(message);
        self.persist(id, &messages).await;
    }

    /// Wait until every remote save queued so far has been attempted
    pub async fn flush_remote(&self) {
        self.writer.flush().await;
    }

    /// Save a full list under the given id: local now, remote queued
    async fn persist(&self, id: &str, messages: &[Message]) {
        if messages.is_empty() {
            return;
        }
        let _saving = self.save_lock.lock().await;

        let title = match self.registry.explicit_title(id).await {
            Some(title) => title,
            None => self.registry.titles().derive(messages),
        };
        let model = self.registry.conversation_model(id).await;

        let record = ConversationRecord::new(title.clone(), messages.to_vec(), model.clone());
        self.local.save_conversation(id, &record);
        self.local.remember_conversation_id(id);
        self.registry.set_conversation_title(id, &title).await;

        self.writer.save(id, &title, messages, model).await;
    }

    /// Conversation's own model, else the global preference
    async fn model_for(&self, id: &str) -> String {
        match self.registry.conversation_model(id).await {
            Some(model) => model,
            None => self.preferences.read().await.model().to_string(),
        }
    }
}
