//! Chat application facade
//!
//! Information Hiding:
//! - Wires the registry, the session, the stores and the model client together
//! - Keeps the session following the registry's active conversation
//! - Owns the staged attachments of the compose area

use crate::config::{ChatPreferences, RemoteBackend, Settings};
use crate::conversation::{ConversationRegistry, ConversationSession, SendOutcome};
use crate::core::message::{ConversationSummary, Message, TitlePolicy};
use crate::core::ollama::{ModelClient, OllamaClient};
use crate::storage::{
    FileKv, KeyValueStore, LocalStore, MemoryRemoteStore, OfflineStore, PostgrestStore,
    RemoteStore, SqliteStore,
};
use crate::uploads::{Attachments, UploadError};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Build the remote store selected in the settings
pub fn remote_store_from_settings(settings: &Settings) -> Result<Arc<dyn RemoteStore>> {
    let remote = &settings.remote;
    let store: Arc<dyn RemoteStore> = match remote.backend {
        RemoteBackend::Postgrest => {
            if remote.url.trim().is_empty() {
                anyhow::bail!("remote.url must be set for the postgrest backend");
            }
            Arc::new(PostgrestStore::new(&remote.url, &remote.api_key, &remote.table))
        }
        RemoteBackend::Sqlite => Arc::new(
            SqliteStore::open(&remote.sqlite_path)
                .with_context(|| format!("Failed to open {:?}", remote.sqlite_path))?,
        ),
        RemoteBackend::Memory => Arc::new(MemoryRemoteStore::new()),
        RemoteBackend::Offline => Arc::new(OfflineStore::new()),
    };

    tracing::info!("[ChatApp] Remote backend: {:?}", remote.backend);
    Ok(store)
}

pub struct ChatApp {
    local: LocalStore,
    registry: Arc<ConversationRegistry>,
    session: Arc<ConversationSession>,
    model_client: Arc<dyn ModelClient>,
    preferences: Arc<RwLock<ChatPreferences>>,
    attachments: Mutex<Attachments>,
}

impl ChatApp {
    pub fn new(
        settings: &Settings,
        remote: Arc<dyn RemoteStore>,
        kv: Arc<dyn KeyValueStore>,
        model_client: Arc<dyn ModelClient>,
    ) -> Self {
        let local = LocalStore::new(kv);
        let titles = TitlePolicy::new(
            settings.conversation.default_title.clone(),
            settings.conversation.title_max_chars,
        );
        let preferences = Arc::new(RwLock::new(ChatPreferences::load(&local, settings)));
        let registry = Arc::new(ConversationRegistry::new(
            remote.clone(),
            local.clone(),
            titles,
        ));
        let session = Arc::new(ConversationSession::new(
            registry.clone(),
            remote,
            local.clone(),
            model_client.clone(),
            preferences.clone(),
        ));

        Self {
            local,
            registry,
            session,
            model_client,
            preferences,
            attachments: Mutex::new(Attachments::new()),
        }
    }

    /// Stores and model client as configured: file-backed local store under
    /// `local.data_dir`, remote backend per `remote.backend`
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let kv = FileKv::new(settings.local.data_dir.clone())?;
        let remote = remote_store_from_settings(settings)?;
        Ok(Self::new(
            settings,
            remote,
            Arc::new(kv),
            Arc::new(OllamaClient::new()),
        ))
    }

    /// Bootstrap the registry and load the active conversation
    pub async fn initialize(&self) -> Option<String> {
        let model = self.preferences.read().await.model().to_string();
        let active = self.registry.initialize(&model).await;
        self.session.switch_to(active.clone()).await;
        active
    }

    pub async fn new_chat(&self) -> String {
        let model = self.preferences.read().await.model().to_string();
        let id = self.registry.new_chat(&model).await;
        self.session.switch_to(Some(id.clone())).await;
        id
    }

    pub async fn select_chat(&self, id: &str) -> bool {
        if !self.registry.select_chat(id).await {
            return false;
        }
        self.follow_active().await;
        true
    }

    pub async fn delete_chat(&self, id: &str) -> Option<String> {
        let active = self.registry.delete_chat(id).await;
        self.follow_active().await;
        active
    }

    /// Delete the conversation on screen; confirmation is the caller's job
    pub async fn delete_current(&self) -> Option<String> {
        match self.session.current_id().await {
            Some(id) => self.delete_chat(&id).await,
            None => None,
        }
    }

    pub async fn rename_conversation(&self, id: &str, title: &str) -> String {
        self.registry.rename_conversation(id, title).await
    }

    pub async fn set_conversation_model(&self, id: &str, model: &str) {
        self.registry.set_conversation_model(id, model).await;
    }

    pub async fn refresh(&self) -> Option<String> {
        let active = self.registry.refresh().await;
        self.follow_active().await;
        active
    }

    /// Send text with whatever is staged
    pub async fn send(&self, text: &str) -> SendOutcome {
        self.session.set_input(text).await;
        let attachments = self.attachments.lock().await.clone();
        self.session.send_message(&attachments).await
    }

    /// Stage files; notices go into the active conversation, rejected files are returned
    pub async fn upload(&self, paths: &[PathBuf]) -> Vec<UploadError> {
        let report = self.attachments.lock().await.ingest(paths).await;
        for notice in report.notices {
            if !self.session.add_message(notice).await {
                tracing::debug!("[ChatApp] Upload notice dropped, conversation still loading");
            }
        }
        report.rejected
    }

    pub async fn clear_uploads(&self) {
        let notice = self.attachments.lock().await.clear();
        self.session.add_message(notice).await;
    }

    pub async fn attachments(&self) -> Attachments {
        self.attachments.lock().await.clone()
    }

    pub async fn list_models(&self) -> Vec<String> {
        let url = self.server_url().await;
        self.model_client.list_models(&url).await
    }

    pub async fn conversations(&self) -> Vec<ConversationSummary> {
        self.registry.conversations().await
    }

    pub async fn active_id(&self) -> Option<String> {
        self.registry.active_id().await
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.session.messages().await
    }

    pub fn is_loading(&self) -> bool {
        self.session.is_loading()
    }

    /// Model the active conversation sends with
    pub async fn active_model(&self) -> String {
        if let Some(id) = self.registry.active_id().await {
            if let Some(model) = self.registry.conversation_model(&id).await {
                return model;
            }
        }
        self.model().await
    }

    pub async fn server_url(&self) -> String {
        self.preferences.read().await.server_url().to_string()
    }

    pub async fn model(&self) -> String {
        self.preferences.read().await.model().to_string()
    }

    pub async fn set_server_url(&self, url: &str) {
        self.preferences.write().await.set_server_url(url);
    }

    pub async fn set_model(&self, model: &str) {
        self.preferences.write().await.set_model(model);
    }

    pub async fn save_preferences(&self) {
        self.preferences.read().await.save(&self.local);
    }

    /// Wait for queued remote saves, e.g. before exiting
    pub async fn flush(&self) {
        self.session.flush_remote().await;
    }

    pub fn registry(&self) -> Arc<ConversationRegistry> {
        self.registry.clone()
    }

    pub fn session(&self) -> Arc<ConversationSession> {
        self.session.clone()
    }

    /// Reload the session when the registry points somewhere else
    async fn follow_active(&self) {
        let active = self.registry.active_id().await;
        if self.session.current_id().await != active {
            self.session.switch_to(active).await;
        }
    }
}
