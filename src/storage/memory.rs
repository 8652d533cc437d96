//! In-Memory Remote Store
//!
//! Information Hiding:
//! - HashMap row storage hidden from users
//! - Thread-safe access via RwLock hidden behind async interface
//! - Suitable for testing, demos and offline experiments; can simulate an outage

use super::{RemoteStore, StoreError, StoreResult};
use crate::core::message::{ConversationSummary, Message, StoredConversation};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct Row {
    title: String,
    messages: Vec<Message>,
    model: Option<String>,
    updated_at: DateTime<Utc>,
    /// Write counter used to order rows updated within the same instant
    revision: u64,
}

/// In-memory conversation table keyed by (user id, conversation id).
/// Data is lost when process terminates.
pub struct MemoryRemoteStore {
    rows: Arc<RwLock<HashMap<(String, String), Row>>>,
    available: AtomicBool,
    revision: AtomicU64,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self {
            rows: Arc::new(RwLock::new(HashMap::new())),
            available: AtomicBool::new(true),
            revision: AtomicU64::new(0),
        }
    }

    /// Simulate the remote going down (or coming back)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of rows held for a user
    pub async fn row_count(&self, user_id: &str) -> usize {
        let rows = self.rows.read().await;
        rows.keys().filter(|(user, _)| user == user_id).count()
    }

    fn ensure_available(&self) -> StoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("in-memory store switched off".to_string()))
        }
    }

    fn next_revision(&self) -> u64 {
        self.revision.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn key(user_id: &str, id: &str) -> (String, String) {
        (user_id.to_string(), id.to_string())
    }
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn list(&self, user_id: &str) -> StoreResult<Vec<ConversationSummary>> {
        self.ensure_available()?;
        let rows = self.rows.read().await;

        let mut entries: Vec<(&String, &Row)> = rows
            .iter()
            .filter(|((user, _), _)| user == user_id)
            .map(|((_, id), row)| (id, row))
            .collect();
        entries.sort_by(|a, b| {
            (b.1.updated_at, b.1.revision).cmp(&(a.1.updated_at, a.1.revision))
        });

        let summaries: Vec<ConversationSummary> = entries
            .into_iter()
            .map(|(id, row)| ConversationSummary {
                id: id.clone(),
                title: row.title.clone(),
                updated_at: row.updated_at,
                model: row.model.clone(),
            })
            .collect();

        tracing::debug!(
            "[MemoryRemoteStore] Listed {} conversations for '{}'",
            summaries.len(),
            user_id
        );
        Ok(summaries)
    }

    async fn load(&self, user_id: &str, id: &str) -> StoreResult<Option<StoredConversation>> {
        self.ensure_available()?;
        let rows = self.rows.read().await;
        let found = rows.get(&Self::key(user_id, id)).map(|row| StoredConversation {
            messages: row.messages.clone(),
            title: row.title.clone(),
            model: row.model.clone(),
        });
        tracing::debug!(
            "[MemoryRemoteStore] Load '{}' -> {}",
            id,
            if found.is_some() { "hit" } else { "no row" }
        );
        Ok(found)
    }

    async fn save(
        &self,
        user_id: &str,
        id: &str,
        title: &str,
        messages: &[Message],
        model: Option<&str>,
    ) -> StoreResult<()> {
        self.ensure_available()?;
        let revision = self.next_revision();
        let mut rows = self.rows.write().await;
        let key = Self::key(user_id, id);
        let kept_model = rows.get(&key).and_then(|row| row.model.clone());

        rows.insert(
            key,
            Row {
                title: title.to_string(),
                messages: messages.to_vec(),
                model: model.map(str::to_string).or(kept_model),
                updated_at: Utc::now(),
                revision,
            },
        );
        tracing::debug!(
            "[MemoryRemoteStore] Saved {} messages for '{}'",
            messages.len(),
            id
        );
        Ok(())
    }

    async fn update_title(&self, user_id: &str, id: &str, title: &str) -> StoreResult<()> {
        self.ensure_available()?;
        let revision = self.next_revision();
        let mut rows = self.rows.write().await;
        if let Some(row) = rows.get_mut(&Self::key(user_id, id)) {
            row.title = title.to_string();
            row.updated_at = Utc::now();
            row.revision = revision;
        }
        Ok(())
    }

    async fn update_model(&self, user_id: &str, id: &str, model: &str) -> StoreResult<()> {
        self.ensure_available()?;
        let revision = self.next_revision();
        let mut rows = self.rows.write().await;
        if let Some(row) = rows.get_mut(&Self::key(user_id, id)) {
            row.model = Some(model.to_string());
            row.updated_at = Utc::now();
            row.revision = revision;
        }
        Ok(())
    }

    async fn delete(&self, user_id: &str, id: &str) -> StoreResult<()> {
        self.ensure_available()?;
        let mut rows = self.rows.write().await;
        rows.remove(&Self::key(user_id, id));
        tracing::debug!("[MemoryRemoteStore] Deleted '{}'", id);
        Ok(())
    }
}
