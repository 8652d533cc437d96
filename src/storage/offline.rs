//! Offline Remote Store
//!
//! Stand-in used when no remote backend is configured. Every call fails with
//! `StoreError::Unavailable`, so the registry and session run purely from the
//! local store.

use super::{RemoteStore, StoreError, StoreResult};
use crate::core::message::{ConversationSummary, Message, StoredConversation};
use async_trait::async_trait;

#[derive(Debug, Clone, Default)]
pub struct OfflineStore;

impl OfflineStore {
    pub fn new() -> Self {
        Self
    }

    fn unavailable<T>() -> StoreResult<T> {
        Err(StoreError::Unavailable("no remote store configured".to_string()))
    }
}

#[async_trait]
impl RemoteStore for OfflineStore {
    async fn list(&self, _user_id: &str) -> StoreResult<Vec<ConversationSummary>> {
        Self::unavailable()
    }

    async fn load(&self, _user_id: &str, _id: &str) -> StoreResult<Option<StoredConversation>> {
        Self::unavailable()
    }

    async fn save(
        &self,
        _user_id: &str,
        _id: &str,
        _title: &str,
        _messages: &[Message],
        _model: Option<&str>,
    ) -> StoreResult<()> {
        Self::unavailable()
    }

    async fn update_title(&self, _user_id: &str, _id: &str, _title: &str) -> StoreResult<()> {
        Self::unavailable()
    }

    async fn update_model(&self, _user_id: &str, _id: &str, _model: &str) -> StoreResult<()> {
        Self::unavailable()
    }

    async fn delete(&self, _user_id: &str, _id: &str) -> StoreResult<()> {
        Self::unavailable()
    }
}
