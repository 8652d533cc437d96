//! Conversation Storage Abstraction
//!
//! Information Hiding:
//! - Remote backend protocol hidden behind `RemoteStore`
//! - On-device persistence hidden behind `KeyValueStore` and the `LocalStore` adapter
//! - "Row not found" surfaced as `Ok(None)`, never as an error

use crate::core::message::{ConversationSummary, Message, StoredConversation};
use async_trait::async_trait;
use thiserror::Error;

pub mod filesystem;
pub mod kv;
pub mod local;
pub mod memory;
pub mod offline;
pub mod postgrest;
pub mod sqlite;

pub use filesystem::FileKv;
pub use kv::{KeyValueStore, MemoryKv};
pub use local::LocalStore;
pub use memory::MemoryRemoteStore;
pub use offline::OfflineStore;
pub use postgrest::PostgrestStore;
pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("remote store unavailable: {0}")]
    Unavailable(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote store returned {status}: {message}")]
    Status {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage task failed: {0}")]
    Task(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Remote conversation table keyed by (user id, conversation id)
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Conversations of a user, most recently updated first
    async fn list(&self, user_id: &str) -> StoreResult<Vec<ConversationSummary>>;

    /// One conversation, or `None` when no row exists
    async fn load(&self, user_id: &str, id: &str) -> StoreResult<Option<StoredConversation>>;

    /// Upsert by id. Replaces title, messages and `updated_at`; replaces the
    /// model only when one is given.
    async fn save(
        &self,
        user_id: &str,
        id: &str,
        title: &str,
        messages: &[Message],
        model: Option<&str>,
    ) -> StoreResult<()>;

    async fn update_title(&self, user_id: &str, id: &str, title: &str) -> StoreResult<()>;

    async fn update_model(&self, user_id: &str, id: &str, model: &str) -> StoreResult<()>;

    /// Deleting an id that does not exist succeeds
    async fn delete(&self, user_id: &str, id: &str) -> StoreResult<()>;
}
