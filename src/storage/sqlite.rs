//! SQLite Remote Store
//!
//! Information Hiding:
//! - Table schema and JSON encoding of the message list hidden from callers
//! - Blocking rusqlite calls moved off the async runtime
//! - Rows keyed by (user id, conversation id); upsert keeps a stored model when the caller passes none

use super::{RemoteStore, StoreError, StoreResult};
use crate::core::message::{ConversationSummary, Message, StoredConversation};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS conversations (
    id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    title TEXT NOT NULL,
    messages TEXT NOT NULL,
    model TEXT,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (user_id, id)
);
CREATE INDEX IF NOT EXISTS idx_conversations_user_updated
    ON conversations(user_id, updated_at DESC);
";

/// Conversation table in a local SQLite file
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        tracing::info!("[SqliteStore] Opened {:?}", path.as_ref());
        Self::with_schema(conn)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::with_schema(Connection::open_in_memory()?)
    }

    fn with_schema(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure against the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StoreError::Task("sqlite connection lock poisoned".to_string()))?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    fn now() -> String {
        Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl RemoteStore for SqliteStore {
    async fn list(&self, user_id: &str) -> StoreResult<Vec<ConversationSummary>> {
        let user_id = user_id.to_string();
        let summaries = self
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, title, updated_at, model FROM conversations
                     WHERE user_id = ?1
                     ORDER BY updated_at DESC, rowid DESC",
                )?;
                let rows = stmt.query_map(params![user_id], |row| {
                    let updated_at: String = row.get(2)?;
                    Ok(ConversationSummary {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        updated_at: parse_timestamp(&updated_at),
                        model: row.get(3)?,
                    })
                })?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await?;

        tracing::debug!("[SqliteStore] Listed {} conversations", summaries.len());
        Ok(summaries)
    }

    async fn load(&self, user_id: &str, id: &str) -> StoreResult<Option<StoredConversation>> {
        let user_id = user_id.to_string();
        let id = id.to_string();
        self.with_conn(move |conn| {
            let row: Option<(String, String, Option<String>)> = conn
                .query_row(
                    "SELECT messages, title, model FROM conversations
                     WHERE id = ?1 AND user_id = ?2",
                    params![id, user_id],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;

            match row {
                Some((messages, title, model)) => Ok(Some(StoredConversation {
                    messages: serde_json::from_str(&messages)?,
                    title,
                    model,
                })),
                None => Ok(None),
            }
        })
        .await
    }

    async fn save(
        &self,
        user_id: &str,
        id: &str,
        title: &str,
        messages: &[Message],
        model: Option<&str>,
    ) -> StoreResult<()> {
        let encoded = serde_json::to_string(messages)?;
        let user_id = user_id.to_string();
        let id = id.to_string();
        let title = title.to_string();
        let model = model.map(str::to_string);
        let count = messages.len();

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO conversations (id, user_id, title, messages, model, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(user_id, id) DO UPDATE SET
                     title = excluded.title,
                     messages = excluded.messages,
                     model = COALESCE(excluded.model, conversations.model),
                     updated_at = excluded.updated_at",
                params![id, user_id, title, encoded, model, Self::now()],
            )?;
            Ok(())
        })
        .await?;

        tracing::debug!("[SqliteStore] Saved {} messages", count);
        Ok(())
    }

    async fn update_title(&self, user_id: &str, id: &str, title: &str) -> StoreResult<()> {
        let (user_id, id, title) = (user_id.to_string(), id.to_string(), title.to_string());
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE conversations SET title = ?1, updated_at = ?2
                 WHERE id = ?3 AND user_id = ?4",
                params![title, Self::now(), id, user_id],
            )?;
            Ok(())
        })
        .await
    }

    async fn update_model(&self, user_id: &str, id: &str, model: &str) -> StoreResult<()> {
        let (user_id, id, model) = (user_id.to_string(), id.to_string(), model.to_string());
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE conversations SET model = ?1, updated_at = ?2
                 WHERE id = ?3 AND user_id = ?4",
                params![model, Self::now(), id, user_id],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, user_id: &str, id: &str) -> StoreResult<()> {
        let (user_id, id) = (user_id.to_string(), id.to_string());
        let removed = self
            .with_conn(move |conn| {
                Ok(conn.execute(
                    "DELETE FROM conversations WHERE id = ?1 AND user_id = ?2",
                    params![id, user_id],
                )?)
            })
            .await?;
        tracing::debug!("[SqliteStore] Deleted {} row(s)", removed);
        Ok(())
    }
}
