//! Remote Save Writer
//!
//! Information Hiding:
//! - Remote saves run on a background task, in the order they were queued
//! - Callers never wait on the remote store
//! - Ids with queued or running saves are tracked so reads can prefer local data

use super::registry::ConversationRegistry;
use crate::core::message::Message;
use crate::storage::RemoteStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::{oneshot, Mutex};

enum RemoteWrite {
    Save {
        id: String,
        title: String,
        messages: Vec<Message>,
        model: Option<String>,
    },
    Flush(oneshot::Sender<()>),
}

type PendingWrites = Arc<Mutex<HashMap<String, usize>>>;

/// Handle to the writer task. Must be created inside a Tokio runtime.
pub(crate) struct RemoteWriterHandle {
    sender: UnboundedSender<RemoteWrite>,
    pending: PendingWrites,
}

impl RemoteWriterHandle {
    pub fn new(remote: Arc<dyn RemoteStore>, registry: Arc<ConversationRegistry>) -> Self {
        let (sender, receiver) = unbounded_channel();
        let pending: PendingWrites = Arc::new(Mutex::new(HashMap::new()));
        tokio::spawn(remote_writer(receiver, remote, registry, pending.clone()));
        Self { sender, pending }
    }

    /// Queue a full save; returns immediately
    pub async fn save(&self, id: &str, title: &str, messages: &[Message], model: Option<String>) {
        *self.pending.lock().await.entry(id.to_string()).or_insert(0) += 1;

        let write = RemoteWrite::Save {
            id: id.to_string(),
            title: title.to_string(),
            messages: messages.to_vec(),
            model,
        };
        if self.sender.send(write).is_err() {
            tracing::warn!("[RemoteWriter] Writer stopped, remote save of {} skipped", id);
            release(&self.pending, id).await;
        }
    }

    /// True while a save for this id is queued or running
    pub async fn has_pending(&self, id: &str) -> bool {
        self.pending.lock().await.contains_key(id)
    }

    /// Wait until every save queued so far has been attempted
    pub async fn flush(&self) {
        let (done, waiting) = oneshot::channel();
        if self.sender.send(RemoteWrite::Flush(done)).is_ok() {
            let _ = waiting.await;
        }
    }
}

async fn remote_writer(
    mut receiver: UnboundedReceiver<RemoteWrite>,
    remote: Arc<dyn RemoteStore>,
    registry: Arc<ConversationRegistry>,
    pending: PendingWrites,
) {
    tracing::debug!("[RemoteWriter] Started");

    while let Some(write) = receiver.recv().await {
        match write {
            RemoteWrite::Save {
                id,
                title,
                messages,
                model,
            } => {
                if !registry.contains(&id).await {
                    tracing::debug!("[RemoteWriter] Skipping save of deleted conversation {}", id);
                } else if let Err(e) = remote
                    .save(registry.user_id(), &id, &title, &messages, model.as_deref())
                    .await
                {
                    tracing::warn!("[RemoteWriter] Remote save of {} failed: {}", id, e);
                } else {
                    tracing::debug!("[RemoteWriter] Saved {} messages for {}", messages.len(), id);
                }
                release(&pending, &id).await;
            }
            RemoteWrite::Flush(done) => {
                let _ = done.send(());
            }
        }
    }

    tracing::debug!("[RemoteWriter] Channel closed, shutting down");
}

async fn release(pending: &PendingWrites, id: &str) {
    let mut pending = pending.lock().await;
    if let Some(count) = pending.get_mut(id) {
        *count -= 1;
        if *count == 0 {
            pending.remove(id);
        }
    }
}
