//! Outbound history builder
//!
//! Turns the stored message list plus staged attachments into the
//! `messages` array of a chat-completion request.

use crate::core::message::{Message, Role};
use crate::uploads::Attachments;
use serde::{Deserialize, Serialize};

/// One entry of the chat-completion `messages` array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}

impl OutboundMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            images: None,
        }
    }
}

/// Build the request history.
///
/// Local `system` notices are dropped, staged documents become one leading
/// `system` context entry, and staged images ride on the most recent `user` entry.
pub fn build_outbound_history(messages: &[Message], attachments: &Attachments) -> Vec<OutboundMessage> {
    let mut history: Vec<OutboundMessage> = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| OutboundMessage::new(m.role, m.content.clone()))
        .collect();

    if !attachments.documents().is_empty() {
        let documents = attachments
            .documents()
            .iter()
            .map(|d| format!("=== {} ===\n{}\n", d.name, d.content))
            .collect::<Vec<_>>()
            .join("\n");
        history.insert(
            0,
            OutboundMessage::new(
                Role::System,
                format!(
                    "You have access to the following documents. Use them to answer questions:\n\n{}",
                    documents
                ),
            ),
        );
    }

    if !attachments.images().is_empty() {
        match history.iter().rposition(|m| m.role == Role::User) {
            Some(index) => {
                history[index].images =
                    Some(attachments.images().iter().map(|i| i.data.clone()).collect());
            }
            None => tracing::debug!("[History] No user entry to carry {} image(s)", attachments.images().len()),
        }
    }

    history
}
