//! Parley - multi-conversation chat client for Ollama model servers
//!
//! Conversations are persisted to a remote store when one is reachable and
//! always to an on-device store, so the client keeps working offline.

pub mod config;
pub mod conversation;
pub mod core;
pub mod relay;
pub mod storage;
pub mod uploads;
pub mod utils;

pub mod api;
pub mod cli;

pub use api::{remote_store_from_settings, ChatApp};
pub use config::{ChatPreferences, Settings};
pub use conversation::{ConversationRegistry, ConversationSession, SendOutcome};
pub use crate::core::message::{ConversationSummary, Message, Role};

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` wins over `default_level`.
pub fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // Ignore a second install (tests, embedding)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
