//! Chat Preferences
//!
//! Information Hiding:
//! - Storage keys for the server URL and global model hidden from callers
//! - Blank persisted values fall back to the configured defaults

use super::Settings;
use crate::storage::local::{MODEL_KEY, SERVER_URL_KEY};
use crate::storage::LocalStore;

/// User-adjustable model server URL and global model.
///
/// Changes stay in memory until [`ChatPreferences::save`] is called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatPreferences {
    server_url: String,
    model: String,
}

impl ChatPreferences {
    pub fn new(server_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            model: model.into(),
        }
    }

    /// Persisted values first, configured defaults otherwise
    pub fn load(local: &LocalStore, settings: &Settings) -> Self {
        let server_url = local
            .preference(SERVER_URL_KEY)
            .unwrap_or_else(|| settings.model_server.url.clone());
        let model = local
            .preference(MODEL_KEY)
            .unwrap_or_else(|| settings.model_server.model.clone());

        tracing::debug!("[Preferences] server={} model={}", server_url, model);
        Self { server_url, model }
    }

    pub fn save(&self, local: &LocalStore) {
        local.set_preference(SERVER_URL_KEY, &self.server_url);
        local.set_preference(MODEL_KEY, &self.model);
        tracing::info!("[Preferences] Saved server={} model={}", self.server_url, self.model);
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub fn set_server_url(&mut self, url: impl Into<String>) {
        self.server_url = url.into().trim().to_string();
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into().trim().to_string();
    }
}
