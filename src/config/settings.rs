use anyhow::Result;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

pub const DEFAULT_SERVER_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "kimi-k2.5:cloud";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub model_server: ModelServerConfig,
    pub remote: RemoteConfig,
    pub local: LocalConfig,
    pub conversation: ConversationConfig,
    pub relay: RelayConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelServerConfig {
    pub url: String,
    pub model: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteBackend {
    Postgrest,
    Sqlite,
    Memory,
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub backend: RemoteBackend,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    pub table: String,
    pub sqlite_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    pub default_title: String,
    pub title_max_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub port: u16,
    pub target_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config_env = env::var("CONFIG_ENV").unwrap_or_else(|_| "default".to_string());

        let config = Self::with_defaults(Config::builder())?
            .add_source(File::with_name(&format!("config/{}", config_env)).required(false))
            .add_source(Environment::with_prefix("PARLEY").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    fn with_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        builder
            .set_default("model_server.url", DEFAULT_SERVER_URL)?
            .set_default("model_server.model", DEFAULT_MODEL)?
            .set_default("remote.backend", "offline")?
            .set_default("remote.url", "")?
            .set_default("remote.api_key", "")?
            .set_default("remote.table", "conversations")?
            .set_default("remote.sqlite_path", "parley.db")?
            .set_default("local.data_dir", ".parley")?
            .set_default("conversation.default_title", crate::core::message::DEFAULT_TITLE)?
            .set_default(
                "conversation.title_max_chars",
                crate::core::message::DEFAULT_TITLE_MAX_CHARS as i64,
            )?
            .set_default("relay.port", 8080_i64)?
            .set_default("relay.target_url", DEFAULT_SERVER_URL)?
            .set_default("logging.level", "info")
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model_server: ModelServerConfig {
                url: DEFAULT_SERVER_URL.to_string(),
                model: DEFAULT_MODEL.to_string(),
            },
            remote: RemoteConfig {
                backend: RemoteBackend::Offline,
                url: String::new(),
                api_key: String::new(),
                table: "conversations".to_string(),
                sqlite_path: PathBuf::from("parley.db"),
            },
            local: LocalConfig {
                data_dir: PathBuf::from(".parley"),
            },
            conversation: ConversationConfig {
                default_title: crate::core::message::DEFAULT_TITLE.to_string(),
                title_max_chars: crate::core::message::DEFAULT_TITLE_MAX_CHARS,
            },
            relay: RelayConfig {
                port: 8080,
                target_url: DEFAULT_SERVER_URL.to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}
