mod commands;

pub use commands::{ChatCommand, Cli, Commands, SettingChange, CHAT_HELP};
