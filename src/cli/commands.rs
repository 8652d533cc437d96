use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "parley")]
#[command(author, version, about = "Multi-conversation chat client for Ollama model servers", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the interactive chat
    Chat {
        /// Open this conversation instead of the last active one
        #[arg(short, long)]
        conversation: Option<String>,
    },

    /// List saved conversations, most recent first
    List,

    /// List the models offered by the model server
    Models,

    /// Run the CORS relay in front of the model server
    Relay {
        #[arg(short, long)]
        port: Option<u16>,

        /// Model server to forward to
        #[arg(short, long)]
        target: Option<String>,
    },
}

/// A line typed in the chat prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Send(String),
    New,
    List,
    Switch(String),
    Rename(String),
    Model(String),
    Models,
    Upload(Vec<PathBuf>),
    Uploads,
    ClearUploads,
    Delete,
    Settings(Option<SettingChange>),
    Help,
    Quit,
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingChange {
    ServerUrl(String),
    Model(String),
}

impl ChatCommand {
    /// Lines starting with `/` are commands, anything else is a message
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let Some(rest) = line.strip_prefix('/') else {
            return ChatCommand::Send(line.to_string());
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };

        match name {
            "new" => ChatCommand::New,
            "list" | "ls" => ChatCommand::List,
            "switch" | "open" if !arg.is_empty() => ChatCommand::Switch(arg.to_string()),
            "rename" => ChatCommand::Rename(arg.to_string()),
            "model" if !arg.is_empty() => ChatCommand::Model(arg.to_string()),
            "models" => ChatCommand::Models,
            "upload" if !arg.is_empty() => {
                ChatCommand::Upload(arg.split_whitespace().map(PathBuf::from).collect())
            }
            "uploads" => ChatCommand::Uploads,
            "clear-uploads" => ChatCommand::ClearUploads,
            "delete" => ChatCommand::Delete,
            "settings" => match arg.split_once(char::is_whitespace) {
                Some(("url", value)) => {
                    ChatCommand::Settings(Some(SettingChange::ServerUrl(value.trim().to_string())))
                }
                Some(("model", value)) => {
                    ChatCommand::Settings(Some(SettingChange::Model(value.trim().to_string())))
                }
                None if arg.is_empty() => ChatCommand::Settings(None),
                _ => ChatCommand::Unknown(line.to_string()),
            },
            "help" | "?" => ChatCommand::Help,
            "quit" | "exit" | "q" => ChatCommand::Quit,
            _ => ChatCommand::Unknown(line.to_string()),
        }
    }
}

pub const CHAT_HELP: &str = "\
/new                      start a new conversation
/list                     list conversations
/switch <n|id>            open a conversation by list number or id
/rename <title>           rename the current conversation (blank resets)
/model <name>             set the model of the current conversation
/models                   list models on the server
/upload <path>...         stage files for the next message
/uploads                  show staged files
/clear-uploads            drop staged files
/delete                   delete the current conversation
/settings [url <u>|model <m>]  show or change server URL and default model
/help                     this help
/quit                     leave";
