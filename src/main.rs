use anyhow::Result;
use clap::Parser;
use parley::cli::{ChatCommand, Cli, Commands, SettingChange, CHAT_HELP};
use parley::{relay, utils, ChatApp, SendOutcome, Settings};
use std::io::Write;
use std::time::Duration;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, BufReader};

const REMOTE_FLUSH_SECS: u64 = 5;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::new()?;
    parley::init_tracing(&settings.logging.level);

    let cli = Cli::parse();

    match cli.command {
        Commands::Chat { conversation } => handle_chat(&settings, conversation).await,
        Commands::List => handle_list(&settings).await,
        Commands::Models => handle_models(&settings).await,
        Commands::Relay { port, target } => {
            let port = port.unwrap_or(settings.relay.port);
            let target = target.unwrap_or_else(|| settings.relay.target_url.clone());
            utils::print_info(&format!("CORS relay on http://localhost:{} -> {}", port, target));
            relay::serve(port, &target).await
        }
    }
}

async fn handle_list(settings: &Settings) -> Result<()> {
    let app = ChatApp::from_settings(settings)?;
    let active = app.initialize().await;
    utils::print_header("Conversations");
    utils::print_conversations(&app.conversations().await, active.as_deref());
    Ok(())
}

async fn handle_models(settings: &Settings) -> Result<()> {
    let app = ChatApp::from_settings(settings)?;
    print_models(&app).await;
    Ok(())
}

async fn handle_chat(settings: &Settings, conversation: Option<String>) -> Result<()> {
    let app = ChatApp::from_settings(settings)?;
    app.initialize().await;
    if let Some(id) = conversation {
        if !app.select_chat(&id).await {
            utils::print_error(&format!("Unknown conversation: {}", id));
        }
    }

    utils::print_header("Parley");
    utils::print_info(&format!(
        "Server: {}  Model: {}",
        app.server_url().await,
        app.active_model().await
    ));
    utils::print_info("Type a message, or /help for commands\n");
    print_transcript(&app).await;

    let mut lines = BufReader::new(io::stdin()).lines();

    loop {
        utils::print_prompt("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        match ChatCommand::parse(&line) {
            ChatCommand::Send(text) => {
                let attachments = app.attachments().await;
                if !attachments.is_empty() {
                    utils::print_message(&attachments.sending_notice());
                }
                match app.send(&text).await {
                    SendOutcome::Replied(message) | SendOutcome::Failed(message) => {
                        utils::print_message(&message)
                    }
                    SendOutcome::Busy => utils::print_error("Still working on the previous message"),
                    SendOutcome::NoConversation => {
                        utils::print_error("No conversation selected, use /new")
                    }
                    SendOutcome::Skipped => {}
                }
            }
            ChatCommand::New => {
                let id = app.new_chat().await;
                utils::print_success(&format!("Started conversation {}", id));
            }
            ChatCommand::List => {
                let active = app.active_id().await;
                utils::print_conversations(&app.conversations().await, active.as_deref());
            }
            ChatCommand::Switch(target) => {
                let conversations = app.conversations().await;
                let id = match target.parse::<usize>() {
                    Ok(n) if n >= 1 && n <= conversations.len() => conversations[n - 1].id.clone(),
                    _ => target,
                };
                if app.select_chat(&id).await {
                    print_transcript(&app).await;
                } else {
                    utils::print_error(&format!("Unknown conversation: {}", id));
                }
            }
            ChatCommand::Rename(title) => match app.active_id().await {
                Some(id) => {
                    let title = app.rename_conversation(&id, &title).await;
                    utils::print_success(&format!("Renamed to \"{}\"", title));
                }
                None => utils::print_error("No conversation selected"),
            },
            ChatCommand::Model(model) => match app.active_id().await {
                Some(id) => {
                    app.set_conversation_model(&id, &model).await;
                    utils::print_success(&format!("This conversation now uses {}", model));
                }
                None => utils::print_error("No conversation selected"),
            },
            ChatCommand::Models => print_models(&app).await,
            ChatCommand::Upload(paths) => {
                for rejected in app.upload(&paths).await {
                    utils::print_error(&rejected.to_string());
                }
                print_transcript_tail(&app, paths.len()).await;
            }
            ChatCommand::Uploads => {
                let attachments = app.attachments().await;
                if attachments.is_empty() {
                    utils::print_info("Nothing staged");
                }
                for document in attachments.documents() {
                    println!("📄 {} ({} characters)", document.name, document.content.chars().count());
                }
                for image in attachments.images() {
                    println!("📷 {}", image.name);
                }
            }
            ChatCommand::ClearUploads => {
                app.clear_uploads().await;
                print_transcript_tail(&app, 1).await;
            }
            ChatCommand::Delete => {
                if confirm(&mut lines, "Delete this chat? This cannot be undone. [y/N] ").await? {
                    let next = app.delete_current().await;
                    utils::print_success("Conversation deleted");
                    if next.is_some() {
                        print_transcript(&app).await;
                    } else {
                        utils::print_info("No conversations left, use /new");
                    }
                }
            }
            ChatCommand::Settings(change) => {
                match &change {
                    Some(SettingChange::ServerUrl(url)) => app.set_server_url(url).await,
                    Some(SettingChange::Model(model)) => app.set_model(model).await,
                    None => {}
                }
                if change.is_some() {
                    app.save_preferences().await;
                    utils::print_success("Settings saved");
                }
                utils::print_info(&format!(
                    "Server: {}  Default model: {}",
                    app.server_url().await,
                    app.model().await
                ));
            }
            ChatCommand::Help => println!("{}", CHAT_HELP),
            ChatCommand::Quit => break,
            ChatCommand::Unknown(line) => {
                utils::print_error(&format!("Unknown command: {} (try /help)", line))
            }
        }
    }

    if tokio::time::timeout(Duration::from_secs(REMOTE_FLUSH_SECS), app.flush())
        .await
        .is_err()
    {
        utils::print_error("Remote store did not answer, some changes are only saved locally");
    }

    Ok(())
}

async fn print_models(app: &ChatApp) {
    let models = app.list_models().await;
    if models.is_empty() {
        utils::print_error(&format!("No models found at {}", app.server_url().await));
        return;
    }
    utils::print_header("Models");
    for model in models {
        println!("  {}", model);
    }
}

async fn print_transcript(app: &ChatApp) {
    let active = app.active_id().await;
    let title = app
        .conversations()
        .await
        .into_iter()
        .find(|c| Some(&c.id) == active.as_ref())
        .map(|c| c.title)
        .unwrap_or_default();
    utils::print_header(&title);
    for message in app.messages().await {
        utils::print_message(&message);
    }
}

async fn print_transcript_tail(app: &ChatApp, count: usize) {
    let messages = app.messages().await;
    let start = messages.len().saturating_sub(count);
    for message in &messages[start..] {
        utils::print_message(message);
    }
}

async fn confirm<R>(lines: &mut tokio::io::Lines<R>, question: &str) -> Result<bool>
where
    R: AsyncBufRead + Unpin,
{
    utils::print_prompt(question);
    std::io::stdout().flush()?;
    let answer = lines.next_line().await?.unwrap_or_default();
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
