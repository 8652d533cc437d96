use crate::core::message::{ConversationSummary, Message, Role};
use colored::*;

pub fn print_header(text: &str) {
    println!("\n{}", text.bright_cyan().bold());
    println!("{}", "=".repeat(text.chars().count()).bright_cyan());
}

pub fn print_success(text: &str) {
    println!("{}", text.green());
}

pub fn print_error(text: &str) {
    eprintln!("{}", text.red().bold());
}

pub fn print_info(text: &str) {
    println!("{}", text.blue());
}

pub fn print_prompt(text: &str) {
    print!("{}", text.yellow().bold());
}

/// One message as shown in the transcript
pub fn print_message(message: &Message) {
    match message.role {
        Role::User => println!("{} {}", "You:".yellow().bold(), message.content),
        Role::Assistant if message.is_error => println!("{}", message.content.red()),
        Role::Assistant => println!("{} {}", "Assistant:".bright_green().bold(), message.content),
        Role::System => println!("{}", message.content.dimmed()),
    }
}

/// Numbered conversation list with the active one marked
pub fn print_conversations(conversations: &[ConversationSummary], active: Option<&str>) {
    if conversations.is_empty() {
        print_info("No conversations");
        return;
    }

    for (index, conversation) in conversations.iter().enumerate() {
        let marker = if Some(conversation.id.as_str()) == active { "*" } else { " " };
        let model = conversation.model.as_deref().unwrap_or("-");
        println!(
            "{} {:>2}. {}  {}  {}",
            marker.bright_cyan().bold(),
            index + 1,
            conversation.title.bold(),
            model.dimmed(),
            conversation.updated_at.format("%Y-%m-%d %H:%M").to_string().dimmed()
        );
    }
}
