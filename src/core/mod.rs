pub mod history;
pub mod message;
pub mod ollama;
