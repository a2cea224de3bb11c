//! Message processors and their building blocks.

pub mod ollama_chat;
pub mod prompt;
pub mod template;

pub use ollama_chat::OllamaChatProcessor;
