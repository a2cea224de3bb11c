//! LLM backend abstraction.
//!
//! Holds the chat request shape shared by backends and the provider error
//! type. The only backend today is Ollama (`ollama.rs`); its wire types stay
//! private to that module.
//!
//! Clients are cheap to clone and safe to share.

pub mod ollama;

use serde::Serialize;
use thiserror::Error;

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Request(String),
    #[error("provider returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("failed to decode provider response: {0}")]
    Decode(String),
    #[error("backend error: {0}")]
    Backend(String),
    #[error("provider request cancelled")]
    Cancelled,
}

// ── Chat request ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// One non-streaming chat round-trip.
///
/// Messages are at most one `system` entry followed by exactly one `user`
/// entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
}

impl ChatRequest {
    /// Build a request; the system entry is omitted when `system` is empty.
    pub fn new(model: &str, system: &str, user: &str) -> Self {
        let mut messages = Vec::with_capacity(2);
        if !system.is_empty() {
            messages.push(ChatMessage { role: Role::System, content: system.to_string() });
        }
        messages.push(ChatMessage { role: Role::User, content: user.to_string() });
        Self { model: model.to_string(), messages, stream: false }
    }
}
