//! Public configuration types.
//!
//! These are the resolved, ready-to-use structs that the host engine,
//! processors, and the topic logger consume. Raw TOML deserialization types
//! live in `raw.rs`.

use std::path::PathBuf;
use std::time::Duration;

use tracing::level_filters::LevelFilter;

// ── Parsed tree ──────────────────────────────────────────────────────────────

/// The fully merged configuration document, kept around so components that
/// own a top-level object (e.g. the topic logger) can read their sub-tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedConfig {
    root: toml::Value,
}

impl ParsedConfig {
    pub fn new(root: toml::Value) -> Self {
        Self { root }
    }

    /// An empty document (a table with no keys).
    pub fn empty() -> Self {
        Self::new(toml::Value::Table(toml::Table::new()))
    }

    /// Returns `true` if `key` is present at the top level of this tree.
    pub fn contains(&self, key: &str) -> bool {
        self.root.get(key).is_some()
    }

    /// Sub-tree under `key`, or an empty tree when the key is absent.
    pub fn namespace(&self, key: &str) -> ParsedConfig {
        self.root
            .get(key)
            .cloned()
            .map(ParsedConfig::new)
            .unwrap_or_else(ParsedConfig::empty)
    }

    pub fn value(&self) -> &toml::Value {
        &self.root
    }
}

// ── Processors ───────────────────────────────────────────────────────────────

/// `ollama_chat` processor configuration.
/// Populated from `[pipeline.ollama_chat]` in the TOML.
#[derive(Debug, Clone, PartialEq)]
pub struct OllamaChatConfig {
    /// Ollama server address; `None` selects the local default.
    pub server_address: Option<String>,
    /// Model name passed in every chat request. Never empty.
    pub model: String,
    /// Interpolated user prompt; the raw payload is used when absent.
    pub prompt: Option<String>,
    /// Interpolated system prompt.
    pub system_prompt: Option<String>,
    /// Per-request HTTP timeout in seconds.
    pub timeout_seconds: u64,
}

impl OllamaChatConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            server_address: None,
            model: model.into(),
            prompt: None,
            system_prompt: None,
            timeout_seconds: 120,
        }
    }
}

// ── Topic logger ─────────────────────────────────────────────────────────────

/// Destination for lifecycle events.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkConfig {
    /// Append JSON lines to a local file.
    File { path: PathBuf },
    /// POST each event as JSON to an HTTP endpoint.
    Http { url: String, timeout: Duration },
}

/// Topic logger configuration, read from the reserved top-level object.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicLoggerConfig {
    pub enabled: bool,
    pub pipeline_id: Option<String>,
    /// Minimum level of log records forwarded to the sink.
    pub logs_level: LevelFilter,
    /// Interval between status events; zero disables them.
    pub status_interval: Duration,
    pub sink: Option<SinkConfig>,
}

impl TopicLoggerConfig {
    /// The sink to activate, or `None` when the logger should stay inactive.
    pub fn active_sink(&self) -> Option<&SinkConfig> {
        if self.enabled { self.sink.as_ref() } else { None }
    }
}

// ── Config (root) ────────────────────────────────────────────────────────────

/// Fully-resolved host configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// File the configuration was loaded from.
    pub path: PathBuf,
    pub log_level: String,
    /// Maximum number of messages processed concurrently.
    pub max_in_flight: usize,
    pub ollama_chat: Option<OllamaChatConfig>,
    /// The merged document, for hooks that read their own sub-tree.
    pub parsed: ParsedConfig,
}
