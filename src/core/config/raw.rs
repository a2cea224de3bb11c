//! Raw TOML deserialization types.
//!
//! These structs mirror the TOML file shape and use `serde` defaults.
//! The `load` module converts them into the public `types` structs.
//! Unknown keys are ignored here; `schema` reports them during lint.

use serde::Deserialize;

// ── Top-level ────────────────────────────────────────────────────────────────

/// Raw TOML shape: serde target before resolution.
#[derive(Deserialize, Default)]
pub(super) struct RawConfig {
    #[serde(default)]
    pub logger: RawLogger,
    #[serde(default)]
    pub pipeline: RawPipeline,
}

#[derive(Deserialize)]
pub(super) struct RawLogger {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for RawLogger {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

// ── Pipeline ─────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct RawPipeline {
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    #[serde(default)]
    pub ollama_chat: Option<RawOllamaChat>,
}

impl Default for RawPipeline {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
            ollama_chat: None,
        }
    }
}

#[derive(Deserialize)]
pub(super) struct RawOllamaChat {
    #[serde(default)]
    pub server_address: Option<String>,
    pub model: String,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default = "default_ollama_timeout_seconds")]
    pub timeout_seconds: u64,
}

// ── Topic logger ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct RawTopicLogger {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub pipeline_id: Option<String>,
    #[serde(default = "default_logs_level")]
    pub logs_level: String,
    #[serde(default = "default_status_interval_seconds")]
    pub status_interval_seconds: u64,
    #[serde(default)]
    pub sink: Option<RawSink>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(super) enum RawSink {
    File {
        path: String,
    },
    Http {
        url: String,
        #[serde(default = "default_http_sink_timeout_seconds")]
        timeout_seconds: u64,
    },
}

// ── Defaults ─────────────────────────────────────────────────────────────────

pub(super) fn default_log_level() -> String {
    "info".to_string()
}

pub(super) fn default_max_in_flight() -> usize {
    4
}

pub(super) fn default_ollama_timeout_seconds() -> u64 {
    120
}

pub(super) fn default_logs_level() -> String {
    "info".to_string()
}

pub(super) fn default_status_interval_seconds() -> u64 {
    30
}

pub(super) fn default_http_sink_timeout_seconds() -> u64 {
    10
}

fn default_true() -> bool {
    true
}
