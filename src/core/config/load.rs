//! Configuration loading with env-var overrides.
//!
//! Reads TOML files, supports `[meta] base = "..."` inheritance chains,
//! searches the default config paths, and applies the `CHATFLOW_LOG_LEVEL`
//! env override.

use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::bootstrap::logger::parse_level;
use crate::error::AppError;

use super::raw::{RawConfig, RawOllamaChat, RawSink, RawTopicLogger};
use super::types::*;

/// Deep-merge two TOML values.
/// Tables are merged recursively: the overlay only needs to specify keys that
/// differ from the base. For every other type (string, integer, array, …)
/// the overlay value replaces the base value wholesale.
fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_tbl), toml::Value::Table(overlay_tbl)) => {
            for (key, ov_val) in overlay_tbl {
                let merged = match base_tbl.remove(&key) {
                    Some(base_val) => merge_toml(base_val, ov_val),
                    None => ov_val,
                };
                base_tbl.insert(key, merged);
            }
            toml::Value::Table(base_tbl)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file, follow any `[meta] base = "..."` chain, and return the
/// fully merged `toml::Value`. `visited` carries canonicalized paths already
/// seen in this chain so circular references are caught early.
fn load_raw_merged(path: &Path, visited: &mut HashSet<PathBuf>) -> Result<toml::Value, AppError> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !visited.insert(canonical) {
        return Err(AppError::Config(format!(
            "circular base reference detected at: {}",
            path.display()
        )));
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let overlay_val: toml::Value = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    let Some(base_str) = overlay_val
        .get("meta")
        .and_then(|m| m.get("base"))
        .and_then(|b| b.as_str())
    else {
        return Ok(overlay_val);
    };

    let base_path = if Path::new(base_str).is_absolute() {
        PathBuf::from(base_str)
    } else {
        path.parent().unwrap_or(Path::new(".")).join(base_str)
    };
    let base_val = load_raw_merged(&base_path, visited)?;
    Ok(merge_toml(base_val, overlay_val))
}

/// Pick the config file to load: the explicit path if given, otherwise the
/// first of `defaults` that exists.
pub fn find_config(explicit: Option<&Path>, defaults: &[PathBuf]) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    defaults.iter().find(|p| p.is_file()).cloned()
}

/// Load config from the explicit path or the first existing default path,
/// then apply env-var overrides.
pub fn load(explicit: Option<&Path>, defaults: &[PathBuf]) -> Result<Config, AppError> {
    let log_level_override = env::var("CHATFLOW_LOG_LEVEL").ok();

    let path = find_config(explicit, defaults).ok_or_else(|| {
        let searched = defaults
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        AppError::Config(format!("no config file found (searched: {searched})"))
    })?;

    load_from(&path, log_level_override.as_deref())
}

/// Loader behind [`load`]: accepts an explicit path and an optional log level
/// override. Tests pass the override directly instead of mutating env vars.
pub fn load_from(path: &Path, log_level_override: Option<&str>) -> Result<Config, AppError> {
    let merged_val = load_raw_merged(path, &mut HashSet::new())?;

    let parsed: RawConfig = Deserialize::deserialize(merged_val.clone())
        .map_err(|e: toml::de::Error| {
            AppError::Config(format!("config error in {}: {e}", path.display()))
        })?;

    let ollama_chat = parsed
        .pipeline
        .ollama_chat
        .map(resolve_ollama_chat)
        .transpose()?;

    Ok(Config {
        path: path.to_path_buf(),
        log_level: log_level_override.unwrap_or(&parsed.logger.level).to_string(),
        max_in_flight: parsed.pipeline.max_in_flight.max(1),
        ollama_chat,
        parsed: ParsedConfig::new(merged_val),
    })
}

fn resolve_ollama_chat(raw: RawOllamaChat) -> Result<OllamaChatConfig, AppError> {
    if raw.model.trim().is_empty() {
        return Err(AppError::Config(
            "pipeline.ollama_chat.model must not be empty".into(),
        ));
    }
    let server_address = raw
        .server_address
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    Ok(OllamaChatConfig {
        server_address,
        model: raw.model,
        prompt: raw.prompt,
        system_prompt: raw.system_prompt,
        timeout_seconds: raw.timeout_seconds.max(1),
    })
}

impl TopicLoggerConfig {
    /// Resolve the topic logger's own sub-tree (the value under the reserved
    /// top-level key). An empty tree yields an enabled logger with no sink.
    pub fn from_parsed(parsed: &ParsedConfig) -> Result<Self, AppError> {
        let raw: RawTopicLogger = Deserialize::deserialize(parsed.value().clone())
            .map_err(|e: toml::de::Error| AppError::Config(format!("topic logger: {e}")))?;

        let logs_level = parse_level(&raw.logs_level)
            .map_err(|e| AppError::Config(format!("topic logger logs_level: {e}")))?;

        let sink = match raw.sink {
            None => None,
            Some(RawSink::File { path }) => {
                if path.trim().is_empty() {
                    return Err(AppError::Config("topic logger file sink requires a path".into()));
                }
                Some(SinkConfig::File { path: expand_home(&path) })
            }
            Some(RawSink::Http { url, timeout_seconds }) => {
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(AppError::Config(format!(
                        "topic logger http sink url must be http(s): '{url}'"
                    )));
                }
                Some(SinkConfig::Http {
                    url,
                    timeout: Duration::from_secs(timeout_seconds.max(1)),
                })
            }
        };

        Ok(Self {
            enabled: raw.enabled,
            pipeline_id: raw.pipeline_id.filter(|id| !id.is_empty()),
            logs_level,
            status_interval: Duration::from_secs(raw.status_interval_seconds),
            sink,
        })
    }
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}
