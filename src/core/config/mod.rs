//! Configuration loading with env-var overrides.
//!
//! Reads a TOML file (explicit path or the first existing default path),
//! then applies the `CHATFLOW_LOG_LEVEL` env override.
//!
//! # Module layout
//!
//! - **types**: Public configuration structs (`Config`, `OllamaChatConfig`,
//!   `TopicLoggerConfig`, `ParsedConfig`).
//! - **raw**: Raw TOML deserialization types. These mirror the file shape
//!   and use serde defaults; kept private.
//! - **load**: Loading logic: `merge_toml`, `load_raw_merged`, `load`,
//!   `load_from`, `find_config`, `expand_home`.
//! - **schema**: Known keys, used by `lint`.

mod load;
mod raw;
pub mod schema;
mod types;

pub use load::{expand_home, find_config, load, load_from};
pub use schema::{Field, FieldKind, LintIssue, Schema};
pub use types::*;
