//! Run identity: one token per process execution.
//!
//! Generated once by the orchestrator and handed to every component that
//! tags lifecycle events. Never stored globally.

use std::fmt;

use serde::Serialize;
use uuid::Uuid;

/// Unique, immutable identifier of a single process run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Generate a fresh id. UUIDv7 keeps ids roughly time-ordered.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RunId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
