//! The host engine contract: what an embedder hands the engine, and what it
//! gets back.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use crate::config::Schema;
use crate::error::AppError;
use crate::pipeline::hooks::CliHooks;

/// Everything the engine needs from its embedder.
#[derive(Clone)]
pub struct CliOptions {
    pub binary_name: String,
    pub version: String,
    pub schema: Schema,
    /// Searched in order when no `-c` path is given.
    pub default_config_paths: Vec<PathBuf>,
    pub hooks: Arc<dyn CliHooks>,
}

impl std::fmt::Debug for CliOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CliOptions")
            .field("binary_name", &self.binary_name)
            .field("version", &self.version)
            .field("default_config_paths", &self.default_config_paths)
            .finish_non_exhaustive()
    }
}

/// Result of one engine run.
#[derive(Debug)]
pub struct EngineOutcome {
    pub exit_code: i32,
    /// Terminal error, `None` on a clean run.
    pub error: Option<AppError>,
}

impl EngineOutcome {
    pub fn success() -> Self {
        Self { exit_code: 0, error: None }
    }

    pub fn failure(error: AppError) -> Self {
        Self { exit_code: 1, error: Some(error) }
    }

    /// A non-zero exit without a terminal error (e.g. lint findings).
    pub fn exit(code: i32) -> Self {
        Self { exit_code: code, error: None }
    }
}

/// A boxed, owned future returned by [`Engine::run`].
pub type EngineFuture = Pin<Box<dyn Future<Output = EngineOutcome> + Send + 'static>>;

/// A pipeline engine that can be driven to completion once.
pub trait Engine: Send + 'static {
    /// Consume the engine and return its run future. The future must be
    /// `Send + 'static` so the orchestrator can spawn it.
    fn run(self: Box<Self>, options: CliOptions) -> EngineFuture;
}
