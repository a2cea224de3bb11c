//! Program-level orchestration around one engine run.
//!
//! Sequence:
//!   1. Generate the run id; construct the topic logger
//!   2. Build the schema (engine base plus the topic logger's object)
//!   3. Hand the engine the lifecycle hooks
//!   4. Run the engine to completion (a panic becomes an engine error)
//!   5. Log the terminal error via the fallback logger, or stderr
//!   6. Emit `stopped`, then close the topic logger with a bounded timeout
//!
//! Steps 5 and 6 run whatever the outcome of step 4. The exit code is
//! returned; `main` exits the process when it is non-zero.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tracing::{debug, info};
use tracing_subscriber::Layer;

use crate::bootstrap::logger::{BoxedLayer, FallbackLogger};
use crate::bootstrap::run_id::RunId;
use crate::config::{ParsedConfig, Schema};
use crate::error::AppError;
use crate::lifecycle::{TOP_LEVEL_KEY, TopicLogger, topic_logger_field};
use crate::pipeline::{CliHooks, CliOptions, Engine, EngineOutcome, StreamSummary};

pub const BINARY_NAME: &str = "chatflow";

const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Config search order when no `-c` path is given.
pub fn default_config_paths() -> Vec<PathBuf> {
    [
        "chatflow.toml",
        "/chatflow.toml",
        "/etc/chatflow/config.toml",
        "/etc/chatflow.toml",
    ]
    .into_iter()
    .map(PathBuf::from)
    .collect()
}

/// The engine's base schema plus the topic logger's reserved object.
pub fn schema() -> Schema {
    Schema::base().field(topic_logger_field())
}

// ── Hooks ─────────────────────────────────────────────────────────────────────

/// Bridges engine callbacks into the topic logger. Every callback is safe in
/// any order.
pub struct LifecycleHooks {
    logger: TopicLogger,
    /// Captured from `on_logger_init`; read after the engine returns.
    fallback: Arc<OnceLock<FallbackLogger>>,
}

impl LifecycleHooks {
    pub fn new(logger: TopicLogger, fallback: Arc<OnceLock<FallbackLogger>>) -> Self {
        Self { logger, fallback }
    }
}

impl CliHooks for LifecycleHooks {
    fn on_logger_init(&self, logger: FallbackLogger) {
        let _ = self.fallback.set(logger.clone());
        self.logger.set_fallback_logger(logger);
    }

    fn tee_layer(&self) -> Option<BoxedLayer> {
        Some(self.logger.layer().boxed())
    }

    fn on_config_parsed(&self, parsed: &ParsedConfig) -> Result<(), AppError> {
        // A broken event stream must not stop the pipeline.
        if let Err(e) = self.logger.init_output(&parsed.namespace(TOP_LEVEL_KEY)) {
            let message = format!("topic logger disabled: {e}");
            match self.fallback.get() {
                Some(fallback) => fallback.error(&message),
                None => eprintln!("error: {message}"),
            }
        }
        Ok(())
    }

    fn on_stream_start(&self, summary: StreamSummary) -> Result<(), AppError> {
        self.logger.set_stream_summary(summary);
        Ok(())
    }
}

// ── Run ───────────────────────────────────────────────────────────────────────

/// Drive `engine` with the lifecycle hooks attached and return the exit code.
pub async fn run<E: Engine>(engine: E, version: &str) -> i32 {
    run_with_logger(engine, version, TopicLogger::new(RunId::generate())).await
}

/// [`run`] with a caller-supplied topic logger.
pub async fn run_with_logger<E: Engine>(engine: E, version: &str, logger: TopicLogger) -> i32 {
    let fallback: Arc<OnceLock<FallbackLogger>> = Arc::new(OnceLock::new());
    let hooks = LifecycleHooks::new(logger.clone(), fallback.clone());

    let options = CliOptions {
        binary_name: BINARY_NAME.to_string(),
        version: version.to_string(),
        schema: schema(),
        default_config_paths: default_config_paths(),
        hooks: Arc::new(hooks),
    };

    debug!(run_id = %logger.run_id(), "starting engine");
    let outcome = match tokio::spawn(Box::new(engine).run(options)).await {
        Ok(outcome) => outcome,
        Err(e) => EngineOutcome::failure(AppError::Engine(format!("engine task panicked: {e}"))),
    };

    if let Some(err) = &outcome.error {
        match fallback.get() {
            Some(fallback) => fallback.error(&err.to_string()),
            None => eprintln!("error: {err}"),
        }
    }

    logger.trigger_stopped(outcome.error.as_ref()).await;
    if let Err(e) = logger.close(CLOSE_TIMEOUT).await {
        match fallback.get() {
            Some(fallback) => fallback.warn(&format!("topic logger close: {e}")),
            None => eprintln!("warning: topic logger close: {e}"),
        }
    }

    info!(exit_code = outcome.exit_code, "shutdown complete");
    outcome.exit_code
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_paths_in_search_order() {
        let paths = default_config_paths();
        assert_eq!(paths[0], PathBuf::from("chatflow.toml"));
        assert_eq!(paths.last(), Some(&PathBuf::from("/etc/chatflow.toml")));
        assert_eq!(paths.len(), 4);
    }

    #[test]
    fn schema_accepts_topic_logger_object() {
        let root: toml::Value = toml::from_str(
            "[chatflow]\nenabled = true\npipeline_id = \"p\"\n[chatflow.sink]\ntype = \"file\"\npath = \"/tmp/x\"\n",
        )
        .unwrap();
        assert!(schema().lint(&root).is_empty());

        let root: toml::Value = toml::from_str("[chatflow]\nbuffer = 3\n").unwrap();
        assert_eq!(schema().lint(&root)[0].path, "chatflow.buffer");
    }
}
