//! Lifecycle hook points the host engine exposes to its embedder.
//!
//! The engine calls these at its own discretion; implementors must not
//! assume any particular order between them.

use crate::bootstrap::logger::{BoxedLayer, FallbackLogger};
use crate::config::ParsedConfig;
use crate::error::AppError;
use crate::pipeline::summary::StreamSummary;

pub trait CliHooks: Send + Sync {
    /// The primary logger is ready; `logger` bypasses any tee layer.
    fn on_logger_init(&self, _logger: FallbackLogger) {}

    /// A layer to stack beside the primary formatter, taken once when the
    /// global subscriber is installed.
    fn tee_layer(&self) -> Option<BoxedLayer> {
        None
    }

    /// The full configuration document has been parsed.
    fn on_config_parsed(&self, _parsed: &ParsedConfig) -> Result<(), AppError> {
        Ok(())
    }

    /// The stream has begun running.
    fn on_stream_start(&self, _summary: StreamSummary) -> Result<(), AppError> {
        Ok(())
    }
}
