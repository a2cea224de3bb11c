//! The per-message processing contract the host engine drives.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::llm::ProviderError;
use crate::pipeline::message::{Message, MessageBatch};
use crate::processors::template::TemplateError;

/// Why a single message could not be processed.
///
/// Per-message failures never abort other in-flight messages; the host
/// decides whether to retry or drop.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The message itself is unusable (bad payload, template evaluation).
    #[error("validation error: {0}")]
    Validation(String),
    #[error("validation error: {0}")]
    Template(#[from] TemplateError),
    /// The backend call failed; eligible for host-level retry.
    #[error(transparent)]
    Backend(#[from] ProviderError),
}

impl ProcessError {
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Template(_))
    }
}

/// A boxed future returned by [`Processor::process`].
pub type ProcessFuture<'a> =
    Pin<Box<dyn Future<Output = Result<MessageBatch, ProcessError>> + Send + 'a>>;

/// A boxed future returned by [`Processor::close`].
pub type CloseFuture<'a> = Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>>;

/// A message transformation unit.
///
/// `process` is called concurrently for many in-flight messages, so
/// implementors hold only immutable state plus handles that tolerate
/// concurrent use. `close` is called once at shutdown.
pub trait Processor: Send + Sync {
    /// Stable identifier used in log messages.
    fn name(&self) -> &str;

    fn process<'a>(&'a self, cancel: &'a CancellationToken, msg: &'a Message) -> ProcessFuture<'a>;

    fn close(&self) -> CloseFuture<'_>;
}
