//! Host engine contracts and the stdio engine.
//!
//! A pipeline engine reads messages, runs them through a [`Processor`], and
//! writes the results. Embedders drive it through [`Engine::run`] and
//! observe it through [`CliHooks`].

pub mod engine;
pub mod hooks;
pub mod message;
pub mod processor;
pub mod stdio;
pub mod summary;

pub use engine::{CliOptions, Engine, EngineFuture, EngineOutcome};
pub use hooks::CliHooks;
pub use message::{Message, MessageBatch};
pub use processor::{ProcessError, Processor};
pub use stdio::StdioEngine;
pub use summary::{StreamSummary, SummarySnapshot};
