//! chatflow: a stream pipeline host with an Ollama chat processor.
//!
//! - [`processors`]: the `ollama_chat` processor and its prompt templates
//! - [`llm`]: the Ollama client
//! - [`pipeline`]: host engine contracts plus the stdio engine
//! - [`lifecycle`]: the topic logger (log tee and lifecycle events)
//! - [`orchestrator`]: wires the topic logger around one engine run

mod core;

pub mod bootstrap;
pub mod lifecycle;
pub mod llm;
pub mod orchestrator;
pub mod pipeline;
pub mod processors;

pub use self::core::{config, error};
