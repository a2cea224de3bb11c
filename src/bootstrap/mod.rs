//! Bootstrap layer: modules that run before the pipeline starts.
//!
//! - **logger**: tracing-subscriber initialisation and the fallback logger.
//! - **run_id**: per-process run identity.

pub mod logger;
pub mod run_id;
