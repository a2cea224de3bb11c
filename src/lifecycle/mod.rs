//! Lifecycle event stream: the topic logger, its `tracing` layer, and sinks.

pub mod event;
pub mod layer;
pub mod sink;
pub mod topic_logger;

pub use event::{EventKind, LogRecord, TopicEvent};
pub use layer::TopicLayer;
pub use topic_logger::{TOP_LEVEL_KEY, TopicLogger, topic_logger_field};
