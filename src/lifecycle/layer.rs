//! `tracing` layer that tees every event into a [`TopicLogger`].

use std::collections::BTreeMap;
use std::fmt;

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

use crate::lifecycle::event::LogRecord;
use crate::lifecycle::topic_logger::TopicLogger;

/// Events from this target prefix are never forwarded.
const INTERNAL_TARGET: &str = "chatflow::lifecycle";

#[derive(Debug, Clone)]
pub struct TopicLayer {
    logger: TopicLogger,
}

impl TopicLayer {
    pub fn new(logger: TopicLogger) -> Self {
        Self { logger }
    }
}

impl<S: Subscriber> Layer<S> for TopicLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if meta.target().starts_with(INTERNAL_TARGET) {
            return;
        }

        let mut visitor = RecordVisitor::default();
        event.record(&mut visitor);

        self.logger.write(LogRecord {
            level: *meta.level(),
            target: meta.target().to_string(),
            message: visitor.message,
            fields: visitor.fields,
        });
    }
}

/// Collects `message` plus every other field as JSON.
#[derive(Default)]
struct RecordVisitor {
    message: String,
    fields: BTreeMap<String, serde_json::Value>,
}

impl RecordVisitor {
    fn insert(&mut self, field: &Field, value: serde_json::Value) {
        self.fields.insert(field.name().to_string(), value);
    }
}

impl Visit for RecordVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let text = format!("{value:?}");
        if field.name() == "message" {
            self.message = text;
        } else {
            self.insert(field, serde_json::Value::String(text));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.insert(field, value.into());
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, value.into());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, value.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tracing_subscriber::layer::SubscriberExt;

    use crate::bootstrap::run_id::RunId;
    use crate::config::ParsedConfig;

    #[tokio::test]
    async fn layer_forwards_structured_fields_and_skips_internal_targets() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("events.jsonl");
        let logger = TopicLogger::new(RunId::from("r"));
        let root: toml::Value = toml::from_str(&format!(
            "status_interval_seconds = 0\nsink = {{ type = \"file\", path = \"{}\" }}\n",
            path.display()
        ))
        .unwrap();
        logger.init_output(&ParsedConfig::new(root)).unwrap();

        let subscriber = tracing_subscriber::registry().with(logger.layer());
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "app", line = 7u64, ok = true, name = "x", "processed");
            tracing::info!(target: "chatflow::lifecycle::topic_logger", "internal");
        });
        logger.close(Duration::from_secs(2)).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let events: Vec<serde_json::Value> =
            text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["message"], "processed");
        assert_eq!(events[0]["target"], "app");
        assert_eq!(events[0]["fields"]["line"], 7);
        assert_eq!(events[0]["fields"]["ok"], true);
        assert_eq!(events[0]["fields"]["name"], "x");
    }
}
