//! Lifecycle events as written to the secondary sink.
//!
//! Each event serializes to one flat JSON object:
//! `{"run_id":"…","pipeline_id":"…","timestamp":"…","type":"log",…}`.

use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use tracing::Level;

use crate::bootstrap::run_id::RunId;
use crate::pipeline::summary::SummarySnapshot;

#[derive(Debug, Clone, Serialize)]
pub struct TopicEvent {
    pub run_id: RunId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline_id: Option<String>,
    /// RFC 3339, millisecond precision, UTC.
    pub timestamp: String,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl TopicEvent {
    pub fn now(run_id: RunId, kind: EventKind) -> Self {
        Self {
            run_id,
            pipeline_id: None,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            kind,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Log(LogRecord),
    StreamStarted,
    Status(SummarySnapshot),
    Stopped { error: Option<String> },
}

/// One structured log record captured from `tracing`.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    #[serde(serialize_with = "level_str")]
    pub level: Level,
    pub target: String,
    pub message: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl LogRecord {
    pub fn new(level: Level, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self { level, target: target.into(), message: message.into(), fields: BTreeMap::new() }
    }
}

fn level_str<S: Serializer>(level: &Level, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&level.as_str().to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn log_event_is_flat() {
        let mut record = LogRecord::new(Level::WARN, "chatflow::pipeline", "message dropped");
        record.fields.insert("line".into(), json!("3"));
        let mut event = TopicEvent::now(RunId::from("r1"), EventKind::Log(record));
        event.pipeline_id = Some("orders".into());

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["run_id"], "r1");
        assert_eq!(value["pipeline_id"], "orders");
        assert_eq!(value["type"], "log");
        assert_eq!(value["level"], "warn");
        assert_eq!(value["message"], "message dropped");
        assert_eq!(value["fields"]["line"], "3");
        assert!(value["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn stopped_event_carries_error_text() {
        let event = TopicEvent::now(
            RunId::from("r1"),
            EventKind::Stopped { error: Some("engine error: boom".into()) },
        );
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "stopped");
        assert_eq!(value["error"], "engine error: boom");
        assert!(value.get("pipeline_id").is_none());

        let clean = TopicEvent::now(RunId::from("r1"), EventKind::Stopped { error: None });
        assert_eq!(serde_json::to_value(&clean).unwrap()["error"], serde_json::Value::Null);
    }

    #[test]
    fn status_event_flattens_snapshot() {
        let snap = SummarySnapshot { uptime_ms: 10, received: 3, processed: 2, failed: 1 };
        let value =
            serde_json::to_value(TopicEvent::now(RunId::from("r"), EventKind::Status(snap))).unwrap();
        assert_eq!(value["type"], "status");
        assert_eq!(value["received"], 3);
        assert_eq!(value["failed"], 1);
    }
}
