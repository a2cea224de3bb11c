//! Secondary sinks for lifecycle events.

use std::fs::OpenOptions;

use reqwest::Client;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::config::SinkConfig;
use crate::error::AppError;
use crate::lifecycle::event::TopicEvent;

#[derive(Debug)]
pub enum EventSink {
    /// JSON lines appended to a local file.
    File(File),
    /// Each event POSTed as a JSON body.
    Http { client: Client, url: String },
}

impl EventSink {
    /// Open the sink. Does no network I/O.
    pub fn open(config: &SinkConfig) -> Result<Self, AppError> {
        match config {
            SinkConfig::File { path } => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        AppError::Lifecycle(format!("cannot create {}: {e}", parent.display()))
                    })?;
                }
                let file = OpenOptions::new().create(true).append(true).open(path).map_err(|e| {
                    AppError::Lifecycle(format!("cannot open event sink {}: {e}", path.display()))
                })?;
                Ok(Self::File(File::from_std(file)))
            }
            SinkConfig::Http { url, timeout } => {
                let client = Client::builder().timeout(*timeout).build().map_err(|e| {
                    AppError::Lifecycle(format!("failed to build event sink HTTP client: {e}"))
                })?;
                Ok(Self::Http { client, url: url.clone() })
            }
        }
    }

    pub async fn write(&mut self, event: &TopicEvent) -> Result<(), AppError> {
        match self {
            Self::File(file) => {
                let mut line = serde_json::to_vec(event)
                    .map_err(|e| AppError::Lifecycle(format!("failed to encode event: {e}")))?;
                line.push(b'\n');
                file.write_all(&line).await?;
                file.flush().await?;
                Ok(())
            }
            Self::Http { client, url } => {
                let response = client
                    .post(url.as_str())
                    .json(event)
                    .send()
                    .await
                    .map_err(|e| AppError::Lifecycle(format!("event POST to {url} failed: {e}")))?;
                let status = response.status();
                if status.is_success() {
                    Ok(())
                } else {
                    Err(AppError::Lifecycle(format!("event POST to {url} returned HTTP {status}")))
                }
            }
        }
    }

    pub async fn flush(&mut self) -> Result<(), AppError> {
        if let Self::File(file) = self {
            file.sync_all().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::bootstrap::run_id::RunId;
    use crate::lifecycle::event::EventKind;

    fn event() -> TopicEvent {
        TopicEvent::now(RunId::from("r1"), EventKind::StreamStarted)
    }

    #[tokio::test]
    async fn file_sink_appends_json_lines() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested/events.jsonl");
        let mut sink = EventSink::open(&SinkConfig::File { path: path.clone() }).unwrap();
        sink.write(&event()).await.unwrap();
        sink.write(&event()).await.unwrap();
        sink.flush().await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["type"], "stream_started");
    }

    #[tokio::test]
    async fn http_sink_posts_and_reports_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/events"))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let config = SinkConfig::Http {
            url: format!("{}/events", server.uri()),
            timeout: Duration::from_secs(2),
        };
        let mut sink = EventSink::open(&config).unwrap();
        sink.write(&event()).await.unwrap();

        let bad = SinkConfig::Http {
            url: format!("{}/missing", server.uri()),
            timeout: Duration::from_secs(2),
        };
        let err = EventSink::open(&bad).unwrap().write(&event()).await.unwrap_err();
        assert!(err.to_string().contains("404"));
    }
}
