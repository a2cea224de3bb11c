//! Ollama chat client (`POST /api/chat`).
//!
//! Requests are always non-streaming. Ollama may still answer with several
//! newline-delimited JSON chunks; the whole body is consumed and the last
//! chunk's message content is the result.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use crate::llm::{ChatRequest, ProviderError};

/// Address used when no `server_address` is configured.
pub const DEFAULT_SERVER_ADDRESS: &str = "http://127.0.0.1:11434";

const PING_TIMEOUT: Duration = Duration::from_secs(5);

// ── Public client ─────────────────────────────────────────────────────────────

/// Adapter for an Ollama server.
///
/// Constructed once at startup, then cheaply cloned because `reqwest::Client`
/// is an `Arc` internally. Safe for concurrent use.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    server_address: String,
    model: String,
    closed: Arc<AtomicBool>,
}

impl OllamaClient {
    /// Build a client. `server_address` falls back to [`DEFAULT_SERVER_ADDRESS`].
    pub fn new(
        server_address: Option<&str>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to build HTTP client: {e}")))?;

        let server_address = server_address
            .unwrap_or(DEFAULT_SERVER_ADDRESS)
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client,
            server_address,
            model: model.into(),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn server_address(&self) -> &str {
        &self.server_address
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Lightweight reachability probe.
    ///
    /// Any HTTP response means the server is reachable; only a transport
    /// failure is treated as unreachable. Uses a hard 5-second timeout.
    pub async fn ping(&self) -> Result<(), ProviderError> {
        let client = Client::builder()
            .timeout(PING_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to build ping client: {e}")))?;
        client
            .get(&self.server_address)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| ProviderError::Request(format!("unreachable: {e}")))
    }

    /// Generate a reply for `user`, optionally steered by `system`.
    ///
    /// Returns as soon as `cancel` fires; the in-flight HTTP request is
    /// dropped. Backend failures are returned as-is, never retried.
    pub async fn generate(
        &self,
        cancel: &CancellationToken,
        system: &str,
        user: &str,
    ) -> Result<String, ProviderError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ProviderError::Request("client is closed".into()));
        }

        let request = ChatRequest::new(&self.model, system, user);
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            prompt_len = user.len(),
            "sending chat request"
        );
        if tracing::enabled!(tracing::Level::TRACE) {
            let json = serde_json::to_string_pretty(&request)
                .unwrap_or_else(|e| format!("<serialization failed: {e}>"));
            trace!(payload = %json, "full chat request payload");
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(model = %self.model, "chat request cancelled");
                Err(ProviderError::Cancelled)
            }
            result = self.send(&request) => result,
        }
    }

    /// Mark the client closed; later calls fail fast. Idempotent.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    async fn send(&self, request: &ChatRequest) -> Result<String, ProviderError> {
        let url = format!("{}/api/chat", self.server_address);
        let response = self.client.post(&url).json(request).send().await.map_err(|e| {
            error!(%url, error = %e, "chat request failed (transport)");
            ProviderError::Request(e.to_string())
        })?;

        let response = check_status(response).await?;

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Request(format!("failed to read response body: {e}")))?;

        collect_content(&body)
    }
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: String,
}

/// Walk every chunk of a (possibly multi-line) response body; the last
/// message wins. A chunk carrying `error` fails the whole response.
fn collect_content(body: &str) -> Result<String, ProviderError> {
    let mut content = None;
    for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let chunk: ChatChunk = serde_json::from_str(line).map_err(|e| {
            error!(error = %e, "failed to deserialize chat response chunk");
            ProviderError::Decode(e.to_string())
        })?;
        if let Some(err) = chunk.error {
            return Err(ProviderError::Backend(err));
        }
        if let Some(message) = chunk.message {
            content = Some(message.content);
        }
    }
    content.ok_or_else(|| ProviderError::Decode("response contained no message".into()))
}

/// Consume the response and return it if successful, or a structured error.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error body>".to_string());

    let message = match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(env) => env.error,
        Err(_) => body,
    };

    error!(%status, %message, "chat request returned HTTP error");
    Err(ProviderError::Status { status: status.as_u16(), message })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> OllamaClient {
        OllamaClient::new(Some(&server.uri()), "llama3", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn default_server_address_used_when_absent() {
        let c = OllamaClient::new(None, "llama3", Duration::from_secs(1)).unwrap();
        assert_eq!(c.server_address(), DEFAULT_SERVER_ADDRESS);
        let c = OllamaClient::new(Some("http://host:1/"), "m", Duration::from_secs(1)).unwrap();
        assert_eq!(c.server_address(), "http://host:1");
    }

    #[test]
    fn last_chunk_wins() {
        let body = concat!(
            r#"{"message":{"role":"assistant","content":"partial"},"done":false}"#,
            "\n",
            r#"{"message":{"role":"assistant","content":"final"},"done":true}"#,
            "\n"
        );
        assert_eq!(collect_content(body).unwrap(), "final");
    }

    #[test]
    fn error_chunk_fails() {
        let body = r#"{"error":"model 'nope' not found"}"#;
        match collect_content(body) {
            Err(ProviderError::Backend(msg)) => assert!(msg.contains("not found")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn empty_body_is_decode_error() {
        assert!(matches!(collect_content(""), Err(ProviderError::Decode(_))));
        assert!(matches!(collect_content("not json"), Err(ProviderError::Decode(_))));
    }

    #[test]
    fn empty_content_is_allowed() {
        let body = r#"{"message":{"role":"assistant","content":""},"done":true}"#;
        assert_eq!(collect_content(body).unwrap(), "");
    }

    #[tokio::test]
    async fn generate_posts_non_streaming_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_json(serde_json::json!({
                "model": "llama3",
                "messages": [{ "role": "user", "content": "hello" }],
                "stream": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "llama3",
                "message": { "role": "assistant", "content": "hi there" },
                "done": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let reply = client_for(&server)
            .generate(&CancellationToken::new(), "", "hello")
            .await
            .unwrap();
        assert_eq!(reply, "hi there");
    }

    #[tokio::test]
    async fn http_error_surfaces_backend_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(serde_json::json!({ "error": "model \"llama3\" not found" })),
            )
            .mount(&server)
            .await;

        let err = client_for(&server)
            .generate(&CancellationToken::new(), "", "hello")
            .await
            .unwrap_err();
        match err {
            ProviderError::Status { status, message } => {
                assert_eq!(status, 404);
                assert!(message.contains("not found"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancellation_aborts_in_flight_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(30))
                    .set_body_json(serde_json::json!({ "message": { "content": "late" } })),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let err = client.generate(&cancel, "", "hello").await.unwrap_err();
        assert!(matches!(err, ProviderError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn closed_client_fails_fast() {
        let c = OllamaClient::new(None, "llama3", Duration::from_secs(1)).unwrap();
        c.close();
        c.close();
        let err = c.generate(&CancellationToken::new(), "", "x").await.unwrap_err();
        assert!(err.to_string().contains("closed"));
    }
}
