//! `ollama_chat` processor: replaces each message's payload with an LLM reply.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{Field, OllamaChatConfig};
use crate::error::AppError;
use crate::llm::ollama::OllamaClient;
use crate::pipeline::message::Message;
use crate::pipeline::processor::{CloseFuture, ProcessError, ProcessFuture, Processor};
use crate::processors::prompt::PromptResolver;

pub const PROCESSOR_NAME: &str = "ollama_chat";

/// Config schema entry for `[pipeline.ollama_chat]`.
pub fn config_field() -> Field {
    Field::object(
        PROCESSOR_NAME,
        "Generate a reply with an Ollama model and use it as the new payload.",
        vec![
            Field::scalar("server_address", "Ollama server address. Defaults to the local server."),
            Field::scalar("model", "Model name. Required."),
            Field::scalar("prompt", "User prompt template. Defaults to the raw payload."),
            Field::scalar("system_prompt", "System prompt template."),
            Field::scalar("timeout_seconds", "Per-request timeout in seconds."),
        ],
    )
}

/// Stateless apart from the compiled templates and the shared client, so
/// concurrent `process` calls are safe.
#[derive(Debug, Clone)]
pub struct OllamaChatProcessor {
    resolver: PromptResolver,
    client: OllamaClient,
}

impl OllamaChatProcessor {
    /// Compile templates and build the client. Template syntax errors fail
    /// here, not per message.
    pub fn new(config: &OllamaChatConfig) -> Result<Self, AppError> {
        if config.model.trim().is_empty() {
            return Err(AppError::Config(format!("{PROCESSOR_NAME}: model must not be empty")));
        }
        let resolver =
            PromptResolver::new(config.prompt.as_deref(), config.system_prompt.as_deref())
                .map_err(|e| AppError::Config(format!("{PROCESSOR_NAME}: {e}")))?;
        let client = OllamaClient::new(
            config.server_address.as_deref(),
            config.model.clone(),
            Duration::from_secs(config.timeout_seconds),
        )
        .map_err(|e| AppError::Config(format!("{PROCESSOR_NAME}: {e}")))?;

        Ok(Self { resolver, client })
    }

    pub fn client(&self) -> &OllamaClient {
        &self.client
    }

    async fn run(&self, cancel: &CancellationToken, msg: &Message) -> Result<Message, ProcessError> {
        let prompt = self.resolver.resolve(msg)?;

        let call_token = cancel.child_token();
        let reply = self
            .client
            .generate(&call_token, &prompt.system, &prompt.user)
            .await
            .inspect_err(|e| warn!(model = %self.client.model(), error = %e, "chat completion failed"))?;

        debug!(reply_len = reply.len(), "chat completion succeeded");
        let mut out = msg.copy();
        out.set_bytes(reply);
        Ok(out)
    }
}

impl Processor for OllamaChatProcessor {
    fn name(&self) -> &str {
        PROCESSOR_NAME
    }

    fn process<'a>(&'a self, cancel: &'a CancellationToken, msg: &'a Message) -> ProcessFuture<'a> {
        Box::pin(async move { Ok(vec![self.run(cancel, msg).await?]) })
    }

    fn close(&self) -> CloseFuture<'_> {
        Box::pin(async move {
            self.client.close();
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_validates_model_and_templates() {
        assert!(OllamaChatProcessor::new(&OllamaChatConfig::new("llama3")).is_ok());
        assert!(OllamaChatProcessor::new(&OllamaChatConfig::new(" ")).is_err());

        let mut cfg = OllamaChatConfig::new("llama3");
        cfg.prompt = Some("${! unterminated".into());
        let msg = OllamaChatProcessor::new(&cfg).unwrap_err().to_string();
        assert!(msg.contains("unterminated"));
    }

    #[tokio::test]
    async fn invalid_utf8_fails_before_backend() {
        // Port 9 on loopback: any backend call would fail with a transport error.
        let mut cfg = OllamaChatConfig::new("llama3");
        cfg.server_address = Some("http://127.0.0.1:9".into());
        let p = OllamaChatProcessor::new(&cfg).unwrap();
        let err = p
            .process(&CancellationToken::new(), &Message::new(vec![0xFF, 0xFE]))
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn close_twice_is_harmless() {
        let p = OllamaChatProcessor::new(&OllamaChatConfig::new("llama3")).unwrap();
        p.close().await.unwrap();
        p.close().await.unwrap();
    }

    #[test]
    fn schema_field_lists_every_option() {
        let field = config_field();
        let crate::config::FieldKind::Object(children) = field.kind else {
            panic!("expected object");
        };
        let names: Vec<_> = children.iter().map(|f| f.name).collect();
        assert_eq!(names, ["server_address", "model", "prompt", "system_prompt", "timeout_seconds"]);
    }
}
