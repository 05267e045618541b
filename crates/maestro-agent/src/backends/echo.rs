use super::LlmBackend;
use crate::llm::{estimate_tokens, LlmResponse, ModelRequest, TokenUsage};
use async_trait::async_trait;
use maestro_core::{ChatMessage, ChatRole, MaestroResult};

/// Offline backend that answers with the last user message.
///
/// Lets the CLI and demos drive the whole orchestration loop without network
/// access. Token usage is estimated from character counts.
#[derive(Debug, Default, Clone)]
pub struct EchoBackend {
    prefix: String,
}

impl EchoBackend {
    pub fn new() -> Self {
        Self {
            prefix: "[echo]".to_string(),
        }
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

#[async_trait]
impl LlmBackend for EchoBackend {
    async fn send(
        &self,
        messages: &[ChatMessage],
        request: &ModelRequest,
    ) -> MaestroResult<LlmResponse> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        let content = format!("{} {last_user}", self.prefix);
        let prompt_tokens: u64 = messages.iter().map(|m| estimate_tokens(&m.content)).sum();
        let usage = TokenUsage::new(prompt_tokens, estimate_tokens(&content));
        let model = request.model.clone().unwrap_or_else(|| "echo".to_string());

        Ok(LlmResponse::new(content, model).with_usage(usage))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_returns_last_user_message() {
        let backend = EchoBackend::new();
        let messages = vec![
            ChatMessage::system("sys"),
            ChatMessage::user("first"),
            ChatMessage::assistant("reply"),
            ChatMessage::user("second"),
        ];
        let resp = backend
            .send(&messages, &ModelRequest::new("echo"))
            .await
            .unwrap();
        assert_eq!(resp.content, "[echo] second");
        assert_eq!(resp.model_used, "echo");
        assert!(resp.usage.total_tokens > 0);
    }
}
