use super::LlmBackend;
use crate::config::{ProviderConfig, ProviderKind};
use crate::llm::{LlmResponse, ModelRequest, TokenUsage};
use async_trait::async_trait;
use maestro_core::{ChatMessage, MaestroError, MaestroResult};
use std::time::Duration;
use tracing::debug;

/// OpenAI-compatible API backend.
///
/// Works with OpenAI, OpenRouter, Groq, Ollama, and any other provider
/// that implements the OpenAI chat completions API.
pub struct OpenAiBackend {
    config: ProviderConfig,
    api_key: String,
    http: reqwest::Client,
}

impl OpenAiBackend {
    pub fn new(config: ProviderConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        let api_key = config.resolved_api_key();
        Self {
            config,
            api_key,
            http,
        }
    }

    fn build_messages(&self, messages: &[ChatMessage]) -> Vec<serde_json::Value> {
        messages
            .iter()
            .map(|m| {
                serde_json::json!({
                    "role": m.role.as_str(),
                    "content": m.content,
                })
            })
            .collect()
    }

    fn add_provider_headers(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.header("Content-Type", "application/json");
        let request = if self.api_key.is_empty() {
            request
        } else {
            request.header("Authorization", format!("Bearer {}", self.api_key))
        };

        // OpenRouter requires extra headers
        if matches!(self.config.kind, ProviderKind::OpenRouter) {
            request
                .header("HTTP-Referer", "https://github.com/fboiero/Maestro")
                .header("X-Title", "Maestro")
        } else {
            request
        }
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    async fn send(
        &self,
        messages: &[ChatMessage],
        request: &ModelRequest,
    ) -> MaestroResult<LlmResponse> {
        let url = format!("{}/v1/chat/completions", self.config.base_url());
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.config.model_id.clone());

        let body = serde_json::json!({
            "model": model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "messages": self.build_messages(messages),
        });

        debug!(provider = %self.config.name, model = %model, "Sending chat completion");

        let resp = self
            .add_provider_headers(self.http.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| MaestroError::Provider(e.to_string()))?;

        let status = resp.status();
        let resp_body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| MaestroError::Provider(e.to_string()))?;

        if !status.is_success() {
            return Err(MaestroError::Provider(format!(
                "{} API error {}: {}",
                self.config.name, status, resp_body
            )));
        }

        parse_openai_response(&resp_body, &model)
    }
}

/// Extract content, model and usage from a chat-completions response body.
pub fn parse_openai_response(
    body: &serde_json::Value,
    requested_model: &str,
) -> MaestroResult<LlmResponse> {
    let message = &body["choices"][0]["message"];
    let content = message["content"].as_str().ok_or_else(|| {
        MaestroError::Provider(format!("Response has no message content: {body}"))
    })?;

    let model_used = body["model"].as_str().unwrap_or(requested_model);
    let usage = &body["usage"];
    let prompt = usage["prompt_tokens"].as_u64().unwrap_or(0);
    let completion = usage["completion_tokens"].as_u64().unwrap_or(0);
    let mut token_usage = TokenUsage::new(prompt, completion);
    if let Some(total) = usage["total_tokens"].as_u64() {
        token_usage.total_tokens = total;
    }

    Ok(LlmResponse::new(content, model_used).with_usage(token_usage))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response_with_usage() {
        let body = serde_json::json!({
            "model": "gpt-4o-mini-2024",
            "choices": [{"message": {"role": "assistant", "content": "done"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        });
        let resp = parse_openai_response(&body, "gpt-4o-mini").unwrap();
        assert_eq!(resp.content, "done");
        assert_eq!(resp.model_used, "gpt-4o-mini-2024");
        assert_eq!(resp.usage.total_tokens, 15);
    }

    #[test]
    fn test_parse_response_without_usage_falls_back() {
        let body = serde_json::json!({
            "choices": [{"message": {"content": "hi"}}]
        });
        let resp = parse_openai_response(&body, "local-model").unwrap();
        assert_eq!(resp.model_used, "local-model");
        assert_eq!(resp.usage, TokenUsage::default());
    }

    #[test]
    fn test_parse_response_missing_content_is_provider_error() {
        let body = serde_json::json!({"error": {"message": "overloaded"}});
        let err = parse_openai_response(&body, "m").unwrap_err();
        assert!(err.is_provider());
    }
}
