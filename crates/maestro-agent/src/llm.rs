use serde::{Deserialize, Serialize};

/// Per-call parameters sent alongside the message list.
///
/// `provider` names the primary provider; `fallback_providers` are tried in
/// order by whichever backend chooses to honour them. The orchestrator itself
/// never retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRequest {
    pub provider: String,
    #[serde(default)]
    pub fallback_providers: Vec<String>,
    /// Model override. `None` uses the provider's configured model.
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ModelRequest {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            fallback_providers: Vec::new(),
            model: None,
            temperature: 0.7,
            max_tokens: 4096,
        }
    }
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Response from a language-model call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    pub model_used: String,
    #[serde(default)]
    pub usage: TokenUsage,
}

impl LlmResponse {
    pub fn new(content: impl Into<String>, model_used: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model_used: model_used.into(),
            usage: TokenUsage::default(),
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = usage;
        self
    }
}

/// Rough token estimation (4 chars ≈ 1 token) for backends that report none.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_total() {
        let usage = TokenUsage::new(120, 30);
        assert_eq!(usage.total_tokens, 150);
    }

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcdefgh"), 2);
    }
}
