use serde::{Deserialize, Serialize};

/// Wire protocol spoken by a configured provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    OpenRouter,
    /// Groq cloud inference, OpenAI-compatible API.
    Groq,
    /// Local OpenAI-compatible server (Ollama, LM Studio, vLLM).
    Local,
    /// Offline backend that reflects the prompt back. No network.
    Echo,
}

/// A named language-model provider an agent can reference by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub kind: ProviderKind,
    /// Model used when the request does not name one.
    pub model_id: String,
    #[serde(default)]
    pub api_key: String,
    /// Environment variable to read the API key from when `api_key` is empty.
    #[serde(default)]
    pub api_key_env: Option<String>,
    pub api_base_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    120
}

impl ProviderConfig {
    pub fn base_url(&self) -> &str {
        if let Some(url) = &self.api_base_url {
            url
        } else {
            match self.kind {
                ProviderKind::OpenAi => "https://api.openai.com",
                ProviderKind::OpenRouter => "https://openrouter.ai/api",
                ProviderKind::Groq => "https://api.groq.com/openai",
                ProviderKind::Local => "http://localhost:11434",
                ProviderKind::Echo => "local://echo",
            }
        }
    }

    /// The API key, falling back to `api_key_env` when none is inlined.
    pub fn resolved_api_key(&self) -> String {
        if !self.api_key.is_empty() {
            return self.api_key.clone();
        }
        self.api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .unwrap_or_default()
    }

    /// An echo provider with the given name, useful offline and in tests.
    pub fn echo(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ProviderKind::Echo,
            model_id: "echo".to_string(),
            api_key: String::new(),
            api_key_env: None,
            api_base_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_base_urls() {
        let mut cfg = ProviderConfig::echo("x");
        cfg.kind = ProviderKind::Groq;
        assert_eq!(cfg.base_url(), "https://api.groq.com/openai");
        cfg.api_base_url = Some("http://127.0.0.1:9000".into());
        assert_eq!(cfg.base_url(), "http://127.0.0.1:9000");
    }

    #[test]
    fn test_parse_provider_config() {
        let cfg: ProviderConfig = from_json(
            r#"{"name":"openai","kind":"openai","model_id":"gpt-4o-mini","api_base_url":null}"#,
        );
        assert_eq!(cfg.kind, ProviderKind::OpenAi);
        assert_eq!(cfg.timeout_secs, 120);
        assert!(cfg.api_key.is_empty());
    }

    fn from_json(json: &str) -> ProviderConfig {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_inline_key_wins_over_env() {
        let mut cfg = ProviderConfig::echo("x");
        cfg.api_key = "inline".into();
        cfg.api_key_env = Some("MAESTRO_TEST_NEVER_SET".into());
        assert_eq!(cfg.resolved_api_key(), "inline");
        cfg.api_key.clear();
        assert_eq!(cfg.resolved_api_key(), "");
    }
}
