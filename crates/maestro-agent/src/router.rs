use crate::backends::echo::EchoBackend;
use crate::backends::openai::OpenAiBackend;
use crate::backends::LlmBackend;
use crate::config::{ProviderConfig, ProviderKind};
use crate::llm::{LlmResponse, ModelRequest};
use async_trait::async_trait;
use maestro_core::{ChatMessage, MaestroError, MaestroResult};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// An `LlmBackend` that routes each request to a named provider and falls
/// through the request's fallback providers in order when one fails.
///
/// There is no backoff and no per-provider retry: each provider in the chain
/// is tried once. Requests naming an unregistered provider go to the default
/// provider when one is set.
pub struct ProviderRouter {
    backends: HashMap<String, Arc<dyn LlmBackend>>,
    default_provider: Option<String>,
}

impl ProviderRouter {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            default_provider: None,
        }
    }

    /// Build a router with one backend per provider config.
    pub fn from_configs(configs: &[ProviderConfig]) -> Self {
        let mut router = Self::new();
        for config in configs {
            let backend: Arc<dyn LlmBackend> = match config.kind {
                ProviderKind::Echo => Arc::new(EchoBackend::new()),
                ProviderKind::OpenAi
                | ProviderKind::OpenRouter
                | ProviderKind::Groq
                | ProviderKind::Local => Arc::new(OpenAiBackend::new(config.clone())),
            };
            router.register(config.name.clone(), backend);
        }
        router
    }

    /// Register (or replace) a backend under a provider name.
    pub fn register(&mut self, name: impl Into<String>, backend: Arc<dyn LlmBackend>) {
        let name = name.into();
        if self.default_provider.is_none() {
            self.default_provider = Some(name.clone());
        }
        self.backends.insert(name, backend);
    }

    pub fn with_default(mut self, name: impl Into<String>) -> Self {
        self.default_provider = Some(name.into());
        self
    }

    pub fn providers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.backends.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn chain(&self, request: &ModelRequest) -> Vec<(String, Arc<dyn LlmBackend>)> {
        let mut chain = Vec::new();
        for name in std::iter::once(&request.provider).chain(&request.fallback_providers) {
            match self.backends.get(name) {
                Some(backend) => chain.push((name.clone(), Arc::clone(backend))),
                None => warn!(provider = %name, "Unknown provider in request, skipping"),
            }
        }
        if chain.is_empty() {
            if let Some(default) = &self.default_provider {
                if let Some(backend) = self.backends.get(default) {
                    chain.push((default.clone(), Arc::clone(backend)));
                }
            }
        }
        chain
    }
}

impl Default for ProviderRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmBackend for ProviderRouter {
    async fn send(
        &self,
        messages: &[ChatMessage],
        request: &ModelRequest,
    ) -> MaestroResult<LlmResponse> {
        let chain = self.chain(request);
        if chain.is_empty() {
            return Err(MaestroError::Provider(format!(
                "No backend registered for provider '{}'",
                request.provider
            )));
        }

        let mut last_err: Option<MaestroError> = None;
        for (idx, (name, backend)) in chain.iter().enumerate() {
            match backend.send(messages, request).await {
                Ok(resp) => {
                    if idx > 0 {
                        info!(provider = %name, "Served by fallback provider");
                    }
                    return Ok(resp);
                }
                Err(e) => {
                    warn!(provider = %name, error = %e, "Provider failed, trying next");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| MaestroError::Provider("All providers exhausted".into())))
    }
}
