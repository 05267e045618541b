pub mod echo;
pub mod openai;

use crate::llm::{LlmResponse, ModelRequest};
use async_trait::async_trait;
use maestro_core::{ChatMessage, MaestroResult};

/// Trait for language-model backends.
///
/// The orchestrator sees exactly one `LlmBackend`; provider selection and
/// failover happen behind it (see [`crate::ProviderRouter`]). Any transport or
/// rate-limit failure must surface as [`maestro_core::MaestroError::Provider`].
///
/// To add a new provider:
/// 1. Create a new module in `backends/`
/// 2. Implement `LlmBackend` for your struct
/// 3. Add the variant to `ProviderKind` in `config.rs`
/// 4. Wire it up in `ProviderRouter::from_configs()` in `router.rs`
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Non-streaming chat completion over an ordered message list.
    async fn send(
        &self,
        messages: &[ChatMessage],
        request: &ModelRequest,
    ) -> MaestroResult<LlmResponse>;
}
