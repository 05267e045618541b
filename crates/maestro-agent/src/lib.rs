//! Language-model interface for Maestro agents.
//!
//! The orchestrator talks to exactly one [`LlmBackend`]. This crate provides
//! the trait, the request/response types, an OpenAI-compatible HTTP backend,
//! an offline echo backend, and a [`ProviderRouter`] that maps provider names
//! to backends and walks fallback providers on failure.

pub mod backends;
pub mod config;
pub mod llm;
pub mod router;

pub use backends::echo::EchoBackend;
pub use backends::openai::OpenAiBackend;
pub use backends::LlmBackend;
pub use config::{ProviderConfig, ProviderKind};
pub use llm::{LlmResponse, ModelRequest, TokenUsage};
pub use router::ProviderRouter;
