//! Core types and error definitions for the Maestro orchestration workspace.
//!
//! This crate provides the foundational types shared across all Maestro crates.
//!
//! # Main types
//!
//! - [`MaestroError`]: Unified error enum for all Maestro subsystems.
//! - [`MaestroResult`]: Convenience alias for `Result<T, MaestroError>`.
//! - [`ChatRole`]: Role of a language-model message (system, user, assistant).
//! - [`ChatMessage`]: A single message in a language-model request.

/// Error types.
pub mod error;
/// Language-model message types.
pub mod message;

pub use error::{MaestroError, MaestroResult};
pub use message::{ChatMessage, ChatRole};
