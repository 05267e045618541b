//! Task scheduling and multi-agent collaboration for Maestro.
//!
//! Tasks are scored against a registry of specialist agents and either run
//! by the best single agent or handed to a collaboration of several agents
//! working under one of four strategies (sequential, parallel, hierarchical,
//! consensus). A message bus, a negotiation resolver and a periodic
//! maintenance sweep round out the engine.
//!
//! # Main types
//!
//! - [`Orchestrator`]: Facade owning all state; submit tasks, drive ticks, start loops.
//! - [`OrchestratorState`]: The single-writer state behind the facade's lock.
//! - [`Agent`] / [`Task`]: The registry and queue records.
//! - [`Collaboration`] / [`Negotiation`]: Multi-agent work and proposal selection.
//! - [`AgentMessage`]: Messages carried by the bus.

/// Collaboration records, complexity analysis and the collaboration lifecycle.
pub mod collaboration;
/// Orchestrator configuration.
pub mod config;
/// Context assembly from persistence and optional knowledge sources.
pub mod context;
/// Orchestrator facade, ticks and background loops.
pub mod engine;
/// Single language-model call per agent.
pub mod executor;
/// Timeout sweep and specialization learning.
pub mod maintenance;
/// Agent message queue, inboxes and dispatch.
pub mod message_bus;
/// Proposal collection and resolution.
pub mod negotiation;
/// Running performance metrics.
pub mod performance;
/// Storage traits plus in-memory and file-backed stores.
pub mod persistence;
/// Default agent roster and role prompts.
pub mod profiles;
/// Prompt construction.
pub mod prompt;
/// Agent registry.
pub mod registry;
/// Task submission, routing and direct execution bookkeeping.
pub mod scheduler;
/// Agent scoring and selection.
pub mod scoring;
/// Learned per-agent specializations.
pub mod specialization;
/// Shared orchestrator state.
pub mod state;
/// The four collaboration strategies.
pub mod strategies;
/// Task store and work queue.
pub mod task_queue;
/// Shared orchestration types.
pub mod types;

pub use collaboration::{Collaboration, CollaborationStatus, CollaborationType};
pub use config::OrchestratorConfig;
pub use context::{ContextBundle, KnowledgeGraph, KnowledgeSnippet, SemanticSearch};
pub use engine::{Orchestrator, OrchestratorHandle};
pub use maintenance::MaintenanceReport;
pub use message_bus::{AgentMessage, MessageTarget, MessageType};
pub use negotiation::{Negotiation, NegotiationStatus, Proposal};
pub use persistence::{FileStore, InMemoryPersistence, Persistence, Project, ProjectFile};
pub use profiles::default_agents;
pub use state::OrchestratorState;
pub use types::{
    Agent, AgentConfig, AgentConfigPatch, AgentId, AgentPerformance, AgentRole, AgentStatus,
    AgentStatusReport, Artifact, ArtifactKind, OrchestrationStats, SubmitOptions, SubmitOutcome,
    Task, TaskAssignment, TaskId, TaskPriority, TaskResult, TaskStatus, TaskType,
};
