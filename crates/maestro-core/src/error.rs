use uuid::Uuid;

/// Top-level error type for the Maestro workspace.
///
/// Variants map one-to-one onto the failure modes the orchestrator surfaces
/// to its callers. Execution-time failures are also recorded as text into a
/// task's result, so every variant has a readable `Display`.
#[derive(Debug, thiserror::Error)]
pub enum MaestroError {
    /// No active, idle agent could take the work.
    #[error("No available agent: {0}")]
    NoAvailableAgent(String),

    /// The language-model backend failed (transport, rate limit, bad reply).
    #[error("Provider error: {0}")]
    Provider(String),

    /// A collaboration stayed in progress past its deadline.
    #[error("Collaboration {0} timed out")]
    CollaborationTimeout(Uuid),

    /// A negotiation was not resolved before its deadline.
    #[error("Negotiation {0} timed out")]
    NegotiationTimeout(Uuid),

    /// A second negotiation was opened for a task that already has a live one.
    #[error("Negotiation already in progress for task {0}")]
    NegotiationInProgress(Uuid),

    /// A collaboration was requested for a task that already has an active one.
    #[error("Collaboration already active for task {0}")]
    CollaborationInProgress(Uuid),

    /// A negotiation ended without any proposal to choose from.
    #[error("Negotiation {0} failed: no proposals")]
    NegotiationFailed(Uuid),

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("Collaboration not found: {0}")]
    CollaborationNotFound(Uuid),

    #[error("Negotiation not found: {0}")]
    NegotiationNotFound(Uuid),

    /// A lifecycle transition that the state machine does not allow.
    #[error("Invalid transition for {entity}: {from} -> {to}")]
    InvalidTransition {
        entity: String,
        from: String,
        to: String,
    },

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A persistence collaborator failed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`MaestroError`].
pub type MaestroResult<T> = Result<T, MaestroError>;

impl MaestroError {
    /// Build an [`MaestroError::InvalidTransition`] from any displayable states.
    pub fn invalid_transition(
        entity: impl Into<String>,
        from: impl std::fmt::Display,
        to: impl std::fmt::Display,
    ) -> Self {
        Self::InvalidTransition {
            entity: entity.into(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Whether this error came from the language-model layer.
    pub fn is_provider(&self) -> bool {
        matches!(self, Self::Provider(_))
    }
}
