use crate::collaboration::CollaborationType;
use crate::message_bus::AgentMessage;
use chrono::{DateTime, Utc};
use maestro_agent::ModelRequest;
use maestro_core::{MaestroError, MaestroResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Agents are addressed by a stable slug (`"code-master"`).
pub type AgentId = String;
pub type TaskId = Uuid;

/// Role of each agent in the multi-agent system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    /// Writes and refactors code.
    Coder,
    /// Produces UI/UX designs and prototypes.
    Designer,
    /// Writes tests and hunts defects.
    QualityAssurance,
    /// Ships builds, pipelines and infrastructure.
    DevOps,
    /// Diagnoses failures and performance problems.
    Debugger,
}

impl AgentRole {
    /// Human-readable job title.
    pub fn title(&self) -> &'static str {
        match self {
            AgentRole::Coder => "Senior Developer",
            AgentRole::Designer => "UI/UX Designer",
            AgentRole::QualityAssurance => "Quality Assurance",
            AgentRole::DevOps => "DevOps Engineer",
            AgentRole::Debugger => "Debug Specialist",
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.title())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Idle,
    Working,
    Error,
    Paused,
}

/// Rolling performance history. Rates are normalized to `[0, 1]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentPerformance {
    pub tasks_completed: u64,
    pub success_rate: f64,
    pub average_time_ms: f64,
    pub quality_score: f64,
    pub user_rating: f64,
}

impl AgentPerformance {
    /// Weighted blend used to compare otherwise equal candidates.
    pub fn composite(&self) -> f64 {
        0.5 * self.success_rate + 0.3 * self.quality_score + 0.2 * self.user_rating
    }
}

/// Per-agent language-model settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub primary_provider: String,
    #[serde(default)]
    pub fallback_providers: Vec<String>,
    /// Model override; `None` uses the provider's default model.
    #[serde(default)]
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// System prompt template. `{name}`, `{role}` and `{capabilities}` are substituted.
    #[serde(default)]
    pub prompt_template: Option<String>,
    #[serde(default)]
    pub tool_tags: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            primary_provider: "default".to_string(),
            fallback_providers: Vec::new(),
            model: None,
            temperature: 0.7,
            max_tokens: 4096,
            prompt_template: None,
            tool_tags: Vec::new(),
        }
    }
}

impl AgentConfig {
    pub fn model_request(&self) -> ModelRequest {
        ModelRequest {
            provider: self.primary_provider.clone(),
            fallback_providers: self.fallback_providers.clone(),
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    /// Merge a partial update. Only fields present in the patch change.
    pub fn apply(&mut self, patch: AgentConfigPatch) {
        if let Some(primary) = patch.primary_provider {
            self.primary_provider = primary;
        }
        if let Some(fallbacks) = patch.fallback_providers {
            self.fallback_providers = fallbacks;
        }
        if let Some(model) = patch.model {
            self.model = Some(model);
        }
        if let Some(temperature) = patch.temperature {
            self.temperature = temperature;
        }
        if let Some(max_tokens) = patch.max_tokens {
            self.max_tokens = max_tokens;
        }
        if let Some(template) = patch.prompt_template {
            self.prompt_template = Some(template);
        }
        if let Some(tags) = patch.tool_tags {
            self.tool_tags = tags;
        }
    }
}

/// Partial [`AgentConfig`] accepted by `update_agent_config`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfigPatch {
    pub primary_provider: Option<String>,
    pub fallback_providers: Option<Vec<String>>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub prompt_template: Option<String>,
    pub tool_tags: Option<Vec<String>>,
}

/// A specialized worker that executes tasks through the language-model interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub role: AgentRole,
    pub description: String,
    pub capabilities: BTreeSet<String>,
    pub is_active: bool,
    pub status: AgentStatus,
    pub current_task: Option<TaskId>,
    pub performance: AgentPerformance,
    pub config: AgentConfig,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(id: impl Into<AgentId>, name: impl Into<String>, role: AgentRole) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            role,
            description: String::new(),
            capabilities: BTreeSet::new(),
            is_active: true,
            status: AgentStatus::Idle,
            current_task: None,
            performance: AgentPerformance::default(),
            config: AgentConfig::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_performance(mut self, performance: AgentPerformance) -> Self {
        self.performance = performance;
        self
    }

    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }

    /// Eligible for new work: active and idle.
    pub fn is_available(&self) -> bool {
        self.is_active && self.status == AgentStatus::Idle
    }
}

/// Closed taxonomy of work the scheduler understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Code,
    Design,
    Debug,
    Test,
    Deploy,
    Analyze,
}

impl TaskType {
    pub const ALL: [TaskType; 6] = [
        TaskType::Code,
        TaskType::Design,
        TaskType::Debug,
        TaskType::Test,
        TaskType::Deploy,
        TaskType::Analyze,
    ];
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskType::Code => "code",
            TaskType::Design => "design",
            TaskType::Debug => "debug",
            TaskType::Test => "test",
            TaskType::Deploy => "deploy",
            TaskType::Analyze => "analyze",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for TaskType {
    type Err = MaestroError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskType::ALL
            .into_iter()
            .find(|t| t.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| MaestroError::Config(format!("Unknown task type '{s}'")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl TaskPriority {
    /// Numeric rank carried on assignments (low = 1 … urgent = 4).
    pub fn rank(&self) -> u8 {
        match self {
            TaskPriority::Low => 1,
            TaskPriority::Medium => 2,
            TaskPriority::High => 3,
            TaskPriority::Urgent => 4,
        }
    }
}

impl Default for TaskPriority {
    fn default() -> Self {
        TaskPriority::Medium
    }
}

impl std::str::FromStr for TaskPriority {
    type Err = MaestroError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(TaskPriority::Low),
            "medium" => Ok(TaskPriority::Medium),
            "high" => Ok(TaskPriority::High),
            "urgent" => Ok(TaskPriority::Urgent),
            other => Err(MaestroError::Config(format!("Unknown priority '{other}'"))),
        }
    }
}

/// Status of a task in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// `pending → in_progress → {completed, failed}`; `cancelled` from either
    /// non-terminal state.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::InProgress)
                | (TaskStatus::InProgress, TaskStatus::Completed)
                | (TaskStatus::InProgress, TaskStatus::Failed)
                | (TaskStatus::Pending, TaskStatus::Cancelled)
                | (TaskStatus::InProgress, TaskStatus::Cancelled)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Kind of artifact produced by an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Code,
    Document,
    Plan,
    Review,
}

/// An artifact produced by an agent during task execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub content: String,
    pub file_path: Option<String>,
    /// Fence language tag for code artifacts.
    #[serde(default)]
    pub language: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    pub fn new(kind: ArtifactKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            file_path: None,
            language: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// Pull every fenced code block out of model output.
    ///
    /// A first line of the form `// path: src/lib.rs` inside the block is
    /// taken as the artifact's file path.
    pub fn extract_code_blocks(text: &str) -> Vec<Artifact> {
        let mut artifacts = Vec::new();
        let mut current: Option<(Option<String>, Vec<&str>)> = None;

        for line in text.lines() {
            let trimmed = line.trim_start();
            if let Some(tag) = trimmed.strip_prefix("```") {
                match current.take() {
                    Some((language, body)) => {
                        artifacts.push(Self::code_block(language, &body));
                    }
                    None => {
                        let tag = tag.trim();
                        let language = (!tag.is_empty()).then(|| tag.to_string());
                        current = Some((language, Vec::new()));
                    }
                }
            } else if let Some((_, body)) = current.as_mut() {
                body.push(line);
            }
        }
        artifacts
    }

    fn code_block(language: Option<String>, body: &[&str]) -> Artifact {
        let path = body
            .first()
            .and_then(|l| l.trim().strip_prefix("// path:"))
            .map(|p| p.trim().to_string());
        let mut artifact = Artifact::new(ArtifactKind::Code, body.join("\n"));
        artifact.language = language;
        artifact.file_path = path;
        artifact
    }
}

/// Outcome recorded on a task once execution ends.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskResult {
    pub output: String,
    pub artifacts: Vec<Artifact>,
    pub success: bool,
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub tokens_used: u64,
}

impl TaskResult {
    pub fn success(output: impl Into<String>) -> Self {
        let output = output.into();
        Self {
            artifacts: Artifact::extract_code_blocks(&output),
            output,
            success: true,
            ..Self::default()
        }
    }

    pub fn failure(error: &MaestroError) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            ..Self::default()
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn with_tokens(mut self, tokens: u64) -> Self {
        self.tokens_used = tokens;
        self
    }
}

/// A unit of requested work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    pub task_type: TaskType,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    /// Informational only; not enforced as a blocking constraint.
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    pub project_id: Option<String>,
    pub estimated_time_ms: Option<u64>,
    pub actual_time_ms: Option<u64>,
    pub result: Option<TaskResult>,
    pub assigned_agent: Option<AgentId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(title: impl Into<String>, task_type: TaskType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: String::new(),
            task_type,
            priority: TaskPriority::default(),
            status: TaskStatus::Pending,
            dependencies: Vec::new(),
            project_id: None,
            estimated_time_ms: None,
            actual_time_ms: None,
            result: None,
            assigned_agent: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_dependencies(mut self, deps: Vec<TaskId>) -> Self {
        self.dependencies = deps;
        self
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    /// Move to `next`, rejecting transitions the lifecycle does not allow.
    pub fn transition(&mut self, next: TaskStatus) -> MaestroResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(MaestroError::invalid_transition(
                format!("task {}", self.id),
                self.status,
                next,
            ));
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Ephemeral pairing of a task with the agent that will run it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAssignment {
    pub task_id: TaskId,
    pub agent_id: AgentId,
    pub priority_rank: u8,
    pub dependencies: Vec<TaskId>,
    pub estimated_duration_ms: u64,
    pub assigned_at: DateTime<Utc>,
}

/// Caller-supplied routing hints for `submit_task`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitOptions {
    #[serde(default)]
    pub require_collaboration: bool,
    #[serde(default)]
    pub preferred_agents: Vec<AgentId>,
    #[serde(default)]
    pub force_agent: Option<AgentId>,
    /// Overrides the automatically chosen collaboration pattern.
    #[serde(default)]
    pub collaboration_type: Option<CollaborationType>,
}

impl SubmitOptions {
    pub fn collaborative() -> Self {
        Self {
            require_collaboration: true,
            ..Self::default()
        }
    }

    pub fn forced(agent_id: impl Into<AgentId>) -> Self {
        Self {
            force_agent: Some(agent_id.into()),
            ..Self::default()
        }
    }
}

/// What `submit_task` did with an accepted task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubmitOutcome {
    Assigned(TaskAssignment),
    Collaboration {
        collaboration_id: Uuid,
        collaboration_type: CollaborationType,
        participants: Vec<AgentId>,
    },
}

impl SubmitOutcome {
    pub fn assignment(&self) -> Option<&TaskAssignment> {
        match self {
            SubmitOutcome::Assigned(a) => Some(a),
            SubmitOutcome::Collaboration { .. } => None,
        }
    }

    pub fn collaboration_id(&self) -> Option<Uuid> {
        match self {
            SubmitOutcome::Assigned(_) => None,
            SubmitOutcome::Collaboration {
                collaboration_id, ..
            } => Some(*collaboration_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationStats {
    pub total_agents: usize,
    pub active_agents: usize,
    /// Queued work that will still run; cancelled or expired items are not counted.
    pub tasks_in_queue: usize,
    pub active_assignments: usize,
    pub total_tasks_completed: u64,
    pub average_success_rate: f64,
}

/// Snapshot returned by `get_agent_status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatusReport {
    pub agent: Agent,
    pub current_task: Option<Task>,
    pub collaboration_ids: Vec<Uuid>,
    pub recent_messages: Vec<AgentMessage>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_task_creation() {
        let task = Task::new("Implement auth module", TaskType::Code);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.priority, TaskPriority::Medium);
        assert!(task.dependencies.is_empty());
        assert!(task.result.is_none());
    }

    #[test]
    fn test_task_lifecycle_transitions() {
        let mut task = Task::new("Ship it", TaskType::Deploy);
        task.transition(TaskStatus::InProgress).unwrap();
        task.transition(TaskStatus::Completed).unwrap();
        assert!(task.status.is_terminal());

        let err = task.transition(TaskStatus::Pending).unwrap_err();
        assert!(matches!(err, MaestroError::InvalidTransition { .. }));
    }

    #[test]
    fn test_pending_cannot_complete_directly() {
        let mut task = Task::new("Skip ahead", TaskType::Test);
        assert!(task.transition(TaskStatus::Completed).is_err());
        assert!(task.transition(TaskStatus::Cancelled).is_ok());
    }

    #[test]
    fn test_priority_rank() {
        assert_eq!(TaskPriority::Low.rank(), 1);
        assert_eq!(TaskPriority::Urgent.rank(), 4);
        assert!(TaskPriority::High > TaskPriority::Medium);
    }

    #[test]
    fn test_task_type_parse() {
        assert_eq!("Deploy".parse::<TaskType>().unwrap(), TaskType::Deploy);
        assert!("paint".parse::<TaskType>().is_err());
        assert_eq!(TaskType::Analyze.to_string(), "analyze");
    }

    #[test]
    fn test_config_patch_merges() {
        let mut config = AgentConfig {
            fallback_providers: vec!["groq".into()],
            tool_tags: vec!["git".into()],
            ..AgentConfig::default()
        };
        config.apply(AgentConfigPatch {
            temperature: Some(0.1),
            ..AgentConfigPatch::default()
        });
        assert_eq!(config.temperature, 0.1);
        assert_eq!(config.fallback_providers, vec!["groq".to_string()]);
        assert_eq!(config.tool_tags, vec!["git".to_string()]);
        assert_eq!(config.max_tokens, 4096);
    }

    #[test]
    fn test_extract_code_blocks() {
        let text = "Here you go:\n```rust\n// path: src/lib.rs\npub fn a() {}\n```\nand\n```\nplain\n```";
        let artifacts = Artifact::extract_code_blocks(text);
        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[0].language.as_deref(), Some("rust"));
        assert_eq!(artifacts[0].file_path.as_deref(), Some("src/lib.rs"));
        assert!(artifacts[0].content.contains("pub fn a()"));
        assert!(artifacts[1].language.is_none());
    }

    #[test]
    fn test_unterminated_block_is_ignored() {
        assert!(Artifact::extract_code_blocks("```rust\nfn half(").is_empty());
    }

    #[test]
    fn test_agent_availability() {
        let agent = Agent::new("a", "A", AgentRole::Coder);
        assert!(agent.is_available());
        assert!(!agent.clone().inactive().is_available());
        let mut busy = agent;
        busy.status = AgentStatus::Working;
        assert!(!busy.is_available());
    }

    #[test]
    fn test_composite_weights() {
        let perf = AgentPerformance {
            success_rate: 1.0,
            quality_score: 0.0,
            user_rating: 0.5,
            ..AgentPerformance::default()
        };
        assert!((perf.composite() - 0.6).abs() < 1e-9);
    }
}
