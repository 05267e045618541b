use crate::message_bus::{AgentMessage, MessageType, ORCHESTRATOR_SENDER};
use crate::performance::record_success;
use crate::scoring::{estimate_duration_ms, rank_for_collaboration};
use crate::state::OrchestratorState;
use crate::strategies::{StrategyFailure, StrategyOutput};
use crate::task_queue::QueuedWork;
use crate::types::{
    Agent, AgentId, SubmitOutcome, Task, TaskAssignment, TaskId, TaskResult, TaskStatus, TaskType,
};
use chrono::{DateTime, Utc};
use maestro_core::{MaestroError, MaestroResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};
use uuid::Uuid;

/// Coordination pattern for a multi-agent task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollaborationType {
    Sequential,
    Parallel,
    Hierarchical,
    Consensus,
}

impl std::fmt::Display for CollaborationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CollaborationType::Sequential => "sequential",
            CollaborationType::Parallel => "parallel",
            CollaborationType::Hierarchical => "hierarchical",
            CollaborationType::Consensus => "consensus",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for CollaborationType {
    type Err = MaestroError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(CollaborationType::Sequential),
            "parallel" => Ok(CollaborationType::Parallel),
            "hierarchical" => Ok(CollaborationType::Hierarchical),
            "consensus" => Ok(CollaborationType::Consensus),
            other => Err(MaestroError::Config(format!(
                "Unknown collaboration type '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollaborationStatus {
    Initiated,
    InProgress,
    Completed,
    Failed,
}

impl CollaborationStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, CollaborationStatus::Initiated | CollaborationStatus::InProgress)
    }
}

impl std::fmt::Display for CollaborationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CollaborationStatus::Initiated => "initiated",
            CollaborationStatus::InProgress => "in_progress",
            CollaborationStatus::Completed => "completed",
            CollaborationStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Multi-agent execution wrapper around one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collaboration {
    pub id: Uuid,
    pub task_id: TaskId,
    /// First participant is the primary.
    pub participants: Vec<AgentId>,
    pub collaboration_type: CollaborationType,
    pub status: CollaborationStatus,
    pub messages: Vec<AgentMessage>,
    /// Agent id → that agent's latest contribution.
    pub outcomes: BTreeMap<AgentId, String>,
    pub started_at: DateTime<Utc>,
    /// When the strategy began running; the timeout is measured from here.
    pub execution_started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Collaboration {
    pub fn new(task_id: TaskId, participants: Vec<AgentId>, kind: CollaborationType) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            participants,
            collaboration_type: kind,
            status: CollaborationStatus::Initiated,
            messages: Vec::new(),
            outcomes: BTreeMap::new(),
            started_at: Utc::now(),
            execution_started_at: None,
            ended_at: None,
        }
    }

    pub fn primary(&self) -> Option<&AgentId> {
        self.participants.first()
    }

    fn move_to(&mut self, next: CollaborationStatus) -> MaestroResult<()> {
        let allowed = matches!(
            (self.status, next),
            (CollaborationStatus::Initiated, CollaborationStatus::InProgress)
                | (CollaborationStatus::InProgress, CollaborationStatus::Completed)
                | (CollaborationStatus::Initiated, CollaborationStatus::Failed)
                | (CollaborationStatus::InProgress, CollaborationStatus::Failed)
        );
        if !allowed {
            return Err(MaestroError::invalid_transition(
                format!("collaboration {}", self.id),
                self.status,
                next,
            ));
        }
        let now = Utc::now();
        match next {
            CollaborationStatus::InProgress => self.execution_started_at = Some(now),
            CollaborationStatus::Completed | CollaborationStatus::Failed => {
                self.ended_at = Some(now);
            }
            CollaborationStatus::Initiated => {}
        }
        self.status = next;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

impl Complexity {
    /// Participants requested for this complexity.
    pub fn participant_count(&self) -> usize {
        match self {
            Complexity::Low => 1,
            Complexity::Medium => 2,
            Complexity::High => 3,
        }
    }
}

pub fn complexity_score(task: &Task) -> u32 {
    let type_weight = match task.task_type {
        TaskType::Code | TaskType::Design | TaskType::Deploy => 2,
        TaskType::Debug | TaskType::Test | TaskType::Analyze => 1,
    };
    let priority = u32::from(task.priority.rank()) - 1;
    let length = task.description.chars().count();
    let length_bonus = if length > 500 {
        2
    } else if length > 200 {
        1
    } else {
        0
    };
    let deps = u32::try_from(task.dependencies.len().min(3)).unwrap_or(3);
    type_weight + priority + length_bonus + deps
}

pub fn complexity(task: &Task) -> Complexity {
    match complexity_score(task) {
        s if s >= 6 => Complexity::High,
        s if s >= 3 => Complexity::Medium,
        _ => Complexity::Low,
    }
}

/// Pick the coordination pattern from the task's complexity and type.
pub fn determine_collaboration_type(task: &Task) -> CollaborationType {
    if complexity(task) == Complexity::High {
        return CollaborationType::Consensus;
    }
    match task.task_type {
        TaskType::Code | TaskType::Design => CollaborationType::Parallel,
        TaskType::Deploy => CollaborationType::Sequential,
        TaskType::Debug | TaskType::Test | TaskType::Analyze => CollaborationType::Hierarchical,
    }
}

/// All collaborations, with at most one active per task.
#[derive(Debug, Clone, Default)]
pub struct CollaborationBook {
    collaborations: HashMap<Uuid, Collaboration>,
    order: Vec<Uuid>,
}

impl CollaborationBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(
        &mut self,
        task_id: TaskId,
        participants: Vec<AgentId>,
        kind: CollaborationType,
    ) -> MaestroResult<&Collaboration> {
        if self.active_for_task(task_id).is_some() {
            return Err(MaestroError::CollaborationInProgress(task_id));
        }
        let collaboration = Collaboration::new(task_id, participants, kind);
        let id = collaboration.id;
        self.order.push(id);
        Ok(self.collaborations.entry(id).or_insert(collaboration))
    }

    pub fn get(&self, id: Uuid) -> MaestroResult<&Collaboration> {
        self.collaborations
            .get(&id)
            .ok_or(MaestroError::CollaborationNotFound(id))
    }

    pub fn get_mut(&mut self, id: Uuid) -> MaestroResult<&mut Collaboration> {
        self.collaborations
            .get_mut(&id)
            .ok_or(MaestroError::CollaborationNotFound(id))
    }

    pub fn active_for_task(&self, task_id: TaskId) -> Option<&Collaboration> {
        self.collaborations
            .values()
            .find(|c| c.task_id == task_id && c.status.is_active())
    }

    /// Oldest first.
    pub fn all(&self) -> impl Iterator<Item = &Collaboration> {
        self.order.iter().filter_map(|id| self.collaborations.get(id))
    }

    pub fn involving(&self, agent_id: &str) -> Vec<Uuid> {
        self.all()
            .filter(|c| c.participants.iter().any(|p| p == agent_id))
            .map(|c| c.id)
            .collect()
    }

    pub fn involving_mut<'a>(
        &'a mut self,
        agent_id: &'a str,
    ) -> impl Iterator<Item = &'a mut Collaboration> + 'a {
        self.collaborations
            .values_mut()
            .filter(move |c| c.participants.iter().any(|p| p == agent_id))
    }

    pub fn start(&mut self, id: Uuid) -> MaestroResult<&Collaboration> {
        let collab = self.get_mut(id)?;
        collab.move_to(CollaborationStatus::InProgress)?;
        Ok(collab)
    }

    pub fn complete(&mut self, id: Uuid) -> MaestroResult<&mut Collaboration> {
        let collab = self.get_mut(id)?;
        collab.move_to(CollaborationStatus::Completed)?;
        Ok(collab)
    }

    pub fn fail(&mut self, id: Uuid) -> MaestroResult<&Collaboration> {
        let collab = self.get_mut(id)?;
        collab.move_to(CollaborationStatus::Failed)?;
        Ok(collab)
    }

    /// In-progress collaborations whose execution started before `now - timeout`.
    pub fn overdue(&self, now: DateTime<Utc>, timeout: chrono::Duration) -> Vec<Uuid> {
        self.all()
            .filter(|c| c.status == CollaborationStatus::InProgress)
            .filter(|c| now - c.execution_started_at.unwrap_or(c.started_at) > timeout)
            .map(|c| c.id)
            .collect()
    }
}

/// Snapshot handed to a strategy run outside the state lock.
#[derive(Debug, Clone)]
pub struct CollaborationJob {
    pub collaboration: Collaboration,
    pub task: Task,
    /// Participant agents, primary first.
    pub participants: Vec<Agent>,
}

impl OrchestratorState {
    /// Create a collaboration for a stored pending task and queue it.
    pub fn initiate_collaboration(
        &mut self,
        task_id: TaskId,
        forced_type: Option<CollaborationType>,
    ) -> MaestroResult<SubmitOutcome> {
        if self.collaborations.active_for_task(task_id).is_some() {
            return Err(MaestroError::CollaborationInProgress(task_id));
        }
        let task = self.queue.get(task_id)?.clone();
        let wanted = complexity(&task).participant_count();
        let chosen: Vec<Agent> =
            rank_for_collaboration(self.registry.available(), &task, &self.specializations, wanted)
                .into_iter()
                .cloned()
                .collect();
        let Some(primary) = chosen.first() else {
            return Err(MaestroError::NoAvailableAgent(format!(
                "no idle agent can collaborate on task {task_id}"
            )));
        };

        let kind = forced_type.unwrap_or_else(|| determine_collaboration_type(&task));
        let participants: Vec<AgentId> = chosen.iter().map(|a| a.id.clone()).collect();
        let collaboration_id = self
            .collaborations
            .create(task_id, participants.clone(), kind)?
            .id;

        let estimate = estimate_duration_ms(primary, &task);
        let stored = self.queue.transition(task_id, TaskStatus::InProgress)?;
        stored.assigned_agent = Some(primary.id.clone());
        stored.estimated_time_ms = Some(estimate);

        for id in &participants {
            self.registry.mark_working(id, task_id)?;
        }
        self.queue.assign(TaskAssignment {
            task_id,
            agent_id: primary.id.clone(),
            priority_rank: task.priority.rank(),
            dependencies: task.dependencies.clone(),
            estimated_duration_ms: estimate,
            assigned_at: Utc::now(),
        });

        self.bus.enqueue(
            AgentMessage::broadcast(
                ORCHESTRATOR_SENDER,
                MessageType::Coordination,
                format!("Starting {kind} collaboration on '{}'", task.title),
            )
            .with_priority(task.priority)
            .with_metadata("collaboration_id", collaboration_id.to_string())
            .about_task(task_id),
        );
        self.queue.enqueue(QueuedWork::Collaboration(collaboration_id));

        info!(
            collaboration_id = %collaboration_id,
            task_id = %task_id,
            kind = %kind,
            participants = participants.len(),
            "Collaboration initiated"
        );
        Ok(SubmitOutcome::Collaboration {
            collaboration_id,
            collaboration_type: kind,
            participants,
        })
    }

    /// Move an initiated collaboration to in-progress and snapshot what the
    /// strategy needs. `None` means the work is stale and should be skipped.
    pub fn begin_collaboration(&mut self, id: Uuid) -> MaestroResult<Option<CollaborationJob>> {
        let collab = self.collaborations.get(id)?;
        if collab.status != CollaborationStatus::Initiated {
            return Ok(None);
        }
        let task = self.queue.get(collab.task_id)?;
        if task.status != TaskStatus::InProgress {
            return Ok(None);
        }
        let task = task.clone();
        let participants: Vec<Agent> = collab
            .participants
            .iter()
            .filter_map(|p| self.registry.get(p).ok())
            .cloned()
            .collect();

        let collaboration = self.collaborations.start(id)?.clone();
        Ok(Some(CollaborationJob {
            collaboration,
            task,
            participants,
        }))
    }

    /// Record a strategy's result. Returns the task if it was updated;
    /// results for collaborations that already ended are discarded.
    pub fn finish_collaboration(
        &mut self,
        id: Uuid,
        outcome: Result<StrategyOutput, StrategyFailure>,
        duration_ms: u64,
    ) -> MaestroResult<Option<Task>> {
        let collab = self.collaborations.get(id)?;
        if collab.status != CollaborationStatus::InProgress {
            warn!(collaboration_id = %id, status = %collab.status, "Discarding late collaboration result");
            return Ok(None);
        }
        let task_id = collab.task_id;
        self.queue.take_assignment(task_id);

        match outcome {
            Ok(output) => {
                let collab = self.collaborations.complete(id)?;
                for contribution in &output.contributions {
                    collab
                        .outcomes
                        .insert(contribution.agent_id.clone(), contribution.content.clone());
                }
                for contribution in &output.contributions {
                    if let Ok(agent) = self.registry.get_mut(&contribution.agent_id) {
                        record_success(&mut agent.performance, &contribution.sample());
                    }
                }
                for agent_id in self.registry.holding(task_id) {
                    self.registry.release(&agent_id, task_id);
                }
                let task = self.queue.transition(task_id, TaskStatus::Completed)?;
                task.result = Some(output.result);
                task.actual_time_ms = Some(duration_ms);
                info!(collaboration_id = %id, task_id = %task_id, "Collaboration completed");
                Ok(Some(task.clone()))
            }
            Err(failure) => {
                self.collaborations.fail(id)?;
                // subtask workers borrowed from outside the participants hold the task too
                for agent_id in self.registry.holding(task_id) {
                    if failure.agent_id.as_deref() == Some(agent_id.as_str()) {
                        self.registry.mark_error(&agent_id, task_id);
                    } else {
                        self.registry.release(&agent_id, task_id);
                    }
                }
                let sender = failure
                    .agent_id
                    .clone()
                    .unwrap_or_else(|| ORCHESTRATOR_SENDER.to_string());
                let task = self.fail_task(task_id, &failure.error, &sender)?;
                warn!(collaboration_id = %id, task_id = %task_id, error = %failure.error, "Collaboration failed");
                Ok(task)
            }
        }
    }

    /// Fail a task that is in progress, recording `error`, and broadcast a
    /// status message from `sender`. Tasks already terminal are left alone.
    pub fn fail_task(
        &mut self,
        task_id: TaskId,
        error: &MaestroError,
        sender: &str,
    ) -> MaestroResult<Option<Task>> {
        let task = self.queue.get_mut(task_id)?;
        if task.status != TaskStatus::InProgress {
            return Ok(None);
        }
        task.transition(TaskStatus::Failed)?;
        task.result = Some(TaskResult::failure(error));
        let snapshot = task.clone();
        self.bus.enqueue(
            AgentMessage::broadcast(
                sender,
                MessageType::Status,
                format!("Task '{}' failed: {error}", snapshot.title),
            )
            .with_priority(snapshot.priority)
            .about_task(task_id),
        );
        Ok(Some(snapshot))
    }
}
