use crate::executor::AgentOutput;
use crate::message_bus::ORCHESTRATOR_SENDER;
use crate::performance::{record_failure, record_success};
use crate::scoring::{estimate_duration_ms, select_best};
use crate::state::OrchestratorState;
use crate::task_queue::QueuedWork;
use crate::types::{
    Agent, AgentStatus, SubmitOptions, SubmitOutcome, Task, TaskAssignment, TaskId, TaskResult,
    TaskStatus,
};
use chrono::Utc;
use maestro_core::{MaestroError, MaestroResult};
use tracing::{debug, info, warn};

/// Snapshot for one direct (single-agent) execution.
#[derive(Debug, Clone)]
pub struct DirectJob {
    pub task: Task,
    pub agent: Agent,
}

/// What the queue should do with a direct work item.
#[derive(Debug, Clone)]
pub enum DirectStep {
    Run(DirectJob),
    /// The task is no longer in progress (for example cancelled).
    Skipped,
    /// The assigned agent became unavailable; the task was failed.
    Failed(Task),
}

impl OrchestratorState {
    /// Accept a task and route it to an agent or a collaboration.
    ///
    /// Re-submitting a task that is still `pending` retries routing, and so
    /// does re-submitting an `in_progress` task whose agent was deactivated.
    /// Tasks in any other state are rejected.
    pub fn submit(&mut self, task: Task, options: &SubmitOptions) -> MaestroResult<SubmitOutcome> {
        if let Some(forced) = &options.force_agent {
            self.registry.get(forced)?;
        }
        let task_id = task.id;
        match self.queue.get(task_id) {
            Ok(_) if self.is_orphaned(task_id) => {
                let stored = self.queue.get_mut(task_id)?;
                stored.status = TaskStatus::Pending;
                stored.updated_at = Utc::now();
                info!(task_id = %task_id, "Resubmitting task left without an agent");
            }
            Ok(existing) if existing.status != TaskStatus::Pending => {
                return Err(MaestroError::invalid_transition(
                    format!("task {task_id}"),
                    existing.status,
                    TaskStatus::InProgress,
                ));
            }
            Ok(_) => debug!(task_id = %task_id, "Retrying pending task"),
            Err(_) => {
                let mut task = task;
                task.status = TaskStatus::Pending;
                task.assigned_agent = None;
                task.result = None;
                info!(task_id = %task_id, title = %task.title, kind = %task.task_type, "Task submitted");
                self.queue.insert(task);
            }
        }
        self.route(task_id, options)
    }

    /// An `in_progress` task nobody holds: no agent, no assignment and no
    /// running collaboration.
    fn is_orphaned(&self, task_id: TaskId) -> bool {
        self.queue.get(task_id).is_ok_and(|t| {
            t.status == TaskStatus::InProgress && t.assigned_agent.is_none()
        }) && self.queue.assignment(task_id).is_none()
            && self.collaborations.active_for_task(task_id).is_none()
    }

    /// Route an already stored task again, see [`Self::submit`].
    pub fn retry(&mut self, task_id: TaskId, options: &SubmitOptions) -> MaestroResult<SubmitOutcome> {
        let task = self.queue.get(task_id)?.clone();
        self.submit(task, options)
    }

    fn route(&mut self, task_id: TaskId, options: &SubmitOptions) -> MaestroResult<SubmitOutcome> {
        if let Some(agent_id) = &options.force_agent {
            return self
                .assign_direct(task_id, agent_id)
                .map(SubmitOutcome::Assigned);
        }
        if options.require_collaboration {
            return self.initiate_collaboration(task_id, options.collaboration_type);
        }

        let task = self.queue.get(task_id)?;
        let best = select_best(
            self.registry.available(),
            task,
            &self.specializations,
            &options.preferred_agents,
        )
        .map(|a| a.id.clone());

        match best {
            Some(agent_id) => self
                .assign_direct(task_id, &agent_id)
                .map(SubmitOutcome::Assigned),
            None => {
                warn!(task_id = %task_id, "No available agent, task stays pending");
                Err(MaestroError::NoAvailableAgent(format!(
                    "no active idle agent for {} task {task_id}",
                    task.task_type
                )))
            }
        }
    }

    fn assign_direct(&mut self, task_id: TaskId, agent_id: &str) -> MaestroResult<TaskAssignment> {
        let agent = self.registry.get(agent_id)?;
        let available = agent.is_available();
        let task = self.queue.get(task_id)?;
        let estimate = estimate_duration_ms(agent, task);
        let assignment = TaskAssignment {
            task_id,
            agent_id: agent_id.to_string(),
            priority_rank: task.priority.rank(),
            dependencies: task.dependencies.clone(),
            estimated_duration_ms: estimate,
            assigned_at: Utc::now(),
        };

        let stored = self.queue.transition(task_id, TaskStatus::InProgress)?;
        stored.assigned_agent = Some(agent_id.to_string());
        stored.estimated_time_ms = Some(estimate);

        if available {
            self.registry.mark_working(agent_id, task_id)?;
        } else {
            warn!(agent = %agent_id, task_id = %task_id, "Forced agent is busy or inactive, re-checked at execution");
        }
        self.queue.assign(assignment.clone());
        self.queue.enqueue(QueuedWork::Direct(task_id));
        info!(
            task_id = %task_id,
            agent = %agent_id,
            priority = assignment.priority_rank,
            estimated_ms = estimate,
            "Task assigned"
        );
        Ok(assignment)
    }

    /// Cancel a pending or in-progress task, releasing whoever holds it.
    pub fn cancel(&mut self, task_id: TaskId) -> MaestroResult<Task> {
        let snapshot = self.queue.transition(task_id, TaskStatus::Cancelled)?.clone();
        if let Some(assignment) = self.queue.take_assignment(task_id) {
            self.registry.release(&assignment.agent_id, task_id);
        }
        if let Some(collaboration_id) = self.collaborations.active_for_task(task_id).map(|c| c.id) {
            self.collaborations.fail(collaboration_id)?;
            for agent_id in self.registry.holding(task_id) {
                self.registry.release(&agent_id, task_id);
            }
        }
        if let Some(negotiation_id) = self.negotiations.live_for_task(task_id).map(|n| n.id) {
            self.negotiations.fail(negotiation_id);
        }
        info!(task_id = %task_id, "Task cancelled");
        Ok(snapshot)
    }

    /// Activate or deactivate an agent. A deactivated agent's direct task
    /// stays `in_progress` with no assigned agent and leaves the work queue
    /// until the caller resubmits it.
    pub fn toggle_agent(&mut self, agent_id: &str, active: bool) -> MaestroResult<Agent> {
        let previous = self.registry.get(agent_id)?.current_task;
        let agent = self.registry.set_active(agent_id, active)?.clone();
        if let (false, Some(task_id)) = (active, previous) {
            self.unassign(task_id, agent_id);
        }
        Ok(agent)
    }

    fn unassign(&mut self, task_id: TaskId, agent_id: &str) {
        let Ok(task) = self.queue.get_mut(task_id) else {
            return;
        };
        if task.assigned_agent.as_deref() != Some(agent_id) {
            return;
        }
        task.assigned_agent = None;
        task.updated_at = Utc::now();
        let direct = self.collaborations.active_for_task(task_id).is_none();
        if direct
            && self
                .queue
                .assignment(task_id)
                .is_some_and(|a| a.agent_id == agent_id)
        {
            self.queue.take_assignment(task_id);
            self.queue.remove_work(QueuedWork::Direct(task_id));
        }
        info!(task_id = %task_id, agent = %agent_id, "Task unassigned from deactivated agent");
    }

    /// Re-check the assigned agent before a direct execution starts.
    pub fn prepare_direct(&mut self, task_id: TaskId) -> MaestroResult<DirectStep> {
        let task = self.queue.get(task_id)?;
        if task.status != TaskStatus::InProgress {
            debug!(task_id = %task_id, status = %task.status, "Skipping queued task");
            return Ok(DirectStep::Skipped);
        }
        let Some(agent_id) = self.queue.assignment(task_id).map(|a| a.agent_id.clone()) else {
            return Ok(DirectStep::Skipped);
        };

        let agent = self.registry.get(&agent_id)?;
        let holds_task = agent.current_task == Some(task_id);
        let ready = agent.is_active
            && (holds_task || (agent.status == AgentStatus::Idle && agent.current_task.is_none()));
        if !ready {
            let error = MaestroError::NoAvailableAgent(format!(
                "agent {agent_id} is unavailable for task {task_id}"
            ));
            self.queue.take_assignment(task_id);
            return Ok(match self.fail_task(task_id, &error, ORCHESTRATOR_SENDER)? {
                Some(task) => DirectStep::Failed(task),
                None => DirectStep::Skipped,
            });
        }
        if !holds_task {
            self.registry.mark_working(&agent_id, task_id)?;
        }

        Ok(DirectStep::Run(DirectJob {
            task: self.queue.get(task_id)?.clone(),
            agent: self.registry.get(&agent_id)?.clone(),
        }))
    }

    /// Record the outcome of a direct execution. Returns the updated task, or
    /// `None` when the task left `in_progress` while the call was in flight.
    pub fn finish_direct(
        &mut self,
        task_id: TaskId,
        agent_id: &str,
        result: MaestroResult<AgentOutput>,
    ) -> MaestroResult<Option<Task>> {
        self.queue.take_assignment(task_id);
        if self.queue.get(task_id)?.status != TaskStatus::InProgress {
            info!(task_id = %task_id, "Discarding result for task no longer in progress");
            self.registry.release(agent_id, task_id);
            return Ok(None);
        }

        match result {
            Ok(output) => {
                if let Ok(agent) = self.registry.get_mut(agent_id) {
                    record_success(&mut agent.performance, &output.sample());
                }
                self.registry.release(agent_id, task_id);
                let task = self.queue.transition(task_id, TaskStatus::Completed)?;
                task.result = Some(
                    TaskResult::success(output.content)
                        .with_tokens(output.tokens_used)
                        .with_metadata("model_used", output.model_used),
                );
                task.actual_time_ms = Some(output.duration_ms);
                info!(task_id = %task_id, agent = %agent_id, duration_ms = output.duration_ms, "Task completed");
                Ok(Some(task.clone()))
            }
            Err(error) => {
                if let Ok(agent) = self.registry.get_mut(agent_id) {
                    record_failure(&mut agent.performance);
                }
                self.registry.mark_error(agent_id, task_id);
                warn!(task_id = %task_id, agent = %agent_id, error = %error, "Task failed");
                self.fail_task(task_id, &error, agent_id)
            }
        }
    }
}
