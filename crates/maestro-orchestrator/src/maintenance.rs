use crate::collaboration::Collaboration;
use crate::message_bus::ORCHESTRATOR_SENDER;
use crate::state::OrchestratorState;
use crate::types::{Task, TaskId, TaskType};
use chrono::{DateTime, Utc};
use maestro_core::MaestroError;
use tracing::{info, warn};
use uuid::Uuid;

/// What one maintenance sweep changed.
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    pub expired_collaborations: Vec<Uuid>,
    pub expired_negotiations: Vec<Uuid>,
    /// Tasks the sweep moved to `failed`, as they are after the sweep.
    pub failed_tasks: Vec<Task>,
    pub agents_learned: usize,
}

impl MaintenanceReport {
    pub fn is_quiet(&self) -> bool {
        self.expired_collaborations.is_empty()
            && self.expired_negotiations.is_empty()
            && self.failed_tasks.is_empty()
    }
}

impl OrchestratorState {
    /// Expire stale collaborations and negotiations, then re-learn
    /// specializations. `now` is injected so tests can move the clock.
    pub fn run_maintenance(&mut self, now: DateTime<Utc>) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();

        let collaboration_timeout = self.config.collaboration_timeout();
        for collaboration_id in self.collaborations.overdue(now, collaboration_timeout) {
            let error = MaestroError::CollaborationTimeout(collaboration_id);
            match self.expire_collaboration(collaboration_id, &error) {
                Ok(task) => {
                    report.expired_collaborations.push(collaboration_id);
                    report.failed_tasks.extend(task);
                }
                Err(e) => warn!(collaboration_id = %collaboration_id, error = %e, "Could not expire collaboration"),
            }
        }

        let negotiation_timeout = self.config.negotiation_timeout();
        for (negotiation_id, task_id) in self.negotiations.expire(now, negotiation_timeout) {
            report.expired_negotiations.push(negotiation_id);
            let error = MaestroError::NegotiationTimeout(negotiation_id);
            let collaboration = self.collaborations.active_for_task(task_id).map(|c| c.id);
            let outcome = match collaboration {
                Some(collaboration_id) => self.expire_collaboration(collaboration_id, &error),
                None => self.fail_orphan_task(task_id, &error),
            };
            match outcome {
                Ok(task) => report.failed_tasks.extend(task),
                Err(e) => warn!(negotiation_id = %negotiation_id, error = %e, "Could not fail negotiated task"),
            }
        }

        report.agents_learned = self.learn_specializations(now);

        if !report.is_quiet() {
            info!(
                collaborations = report.expired_collaborations.len(),
                negotiations = report.expired_negotiations.len(),
                tasks = report.failed_tasks.len(),
                "Maintenance sweep expired stale work"
            );
        }
        report
    }

    fn expire_collaboration(
        &mut self,
        collaboration_id: Uuid,
        error: &MaestroError,
    ) -> maestro_core::MaestroResult<Option<Task>> {
        let task_id = self.collaborations.fail(collaboration_id)?.task_id;
        for agent_id in self.registry.holding(task_id) {
            self.registry.release(&agent_id, task_id);
        }
        if let Some(negotiation_id) = self.negotiations.live_for_task(task_id).map(|n| n.id) {
            self.negotiations.fail(negotiation_id);
        }
        self.queue.take_assignment(task_id);
        warn!(collaboration_id = %collaboration_id, task_id = %task_id, error = %error, "Collaboration expired");
        self.fail_task(task_id, error, ORCHESTRATOR_SENDER)
    }

    fn fail_orphan_task(
        &mut self,
        task_id: TaskId,
        error: &MaestroError,
    ) -> maestro_core::MaestroResult<Option<Task>> {
        if let Some(assignment) = self.queue.take_assignment(task_id) {
            self.registry.release(&assignment.agent_id, task_id);
        }
        self.fail_task(task_id, error, ORCHESTRATOR_SENDER)
    }

    fn learn_specializations(&mut self, now: DateTime<Utc>) -> usize {
        let history: Vec<(&Collaboration, TaskType)> = self
            .collaborations
            .all()
            .filter_map(|c| self.queue.get(c.task_id).ok().map(|t| (c, t.task_type)))
            .collect();
        let agents = self.registry.list();
        self.specializations.learn(
            agents,
            &history,
            self.config.collaboration_history_limit,
            now,
        );
        agents.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::collaboration::CollaborationStatus;
    use crate::config::OrchestratorConfig;
    use crate::negotiation::NegotiationStatus;
    use crate::profiles::default_agents;
    use crate::types::{AgentStatus, SubmitOptions, TaskStatus};

    fn state() -> OrchestratorState {
        OrchestratorState::with_agents(OrchestratorConfig::immediate(), default_agents("default"))
    }

    #[test]
    fn test_stuck_collaboration_fails_task() {
        let mut state = state();
        let task = Task::new("Landing page", TaskType::Design);
        let outcome = state.submit(task.clone(), &SubmitOptions::collaborative()).unwrap();
        let collaboration_id = outcome.collaboration_id().unwrap();
        state.begin_collaboration(collaboration_id).unwrap().unwrap();

        let quiet = state.run_maintenance(Utc::now());
        assert!(quiet.is_quiet());

        let later = Utc::now() + chrono::Duration::seconds(301);
        let report = state.run_maintenance(later);
        assert_eq!(report.expired_collaborations, vec![collaboration_id]);
        assert_eq!(report.failed_tasks.len(), 1);

        let collab = state.collaborations.get(collaboration_id).unwrap();
        assert_eq!(collab.status, CollaborationStatus::Failed);
        let stored = state.queue.get(task.id).unwrap();
        assert_eq!(stored.status, TaskStatus::Failed);
        assert!(stored.result.as_ref().unwrap().error.as_ref().unwrap().contains("timed out"));
        for agent_id in &collab.participants {
            assert_eq!(state.registry.get(agent_id).unwrap().status, AgentStatus::Idle);
        }
    }

    #[test]
    fn test_initiated_collaboration_is_not_expired() {
        let mut state = state();
        let task = Task::new("Queued", TaskType::Design);
        state.submit(task, &SubmitOptions::collaborative()).unwrap();
        let later = Utc::now() + chrono::Duration::seconds(3600);
        assert!(state.run_maintenance(later).expired_collaborations.is_empty());
    }

    #[test]
    fn test_stale_negotiation_fails_task() {
        let mut state = state();
        let task = Task::new("Pick an approach", TaskType::Code);
        state.submit(task.clone(), &SubmitOptions::default()).unwrap();
        let negotiation_id = state
            .negotiations
            .open(task.id, "approach", vec!["code-master".into()])
            .unwrap();

        let later = Utc::now() + chrono::Duration::seconds(121);
        let report = state.run_maintenance(later);
        assert_eq!(report.expired_negotiations, vec![negotiation_id]);
        assert_eq!(
            state.negotiations.get(negotiation_id).unwrap().status,
            NegotiationStatus::Failed
        );
        let stored = state.queue.get(task.id).unwrap();
        assert_eq!(stored.status, TaskStatus::Failed);
        assert!(state.registry.get("code-master").unwrap().is_available());
    }

    #[test]
    fn test_learning_pass_runs_for_every_agent() {
        let mut state = state();
        let report = state.run_maintenance(Utc::now());
        assert_eq!(report.agents_learned, 5);
        assert_eq!(state.specializations.get("code-master").agent_id, "code-master");
    }
}
