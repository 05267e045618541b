use crate::collaboration::{CollaborationBook, CollaborationStatus};
use crate::config::OrchestratorConfig;
use crate::message_bus::MessageBus;
use crate::negotiation::NegotiationResolver;
use crate::registry::AgentRegistry;
use crate::specialization::SpecializationStore;
use crate::task_queue::{QueuedWork, TaskQueue};
use crate::types::{Agent, OrchestrationStats, TaskId, TaskStatus};

/// All mutable orchestration state, owned by one orchestrator instance.
///
/// Behaviour lives in `impl OrchestratorState` blocks next to the module
/// that owns it (`scheduler`, `collaboration`, `message_bus`, `maintenance`).
#[derive(Debug, Clone)]
pub struct OrchestratorState {
    pub config: OrchestratorConfig,
    pub registry: AgentRegistry,
    pub specializations: SpecializationStore,
    pub queue: TaskQueue,
    pub collaborations: CollaborationBook,
    pub negotiations: NegotiationResolver,
    pub bus: MessageBus,
}

impl OrchestratorState {
    pub fn new(config: OrchestratorConfig) -> Self {
        let bus = MessageBus::new(config.inbox_capacity);
        Self {
            config,
            registry: AgentRegistry::new(),
            specializations: SpecializationStore::new(),
            queue: TaskQueue::new(),
            collaborations: CollaborationBook::new(),
            negotiations: NegotiationResolver::new(),
            bus,
        }
    }

    pub fn with_agents(config: OrchestratorConfig, agents: Vec<Agent>) -> Self {
        let mut state = Self::new(config);
        for agent in agents {
            state.registry.register(agent);
        }
        state
    }

    /// Queued items that will still run when the queue reaches them.
    fn live_work(&self) -> usize {
        let in_progress =
            |id: TaskId| self.queue.get(id).is_ok_and(|t| t.status == TaskStatus::InProgress);
        self.queue
            .queued()
            .filter(|work| match **work {
                QueuedWork::Direct(task_id) => {
                    in_progress(task_id) && self.queue.assignment(task_id).is_some()
                }
                QueuedWork::Collaboration(id) => self.collaborations.get(id).is_ok_and(|c| {
                    c.status == CollaborationStatus::Initiated && in_progress(c.task_id)
                }),
            })
            .count()
    }

    pub fn stats(&self) -> OrchestrationStats {
        let agents = self.registry.list();
        let average_success_rate = if agents.is_empty() {
            0.0
        } else {
            agents.iter().map(|a| a.performance.success_rate).sum::<f64>() / agents.len() as f64
        };
        OrchestrationStats {
            total_agents: agents.len(),
            active_agents: self.registry.active_count(),
            tasks_in_queue: self.live_work(),
            active_assignments: self.queue.assignment_count(),
            total_tasks_completed: agents.iter().map(|a| a.performance.tasks_completed).sum(),
            average_success_rate,
        }
    }
}
