use crate::collaboration::Collaboration;
use crate::config::OrchestratorConfig;
use crate::context::{ContextAssembler, KnowledgeGraph, SemanticSearch};
use crate::executor::AgentExecutor;
use crate::maintenance::MaintenanceReport;
use crate::message_bus::AgentMessage;
use crate::negotiation::Negotiation;
use crate::persistence::{InMemoryPersistence, Persistence};
use crate::profiles::default_agents;
use crate::scheduler::DirectStep;
use crate::state::OrchestratorState;
use crate::strategies::{run_strategy, StrategyContext};
use crate::task_queue::QueuedWork;
use crate::types::{
    Agent, AgentConfigPatch, AgentStatusReport, OrchestrationStats, SubmitOptions, SubmitOutcome,
    Task, TaskId,
};
use chrono::{DateTime, Utc};
use maestro_agent::LlmBackend;
use maestro_core::MaestroResult;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// The orchestrator facade.
///
/// Cloning is cheap and every clone drives the same state. Mutations take
/// the state write lock briefly; language-model calls run with no lock held.
#[derive(Clone)]
pub struct Orchestrator {
    state: Arc<RwLock<OrchestratorState>>,
    executor: AgentExecutor,
    context: ContextAssembler,
    draining: Arc<AtomicBool>,
}

impl Orchestrator {
    /// Create an orchestrator with the default roster, routed to the
    /// `"default"` provider, and in-memory persistence.
    pub fn new(config: OrchestratorConfig, backend: Arc<dyn LlmBackend>) -> Self {
        Self::with_agents(config, backend, default_agents("default"))
    }

    /// Create an orchestrator with a custom roster.
    pub fn with_agents(
        config: OrchestratorConfig,
        backend: Arc<dyn LlmBackend>,
        agents: Vec<Agent>,
    ) -> Self {
        Self {
            state: Arc::new(RwLock::new(OrchestratorState::with_agents(config, agents))),
            executor: AgentExecutor::new(backend),
            context: ContextAssembler::new(Arc::new(InMemoryPersistence::new())),
            draining: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.context = self.context.with_persistence(persistence);
        self
    }

    pub fn with_semantic_search(mut self, search: Arc<dyn SemanticSearch>) -> Self {
        self.context = self.context.with_semantic_search(search);
        self
    }

    pub fn with_knowledge_graph(mut self, graph: Arc<dyn KnowledgeGraph>) -> Self {
        self.context = self.context.with_knowledge_graph(graph);
        self
    }

    /// Shared state handle, for inspection in tests and embedding callers.
    pub fn state(&self) -> &Arc<RwLock<OrchestratorState>> {
        &self.state
    }

    // --- tasks ---

    /// Submit a task. The stored task is persisted even when routing fails
    /// with `NoAvailableAgent`, in which case it stays `pending`.
    pub async fn submit_task(&self, task: Task, options: SubmitOptions) -> MaestroResult<SubmitOutcome> {
        let task_id = task.id;
        let (outcome, stored, agent) = {
            let mut state = self.state.write().await;
            let outcome = state.submit(task, &options);
            let stored = state.queue.get(task_id).ok().cloned();
            let agent = outcome
                .as_ref()
                .ok()
                .and_then(SubmitOutcome::assignment)
                .and_then(|a| state.registry.get(&a.agent_id).ok().cloned());
            (outcome, stored, agent)
        };
        if let Some(task) = &stored {
            self.persist_task(task).await;
        }
        if let Some(agent) = &agent {
            self.persist_agent(agent).await;
        }
        outcome
    }

    /// Route a stored `pending` task again.
    pub async fn retry_task(&self, task_id: TaskId, options: SubmitOptions) -> MaestroResult<SubmitOutcome> {
        let (outcome, stored) = {
            let mut state = self.state.write().await;
            let outcome = state.retry(task_id, &options);
            (outcome, state.queue.get(task_id).ok().cloned())
        };
        if let Some(task) = &stored {
            self.persist_task(task).await;
        }
        outcome
    }

    pub async fn get_task(&self, task_id: TaskId) -> MaestroResult<Task> {
        self.state.read().await.queue.get(task_id).cloned()
    }

    /// All tasks in submission order.
    pub async fn list_tasks(&self) -> Vec<Task> {
        self.state
            .read()
            .await
            .queue
            .all_tasks()
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn cancel_task(&self, task_id: TaskId) -> MaestroResult<Task> {
        let task = self.state.write().await.cancel(task_id)?;
        self.persist_task(&task).await;
        Ok(task)
    }

    // --- agents ---

    pub async fn get_agent(&self, agent_id: &str) -> MaestroResult<Agent> {
        self.state.read().await.registry.get(agent_id).cloned()
    }

    /// Agents in registration order.
    pub async fn list_agents(&self) -> Vec<Agent> {
        self.state.read().await.registry.list().to_vec()
    }

    /// Set an agent's active flag. Setting the current value is a no-op.
    pub async fn toggle_agent(&self, agent_id: &str, active: bool) -> MaestroResult<Agent> {
        let (agent, unassigned) = {
            let mut state = self.state.write().await;
            let previous = state.registry.get(agent_id)?.current_task;
            let agent = state.toggle_agent(agent_id, active)?;
            let unassigned = previous
                .and_then(|id| state.queue.get(id).ok())
                .filter(|t| t.assigned_agent.is_none())
                .cloned();
            (agent, unassigned)
        };
        info!(agent = %agent_id, active, "Agent toggled");
        self.persist_agent(&agent).await;
        if let Some(task) = &unassigned {
            self.persist_task(task).await;
        }
        Ok(agent)
    }

    /// Merge a partial config into the agent's config.
    pub async fn update_agent_config(&self, agent_id: &str, patch: AgentConfigPatch) -> MaestroResult<Agent> {
        let agent = self
            .state
            .write()
            .await
            .registry
            .update_config(agent_id, patch)?
            .clone();
        debug!(agent = %agent_id, "Agent config updated");
        self.persist_agent(&agent).await;
        Ok(agent)
    }

    pub async fn get_agent_status(&self, agent_id: &str) -> MaestroResult<AgentStatusReport> {
        let state = self.state.read().await;
        let agent = state.registry.get(agent_id)?.clone();
        let current_task = agent
            .current_task
            .and_then(|id| state.queue.get(id).ok().cloned());
        Ok(AgentStatusReport {
            current_task,
            collaboration_ids: state.collaborations.involving(agent_id),
            recent_messages: state
                .bus
                .recent_for(agent_id, state.config.recent_message_limit),
            agent,
        })
    }

    // --- collaborations, negotiations, messages ---

    pub async fn get_collaboration(&self, id: Uuid) -> MaestroResult<Collaboration> {
        self.state.read().await.collaborations.get(id).cloned()
    }

    pub async fn get_negotiation(&self, id: Uuid) -> MaestroResult<Negotiation> {
        self.state.read().await.negotiations.get(id).cloned()
    }

    /// Queue a message for the next message tick.
    pub async fn send_message(&self, message: AgentMessage) {
        debug!(from = %message.from, kind = ?message.message_type, "Message queued");
        self.state.write().await.bus.enqueue(message);
    }

    pub async fn get_orchestration_stats(&self) -> OrchestrationStats {
        self.state.read().await.stats()
    }

    // --- ticks ---

    /// Drain the work queue, running items one at a time in FIFO order.
    ///
    /// Returns the number of items taken. A call made while another drain is
    /// running returns 0 immediately.
    pub async fn process_queue(&self) -> usize {
        if self.draining.swap(true, Ordering::AcqRel) {
            debug!("Queue drain already running");
            return 0;
        }
        let _guard = DrainGuard(&self.draining);
        let delay = self.state.read().await.config.inter_task_delay();

        let mut processed = 0;
        loop {
            let work = self.state.write().await.queue.pop_work();
            let Some(work) = work else {
                break;
            };
            if processed > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let outcome = match work {
                QueuedWork::Direct(task_id) => self.execute_direct(task_id).await,
                QueuedWork::Collaboration(id) => self.execute_collaboration(id).await,
            };
            if let Err(e) = outcome {
                error!(work = ?work, error = %e, "Queued work failed");
            }
            processed += 1;
        }
        processed
    }

    async fn execute_direct(&self, task_id: TaskId) -> MaestroResult<()> {
        let step = self.state.write().await.prepare_direct(task_id)?;
        let job = match step {
            DirectStep::Run(job) => job,
            DirectStep::Skipped => return Ok(()),
            DirectStep::Failed(task) => {
                self.persist_task(&task).await;
                return Ok(());
            }
        };

        info!(task_id = %task_id, agent = %job.agent.id, "Executing task");
        let context = self.context.assemble(&job.task).await;
        let result = self.executor.invoke(&job.agent, &job.task, None, &context).await;

        let (task, agent) = {
            let mut state = self.state.write().await;
            let task = state.finish_direct(task_id, &job.agent.id, result)?;
            (task, state.registry.get(&job.agent.id).ok().cloned())
        };
        if let Some(task) = &task {
            self.persist_task(task).await;
        }
        if let Some(agent) = &agent {
            self.persist_agent(agent).await;
        }
        Ok(())
    }

    async fn execute_collaboration(&self, collaboration_id: Uuid) -> MaestroResult<()> {
        let job = self.state.write().await.begin_collaboration(collaboration_id)?;
        let Some(job) = job else {
            debug!(collaboration_id = %collaboration_id, "Skipping stale collaboration");
            return Ok(());
        };

        let context = self.context.assemble(&job.task).await;
        let started = Instant::now();
        let outcome = run_strategy(&StrategyContext {
            state: &self.state,
            executor: &self.executor,
            job: &job,
            context: &context,
        })
        .await;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let (task, agents) = {
            let mut state = self.state.write().await;
            let task = state.finish_collaboration(collaboration_id, outcome, duration_ms)?;
            let agents: Vec<Agent> = job
                .participants
                .iter()
                .filter_map(|a| state.registry.get(&a.id).ok().cloned())
                .collect();
            (task, agents)
        };
        if let Some(task) = &task {
            self.persist_task(task).await;
        }
        for agent in &agents {
            self.persist_agent(agent).await;
        }
        Ok(())
    }

    /// Dispatch every queued message. Returns how many were dispatched.
    pub async fn process_messages(&self) -> usize {
        self.state.write().await.drain_messages()
    }

    pub async fn run_maintenance(&self) -> MaintenanceReport {
        self.run_maintenance_at(Utc::now()).await
    }

    /// Maintenance sweep against an explicit clock, then persist every agent
    /// and every task the sweep failed.
    pub async fn run_maintenance_at(&self, now: DateTime<Utc>) -> MaintenanceReport {
        let (report, agents) = {
            let mut state = self.state.write().await;
            let report = state.run_maintenance(now);
            (report, state.registry.list().to_vec())
        };
        for task in &report.failed_tasks {
            self.persist_task(task).await;
        }
        for agent in &agents {
            self.persist_agent(agent).await;
        }
        report
    }

    /// Spawn the queue, message and maintenance loops.
    pub async fn start(&self) -> OrchestratorHandle {
        let config = self.state.read().await.config.clone();
        info!(
            queue_tick_ms = config.queue_tick_ms,
            message_tick_ms = config.message_tick_ms,
            maintenance_interval_secs = config.maintenance_interval_secs,
            "Starting orchestrator loops"
        );

        let queue = {
            let this = self.clone();
            spawn_loop(config.queue_tick(), move || {
                let this = this.clone();
                async move {
                    this.process_queue().await;
                }
            })
        };
        let messages = {
            let this = self.clone();
            spawn_loop(config.message_tick(), move || {
                let this = this.clone();
                async move {
                    this.process_messages().await;
                }
            })
        };
        let maintenance = {
            let this = self.clone();
            spawn_loop(config.maintenance_interval(), move || {
                let this = this.clone();
                async move {
                    this.run_maintenance().await;
                }
            })
        };

        OrchestratorHandle {
            loops: vec![queue, messages, maintenance],
        }
    }

    async fn persist_task(&self, task: &Task) {
        if let Err(e) = self.context.persistence().save_task(task).await {
            warn!(task_id = %task.id, error = %e, "Failed to persist task");
        }
    }

    async fn persist_agent(&self, agent: &Agent) {
        if let Err(e) = self.context.persistence().save_agent(agent).await {
            warn!(agent = %agent.id, error = %e, "Failed to persist agent");
        }
    }
}

struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn spawn_loop<F, Fut>(period: Duration, mut tick: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // the first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            tick().await;
        }
    })
}

/// Handle to the background loops started by [`Orchestrator::start`].
pub struct OrchestratorHandle {
    loops: Vec<JoinHandle<()>>,
}

impl OrchestratorHandle {
    /// Stop the loops. Work already in flight is abandoned at its next await.
    pub fn abort(&self) {
        for handle in &self.loops {
            handle.abort();
        }
    }

    /// Abort the loops and wait for them to wind down.
    pub async fn shutdown(self) {
        self.abort();
        for handle in self.loops {
            let _ = handle.await;
        }
        info!("Orchestrator loops stopped");
    }

    pub fn is_finished(&self) -> bool {
        self.loops.iter().all(JoinHandle::is_finished)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::{TaskStatus, TaskType};
    use maestro_agent::EchoBackend;

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(OrchestratorConfig::immediate(), Arc::new(EchoBackend::new()))
    }

    #[tokio::test]
    async fn test_submit_and_drain_persists_task() {
        let store = Arc::new(InMemoryPersistence::new());
        let orch = orchestrator().with_persistence(store.clone());
        let task = Task::new("Write a parser", TaskType::Code);
        orch.submit_task(task.clone(), SubmitOptions::default()).await.unwrap();
        assert_eq!(store.task(task.id).await.unwrap().status, TaskStatus::InProgress);

        assert_eq!(orch.process_queue().await, 1);
        let done = orch.get_task(task.id).await.unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(store.task(task.id).await.unwrap().status, TaskStatus::Completed);
        let agent = store.agent("code-master").await.unwrap();
        assert_eq!(agent.performance.tasks_completed, 1);
    }

    #[tokio::test]
    async fn test_concurrent_drain_is_a_no_op() {
        let orch = orchestrator();
        orch.draining.store(true, Ordering::Release);
        orch.submit_task(Task::new("t", TaskType::Code), SubmitOptions::default())
            .await
            .unwrap();
        assert_eq!(orch.process_queue().await, 0);
        orch.draining.store(false, Ordering::Release);
        assert_eq!(orch.process_queue().await, 1);
    }

    #[tokio::test]
    async fn test_agent_status_report() {
        let orch = orchestrator();
        let task = Task::new("Fix login", TaskType::Debug);
        let outcome = orch.submit_task(task.clone(), SubmitOptions::default()).await.unwrap();
        let agent_id = outcome.assignment().unwrap().agent_id.clone();

        let report = orch.get_agent_status(&agent_id).await.unwrap();
        assert_eq!(report.current_task.unwrap().id, task.id);
        assert!(report.collaboration_ids.is_empty());
        assert!(orch.get_agent_status("ghost").await.is_err());
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let config = OrchestratorConfig {
            queue_tick_ms: 10,
            message_tick_ms: 10,
            ..OrchestratorConfig::immediate()
        };
        let orch = Orchestrator::new(config, Arc::new(EchoBackend::new()));
        let handle = orch.start().await;
        let task = Task::new("Background", TaskType::Test);
        orch.submit_task(task.clone(), SubmitOptions::default()).await.unwrap();

        let mut status = TaskStatus::InProgress;
        for _ in 0..100 {
            status = orch.get_task(task.id).await.unwrap().status;
            if status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(status, TaskStatus::Completed);
        handle.shutdown().await;
    }
}
