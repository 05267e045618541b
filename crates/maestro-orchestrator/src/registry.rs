use crate::types::{Agent, AgentConfigPatch, AgentId, AgentStatus, TaskId};
use chrono::Utc;
use maestro_core::{MaestroError, MaestroResult};
use tracing::{info, warn};

/// Agents in registration order.
///
/// Agents are never removed; deactivation only flips `is_active`.
#[derive(Debug, Clone, Default)]
pub struct AgentRegistry {
    agents: Vec<Agent>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an agent, replacing any agent with the same id in place.
    pub fn register(&mut self, agent: Agent) {
        match self.agents.iter_mut().find(|a| a.id == agent.id) {
            Some(existing) => *existing = agent,
            None => self.agents.push(agent),
        }
    }

    pub fn get(&self, id: &str) -> MaestroResult<&Agent> {
        self.agents
            .iter()
            .find(|a| a.id == id)
            .ok_or_else(|| MaestroError::AgentNotFound(id.to_string()))
    }

    pub fn get_mut(&mut self, id: &str) -> MaestroResult<&mut Agent> {
        self.agents
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| MaestroError::AgentNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.agents.iter().any(|a| a.id == id)
    }

    pub fn list(&self) -> &[Agent] {
        &self.agents
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.agents.iter().filter(|a| a.is_active).count()
    }

    /// Active, idle agents in registration order.
    pub fn available(&self) -> impl Iterator<Item = &Agent> {
        self.agents.iter().filter(|a| a.is_available())
    }

    /// Ids of agents whose current task is `task_id`.
    pub fn holding(&self, task_id: TaskId) -> Vec<AgentId> {
        self.agents
            .iter()
            .filter(|a| a.current_task == Some(task_id))
            .map(|a| a.id.clone())
            .collect()
    }

    /// Activate or deactivate an agent.
    ///
    /// Deactivation forces the agent idle and clears its current task.
    /// Activation resets an errored agent to idle.
    pub fn set_active(&mut self, id: &str, active: bool) -> MaestroResult<&Agent> {
        let agent = self.get_mut(id)?;
        if active {
            if agent.status == AgentStatus::Error {
                agent.status = AgentStatus::Idle;
            }
        } else {
            if let Some(task_id) = agent.current_task.take() {
                warn!(agent = %agent.id, task_id = %task_id, "Deactivating agent with in-flight task");
            }
            agent.status = AgentStatus::Idle;
        }
        agent.is_active = active;
        agent.updated_at = Utc::now();
        info!(agent = %agent.id, active, "Agent toggled");
        Ok(agent)
    }

    pub fn update_config(&mut self, id: &str, patch: AgentConfigPatch) -> MaestroResult<&Agent> {
        let agent = self.get_mut(id)?;
        agent.config.apply(patch);
        agent.updated_at = Utc::now();
        Ok(agent)
    }

    pub fn mark_working(&mut self, id: &str, task_id: TaskId) -> MaestroResult<()> {
        let agent = self.get_mut(id)?;
        agent.status = AgentStatus::Working;
        agent.current_task = Some(task_id);
        agent.updated_at = Utc::now();
        Ok(())
    }

    /// Return an agent to idle if it is still working on `task_id`.
    ///
    /// An agent that was reassigned (or deactivated) meanwhile is left alone.
    pub fn release(&mut self, id: &str, task_id: TaskId) {
        if let Ok(agent) = self.get_mut(id) {
            if agent.current_task == Some(task_id) {
                agent.current_task = None;
                if agent.status == AgentStatus::Working {
                    agent.status = AgentStatus::Idle;
                }
                agent.updated_at = Utc::now();
            }
        }
    }

    /// Put an agent into `error` after a failed execution of `task_id`.
    pub fn mark_error(&mut self, id: &str, task_id: TaskId) {
        if let Ok(agent) = self.get_mut(id) {
            if agent.current_task == Some(task_id) {
                agent.current_task = None;
                agent.status = AgentStatus::Error;
                agent.updated_at = Utc::now();
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::profiles::default_agents;
    use crate::types::AgentRole;
    use uuid::Uuid;

    fn registry() -> AgentRegistry {
        let mut registry = AgentRegistry::new();
        for agent in default_agents("default") {
            registry.register(agent);
        }
        registry
    }

    #[test]
    fn test_registration_order_preserved() {
        let registry = registry();
        let ids: Vec<&str> = registry.list().iter().map(|a| a.id.as_str()).collect();
        assert_eq!(
            ids,
            ["code-master", "design-guru", "quality-guardian", "deploy-master", "bug-hunter"]
        );
    }

    #[test]
    fn test_register_replaces_in_place() {
        let mut registry = registry();
        let replacement = Agent::new("design-guru", "Renamed", AgentRole::Designer);
        registry.register(replacement);
        assert_eq!(registry.len(), 5);
        assert_eq!(registry.list()[1].name, "Renamed");
    }

    #[test]
    fn test_unknown_agent() {
        let registry = registry();
        assert!(matches!(
            registry.get("ghost"),
            Err(MaestroError::AgentNotFound(id)) if id == "ghost"
        ));
    }

    #[test]
    fn test_deactivate_twice_is_idempotent() {
        let mut registry = registry();
        let task = Uuid::new_v4();
        registry.mark_working("code-master", task).unwrap();

        for _ in 0..2 {
            let agent = registry.set_active("code-master", false).unwrap();
            assert!(!agent.is_active);
            assert_eq!(agent.status, AgentStatus::Idle);
            assert!(agent.current_task.is_none());
        }
    }

    #[test]
    fn test_activation_clears_error() {
        let mut registry = registry();
        let task = Uuid::new_v4();
        registry.mark_working("code-master", task).unwrap();
        registry.mark_error("code-master", task);
        assert_eq!(registry.get("code-master").unwrap().status, AgentStatus::Error);

        let agent = registry.set_active("code-master", true).unwrap();
        assert_eq!(agent.status, AgentStatus::Idle);
    }

    #[test]
    fn test_release_ignores_reassigned_agent() {
        let mut registry = registry();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        registry.mark_working("deploy-master", first).unwrap();
        registry.mark_working("deploy-master", second).unwrap();

        registry.release("deploy-master", first);
        let agent = registry.get("deploy-master").unwrap();
        assert_eq!(agent.status, AgentStatus::Working);
        assert_eq!(agent.current_task, Some(second));
    }

    #[test]
    fn test_holding_lists_every_agent_on_task() {
        let mut registry = registry();
        let task = Uuid::new_v4();
        registry.mark_working("code-master", task).unwrap();
        registry.mark_working("design-guru", task).unwrap();
        registry.mark_working("deploy-master", Uuid::new_v4()).unwrap();
        assert_eq!(registry.holding(task), vec!["code-master".to_string(), "design-guru".to_string()]);
        assert!(registry.holding(Uuid::new_v4()).is_empty());
    }

    #[test]
    fn test_update_config_merges() {
        let mut registry = registry();
        let patch = AgentConfigPatch {
            model: Some("gpt-4o".into()),
            ..AgentConfigPatch::default()
        };
        let agent = registry.update_config("code-master", patch).unwrap();
        assert_eq!(agent.config.model.as_deref(), Some("gpt-4o"));
        assert_eq!(agent.config.temperature, 0.2);
    }

    #[test]
    fn test_active_count_and_role_lookup() {
        let registry = registry();
        assert_eq!(registry.active_count(), 4);
        assert!(registry.available().all(|a| a.role != AgentRole::Debugger));
        assert_eq!(
            registry.available().find(|a| a.role == AgentRole::DevOps).unwrap().id,
            "deploy-master"
        );
    }
}
