use crate::context::ContextBundle;
use crate::performance::ExecutionSample;
use crate::prompt::build_messages;
use crate::types::{Agent, AgentId, Task};
use maestro_agent::llm::estimate_tokens;
use maestro_agent::LlmBackend;
use maestro_core::MaestroResult;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// What one agent produced in one language-model call.
#[derive(Debug, Clone)]
pub struct AgentOutput {
    pub agent_id: AgentId,
    pub content: String,
    pub model_used: String,
    pub tokens_used: u64,
    pub duration_ms: u64,
}

impl AgentOutput {
    pub fn sample(&self) -> ExecutionSample {
        ExecutionSample {
            duration_ms: self.duration_ms,
            tokens_used: self.tokens_used,
            output_len: self.content.chars().count(),
        }
    }
}

/// Runs agents against the language-model backend. Holds no orchestrator state.
#[derive(Clone)]
pub struct AgentExecutor {
    backend: Arc<dyn LlmBackend>,
}

impl AgentExecutor {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self { backend }
    }

    pub async fn invoke(
        &self,
        agent: &Agent,
        task: &Task,
        instruction: Option<&str>,
        context: &ContextBundle,
    ) -> MaestroResult<AgentOutput> {
        let messages = build_messages(agent, task, instruction, context);
        let request = agent.config.model_request();
        let started = Instant::now();

        let response = match self.backend.send(&messages, &request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(agent = %agent.id, task_id = %task.id, error = %e, "Agent call failed");
                return Err(e);
            }
        };
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let tokens_used = match response.usage.total_tokens {
            0 => estimate_tokens(&response.content),
            n => n,
        };
        debug!(
            agent = %agent.id,
            task_id = %task.id,
            model = %response.model_used,
            tokens_used,
            duration_ms,
            "Agent call finished"
        );
        Ok(AgentOutput {
            agent_id: agent.id.clone(),
            content: response.content,
            model_used: response.model_used,
            tokens_used,
            duration_ms,
        })
    }
}
