//! The four collaboration strategies.
//!
//! Strategies run without holding the state lock except for short
//! negotiation and registry lookups.

use crate::collaboration::{CollaborationJob, CollaborationType};
use crate::context::ContextBundle;
use crate::executor::{AgentExecutor, AgentOutput};
use crate::negotiation::Proposal;
use crate::state::OrchestratorState;
use crate::types::{Agent, AgentId, AgentRole, TaskResult};
use futures_util::future::join_all;
use maestro_core::MaestroError;
use regex::Regex;
use std::fmt::Write;
use std::sync::{Arc, LazyLock};
use tokio::sync::RwLock;
use tracing::{debug, info};

#[allow(clippy::expect_used)]
static NUMBERED_STEP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)\.\s+(.+)$").expect("valid numbered step pattern"));

#[allow(clippy::expect_used)]
static LABELLED_STEP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*Subtask\s+(\d+):\s*(.+)$").expect("valid labelled step pattern")
});

const PLAN_INSTRUCTION: &str = "\
Break this task into a numbered list of subtasks, one per line, formatted as \
`1. <subtask>`. Do not solve the subtasks yet.";

const PROPOSAL_INSTRUCTION: &str = "\
Propose a complete solution. Other agents are proposing in parallel; the \
strongest proposal will be adopted as the team's answer.";

const CONTRIBUTION_INSTRUCTION: &str = "\
Contribute your specialist perspective on this task. The team lead will merge \
all contributions into a single answer.";

/// Result of a strategy that finished successfully.
#[derive(Debug, Clone)]
pub struct StrategyOutput {
    pub result: TaskResult,
    /// Every successful agent call made by the strategy, in call order.
    pub contributions: Vec<AgentOutput>,
}

/// Why a strategy gave up. `agent_id` names the agent whose call failed.
#[derive(Debug)]
pub struct StrategyFailure {
    pub agent_id: Option<AgentId>,
    pub error: MaestroError,
}

impl StrategyFailure {
    fn agent(agent: &Agent, error: MaestroError) -> Self {
        Self {
            agent_id: Some(agent.id.clone()),
            error,
        }
    }

    fn orchestrator(error: MaestroError) -> Self {
        Self {
            agent_id: None,
            error,
        }
    }
}

type StrategyResult = Result<StrategyOutput, StrategyFailure>;

/// Everything a strategy needs for one run.
pub struct StrategyContext<'a> {
    pub state: &'a Arc<RwLock<OrchestratorState>>,
    pub executor: &'a AgentExecutor,
    pub job: &'a CollaborationJob,
    pub context: &'a ContextBundle,
}

impl StrategyContext<'_> {
    fn primary(&self) -> Result<&Agent, StrategyFailure> {
        self.job.participants.first().ok_or_else(|| {
            StrategyFailure::orchestrator(MaestroError::NoAvailableAgent(format!(
                "collaboration {} has no participants",
                self.job.collaboration.id
            )))
        })
    }

    fn secondaries(&self) -> &[Agent] {
        self.job.participants.get(1..).unwrap_or_default()
    }

    async fn call(&self, agent: &Agent, instruction: Option<&str>) -> Result<AgentOutput, StrategyFailure> {
        self.executor
            .invoke(agent, &self.job.task, instruction, self.context)
            .await
            .map_err(|e| StrategyFailure::agent(agent, e))
    }
}

/// Run the collaboration's strategy to completion.
pub async fn run_strategy(ctx: &StrategyContext<'_>) -> StrategyResult {
    let kind = ctx.job.collaboration.collaboration_type;
    info!(
        collaboration_id = %ctx.job.collaboration.id,
        task_id = %ctx.job.task.id,
        kind = %kind,
        "Running collaboration strategy"
    );
    match kind {
        CollaborationType::Sequential => sequential(ctx).await,
        CollaborationType::Parallel => parallel(ctx).await,
        CollaborationType::Hierarchical => hierarchical(ctx).await,
        CollaborationType::Consensus => consensus(ctx).await,
    }
}

fn total_tokens(outputs: &[AgentOutput]) -> u64 {
    outputs.iter().map(|o| o.tokens_used).sum()
}

fn finish(result: TaskResult, contributions: Vec<AgentOutput>) -> StrategyResult {
    let result = result.with_tokens(total_tokens(&contributions));
    Ok(StrategyOutput {
        result,
        contributions,
    })
}

/// Primary executes; every other participant critiques the running output.
async fn sequential(ctx: &StrategyContext<'_>) -> StrategyResult {
    let primary = ctx.primary()?;
    let first = ctx.call(primary, None).await?;
    let mut output = first.content.clone();
    let mut contributions = vec![first];

    for reviewer in ctx.secondaries() {
        let instruction = format!(
            "Critique the following work. List concrete problems, then suggestions.\n\n{output}"
        );
        let critique = ctx.call(reviewer, Some(&instruction)).await?;
        let _ = write!(output, "\n\n## Review by {}\n{}", reviewer.name, critique.content);
        contributions.push(critique);
    }

    let reviews = contributions.len() - 1;
    finish(
        TaskResult::success(output).with_metadata("reviews", reviews),
        contributions,
    )
}

/// Secondaries contribute concurrently; the primary synthesizes what arrived.
async fn parallel(ctx: &StrategyContext<'_>) -> StrategyResult {
    let primary = ctx.primary()?;
    let calls = ctx
        .secondaries()
        .iter()
        .map(|agent| ctx.call(agent, Some(CONTRIBUTION_INSTRUCTION)));
    let mut contributions: Vec<AgentOutput> = join_all(calls)
        .await
        .into_iter()
        .filter_map(|r| match r {
            Ok(output) => Some(output),
            Err(failure) => {
                debug!(agent = ?failure.agent_id, error = %failure.error, "Dropping failed contribution");
                None
            }
        })
        .collect();

    if contributions.is_empty() {
        let solo = ctx.call(primary, None).await?;
        let result = TaskResult::success(solo.content.clone()).with_metadata("synthesized_from", 0);
        return finish(result, vec![solo]);
    }

    let mut instruction =
        String::from("Synthesize these contributions from your teammates into one answer.\n");
    for contribution in &contributions {
        let _ = write!(
            instruction,
            "\n### {}\n{}\n",
            contribution.agent_id, contribution.content
        );
    }
    let synthesized_from = contributions.len();
    let synthesis = ctx.call(primary, Some(&instruction)).await?;
    let result = TaskResult::success(synthesis.content.clone())
        .with_metadata("synthesized_from", synthesized_from);
    contributions.push(synthesis);
    finish(result, contributions)
}

/// Extract `1. text` or `Subtask 1: text` lines from a plan.
///
/// Best effort: anything else in the plan is ignored.
pub fn parse_subtasks(plan: &str) -> Vec<String> {
    plan.lines()
        .filter_map(|line| {
            NUMBERED_STEP
                .captures(line)
                .or_else(|| LABELLED_STEP.captures(line))
                .and_then(|c| c.get(2))
                .map(|m| m.as_str().trim().to_string())
        })
        .filter(|s| !s.is_empty())
        .collect()
}

/// Role a subtask should be routed to, by keyword.
pub fn route_subtask(subtask: &str) -> AgentRole {
    let lower = subtask.to_lowercase();
    if lower.contains("design") {
        AgentRole::Designer
    } else if lower.contains("test") || lower.contains("debug") {
        AgentRole::QualityAssurance
    } else if lower.contains("deploy") {
        AgentRole::DevOps
    } else {
        AgentRole::Coder
    }
}

/// Primary plans, subtasks go to role owners in order, primary synthesizes.
async fn hierarchical(ctx: &StrategyContext<'_>) -> StrategyResult {
    let primary = ctx.primary()?;
    let plan = ctx.call(primary, Some(PLAN_INSTRUCTION)).await?;
    let subtasks = parse_subtasks(&plan.content);

    if subtasks.is_empty() {
        debug!(task_id = %ctx.job.task.id, "Plan had no parseable subtasks, running single agent");
        let solo = ctx.call(primary, None).await?;
        let result = TaskResult::success(solo.content.clone()).with_metadata("subtasks", 0);
        return finish(result, vec![plan, solo]);
    }

    let mut contributions = vec![plan];
    let mut results = String::new();
    for (index, subtask) in subtasks.iter().enumerate() {
        let (worker, borrowed) = subtask_worker(ctx, route_subtask(subtask), primary).await;

        let instruction = format!("Subtask {}: {subtask}\nComplete only this subtask.", index + 1);
        // a failed borrowed worker keeps the task so the failure lands on it
        let output = ctx.call(&worker, Some(&instruction)).await?;
        if borrowed {
            ctx.state.write().await.registry.release(&worker.id, ctx.job.task.id);
        }
        let _ = write!(
            results,
            "\n### Subtask {} ({}): {subtask}\n{}\n",
            index + 1,
            worker.name,
            output.content
        );
        contributions.push(output);
    }

    let instruction = format!("Combine these subtask results into the final deliverable.\n{results}");
    let synthesis = ctx.call(primary, Some(&instruction)).await?;
    let result = TaskResult::success(synthesis.content.clone())
        .with_metadata("subtasks", subtasks.len());
    contributions.push(synthesis);
    finish(result, contributions)
}

/// Pick the agent for one subtask: a participant with the role, else an idle
/// agent with the role (marked working until it answers), else the primary.
/// The flag is true when the agent was borrowed from outside the participants.
async fn subtask_worker(ctx: &StrategyContext<'_>, role: AgentRole, primary: &Agent) -> (Agent, bool) {
    if let Some(participant) = ctx.job.participants.iter().find(|a| a.role == role) {
        return (participant.clone(), false);
    }
    let mut state = ctx.state.write().await;
    let Some(idle) = state.registry.available().find(|a| a.role == role).cloned() else {
        return (primary.clone(), false);
    };
    match state.registry.mark_working(&idle.id, ctx.job.task.id) {
        Ok(()) => {
            debug!(agent = %idle.id, task_id = %ctx.job.task.id, "Borrowed idle agent for subtask");
            (idle, true)
        }
        Err(_) => (primary.clone(), false),
    }
}

/// Every participant proposes; the negotiation resolver picks the winner.
async fn consensus(ctx: &StrategyContext<'_>) -> StrategyResult {
    let task = &ctx.job.task;
    let participant_ids: Vec<AgentId> = ctx.job.participants.iter().map(|a| a.id.clone()).collect();
    let negotiation_id = {
        let mut state = ctx.state.write().await;
        state
            .negotiations
            .open(task.id, task.title.clone(), participant_ids)
            .map_err(StrategyFailure::orchestrator)?
    };

    let calls = ctx
        .job
        .participants
        .iter()
        .map(|agent| ctx.call(agent, Some(PROPOSAL_INSTRUCTION)));
    let mut proposals = Vec::new();
    for outcome in join_all(calls).await {
        match outcome {
            Ok(output) => proposals.push(output),
            Err(failure) => {
                ctx.state.write().await.negotiations.fail(negotiation_id);
                return Err(failure);
            }
        }
    }

    let winner = {
        let mut state = ctx.state.write().await;
        for output in &proposals {
            let mut proposal = Proposal::new(output.agent_id.clone(), output.content.clone(), output.tokens_used);
            proposal.priority = task.priority;
            state
                .negotiations
                .submit_proposal(negotiation_id, proposal)
                .map_err(StrategyFailure::orchestrator)?;
        }
        state
            .negotiations
            .resolve(negotiation_id)
            .map_err(StrategyFailure::orchestrator)?
    };

    let result = TaskResult::success(winner.content)
        .with_metadata("winning_agent", winner.agent_id)
        .with_metadata("proposal_count", proposals.len())
        .with_metadata("negotiation_id", negotiation_id.to_string());
    finish(result, proposals)
}
