//! Agent-to-task scoring.
//!
//! Everything here is a pure function of agent, task and specialization
//! state, so the same inputs always pick the same agent.

use crate::specialization::{AgentSpecialization, SpecializationStore};
use crate::types::{Agent, AgentId, AgentRole, AgentStatus, Task, TaskType};

const CAPABILITY_MATCH: f64 = 10.0;
const SUCCESS_WEIGHT: f64 = 5.0;
const QUALITY_WEIGHT: f64 = 3.0;
const RATING_WEIGHT: f64 = 2.0;
const EXPERTISE_WEIGHT: f64 = 5.0;
const PREFERRED_BONUS: f64 = 15.0;
const AVAILABILITY_BONUS: f64 = 5.0;
const ROLE_MATCH_BONUS: f64 = 10.0;
const HISTORY_BONUS: f64 = 5.0;
const COMMUNICATION_BONUS: f64 = 3.0;

/// Capability tags a task type asks for.
pub fn required_capabilities(task_type: TaskType) -> &'static [&'static str] {
    match task_type {
        TaskType::Code => &["code-generation", "refactoring", "multiple-languages"],
        TaskType::Design => &["ui-design", "ux-design", "prototyping"],
        TaskType::Debug => &["debugging", "error-analysis", "bug-detection"],
        TaskType::Test => &["testing", "test-automation", "quality-assurance"],
        TaskType::Deploy => &["deployment", "ci-cd", "infrastructure"],
        TaskType::Analyze => &["code-analysis", "performance-profiling", "error-analysis"],
    }
}

/// Task types a role is the natural owner of.
pub fn role_task_types(role: AgentRole) -> &'static [TaskType] {
    match role {
        AgentRole::Coder => &[TaskType::Code, TaskType::Analyze],
        AgentRole::Designer => &[TaskType::Design],
        AgentRole::QualityAssurance => &[TaskType::Debug, TaskType::Test],
        AgentRole::DevOps => &[TaskType::Deploy],
        AgentRole::Debugger => &[TaskType::Debug, TaskType::Analyze],
    }
}

pub fn role_matches(role: AgentRole, task_type: TaskType) -> bool {
    role_task_types(role).contains(&task_type)
}

fn matching_capabilities<'a>(agent: &'a Agent, task_type: TaskType) -> impl Iterator<Item = &'a str> {
    required_capabilities(task_type)
        .iter()
        .copied()
        .filter(move |cap| agent.has_capability(cap))
}

/// Suitability of `agent` for `task`. Higher is better.
pub fn score_agent(
    agent: &Agent,
    task: &Task,
    specialization: &AgentSpecialization,
    preferred: &[AgentId],
) -> f64 {
    let mut score = 0.0;

    for cap in matching_capabilities(agent, task.task_type) {
        score += CAPABILITY_MATCH;
        score += EXPERTISE_WEIGHT * specialization.expertise_in(cap);
    }

    let perf = &agent.performance;
    score += SUCCESS_WEIGHT * perf.success_rate
        + QUALITY_WEIGHT * perf.quality_score
        + RATING_WEIGHT * perf.user_rating;

    if preferred.iter().any(|p| p == &agent.id) {
        score += PREFERRED_BONUS;
    }
    if agent.status == AgentStatus::Idle {
        score += AVAILABILITY_BONUS;
    }
    if role_matches(agent.role, task.task_type) {
        score += ROLE_MATCH_BONUS;
    }
    score
}

/// Score used when picking collaboration participants.
pub fn collaboration_score(agent: &Agent, task: &Task, specialization: &AgentSpecialization) -> f64 {
    let mut score = score_agent(agent, task, specialization, &[]);
    if !specialization.collaboration_history.is_empty() {
        score += HISTORY_BONUS;
    }
    if agent.has_capability("communication") {
        score += COMMUNICATION_BONUS;
    }
    score
}

/// Highest-scoring candidate. The first candidate seen wins ties.
pub fn select_best<'a, I>(
    candidates: I,
    task: &Task,
    specializations: &SpecializationStore,
    preferred: &[AgentId],
) -> Option<&'a Agent>
where
    I: IntoIterator<Item = &'a Agent>,
{
    let mut best: Option<(&Agent, f64)> = None;
    for agent in candidates {
        let score = score_agent(agent, task, &specializations.get(&agent.id), preferred);
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((agent, score)),
        }
    }
    best.map(|(agent, _)| agent)
}

/// Top `count` candidates by collaboration score, stable on ties.
pub fn rank_for_collaboration<'a, I>(
    candidates: I,
    task: &Task,
    specializations: &SpecializationStore,
    count: usize,
) -> Vec<&'a Agent>
where
    I: IntoIterator<Item = &'a Agent>,
{
    let mut scored: Vec<(&Agent, f64)> = candidates
        .into_iter()
        .map(|a| (a, collaboration_score(a, task, &specializations.get(&a.id))))
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.into_iter().take(count).map(|(a, _)| a).collect()
}

/// Typical duration of a task type in milliseconds.
pub fn base_duration_ms(task_type: TaskType) -> f64 {
    match task_type {
        TaskType::Code => 1_800_000.0,
        TaskType::Design => 1_200_000.0,
        TaskType::Debug => 900_000.0,
        TaskType::Test => 600_000.0,
        TaskType::Deploy => 300_000.0,
        TaskType::Analyze => 600_000.0,
    }
}

/// Advisory duration estimate. Never used for scheduling decisions.
pub fn estimate_duration_ms(agent: &Agent, task: &Task) -> u64 {
    let base = base_duration_ms(task.task_type);
    let speed = 0.8 + 0.2 * (agent.performance.average_time_ms / base);
    let length = task.description.chars().count() as f64;
    let size = 1.0 + 0.5 * (length / 500.0).min(2.0);
    (base * speed * size).round() as u64
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::profiles::default_agents;
    use crate::types::{AgentPerformance, TaskPriority};

    fn agent_with(id: &str, perf: AgentPerformance) -> Agent {
        Agent::new(id, id, AgentRole::Coder)
            .with_capabilities(["code-generation", "refactoring"])
            .with_performance(perf)
    }

    #[test]
    fn test_deploy_task_goes_to_devops() {
        let agents = default_agents("default");
        let task = Task::new("Roll out v2", TaskType::Deploy).with_priority(TaskPriority::Urgent);
        let store = SpecializationStore::new();
        let best = select_best(agents.iter().filter(|a| a.is_available()), &task, &store, &[]);
        assert_eq!(best.unwrap().id, "deploy-master");
    }

    #[test]
    fn test_higher_composite_wins_on_equal_overlap() {
        let strong = agent_with(
            "strong",
            AgentPerformance {
                success_rate: 0.95,
                quality_score: 0.9,
                user_rating: 0.9,
                ..AgentPerformance::default()
            },
        );
        let weak = agent_with(
            "weak",
            AgentPerformance {
                success_rate: 0.5,
                quality_score: 0.5,
                user_rating: 0.5,
                ..AgentPerformance::default()
            },
        );
        let task = Task::new("Refactor parser", TaskType::Code);
        let store = SpecializationStore::new();

        let best = select_best([&weak, &strong], &task, &store, &[]).unwrap();
        assert_eq!(best.id, "strong");
        assert!(strong.performance.composite() > weak.performance.composite());
    }

    #[test]
    fn test_first_seen_wins_ties() {
        let a = agent_with("a", AgentPerformance::default());
        let b = agent_with("b", AgentPerformance::default());
        let task = Task::new("Tie", TaskType::Code);
        let store = SpecializationStore::new();
        assert_eq!(select_best([&a, &b], &task, &store, &[]).unwrap().id, "a");
        assert_eq!(select_best([&b, &a], &task, &store, &[]).unwrap().id, "b");
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let agents = default_agents("default");
        let task = Task::new("Write tests", TaskType::Test);
        let spec = AgentSpecialization::empty("quality-guardian");
        let first = score_agent(&agents[2], &task, &spec, &[]);
        let second = score_agent(&agents[2], &task, &spec, &[]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_score_components() {
        let agent = Agent::new("x", "X", AgentRole::DevOps)
            .with_capabilities(["deployment", "ci-cd"])
            .with_performance(AgentPerformance {
                success_rate: 1.0,
                quality_score: 1.0,
                user_rating: 1.0,
                ..AgentPerformance::default()
            });
        let task = Task::new("Ship", TaskType::Deploy);
        let mut spec = AgentSpecialization::empty("x");
        spec.expertise.insert("deployment".into(), 1.0);

        // 2 caps (20) + perf (10) + expertise (5) + idle (5) + role (10)
        assert_eq!(score_agent(&agent, &task, &spec, &[]), 50.0);
        assert_eq!(score_agent(&agent, &task, &spec, &["x".into()]), 65.0);
    }

    #[test]
    fn test_preferred_agent_bonus_can_flip_choice() {
        let a = agent_with("a", AgentPerformance::default());
        let b = agent_with("b", AgentPerformance::default());
        let task = Task::new("Prefer b", TaskType::Code);
        let store = SpecializationStore::new();
        let best = select_best([&a, &b], &task, &store, &["b".to_string()]).unwrap();
        assert_eq!(best.id, "b");
    }

    #[test]
    fn test_collaboration_score_bonuses() {
        let agents = default_agents("default");
        let task = Task::new("Build page", TaskType::Design);
        let mut spec = AgentSpecialization::empty("design-guru");
        let plain = score_agent(&agents[1], &task, &spec, &[]);
        assert_eq!(collaboration_score(&agents[1], &task, &spec), plain + 3.0);
        spec.collaboration_history.push(uuid::Uuid::new_v4());
        assert_eq!(collaboration_score(&agents[1], &task, &spec), plain + 8.0);
    }

    #[test]
    fn test_duration_estimate() {
        let mut agent = agent_with("a", AgentPerformance::default());
        agent.performance.average_time_ms = 300_000.0;
        let short = Task::new("Deploy", TaskType::Deploy);
        // 300k * (0.8 + 0.2) * 1.0
        assert_eq!(estimate_duration_ms(&agent, &short), 300_000);

        let long = Task::new("Deploy", TaskType::Deploy).with_description("x".repeat(2000));
        // size factor caps at 2.0
        assert_eq!(estimate_duration_ms(&agent, &long), 600_000);
    }
}
