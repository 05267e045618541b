use crate::types::{Agent, AgentConfig, AgentPerformance, AgentRole};

/// Create the default agent roster.
/// Every agent's config points at `provider`; temperatures are tuned per role.
pub fn default_agents(provider: &str) -> Vec<Agent> {
    vec![
        code_master(provider),
        design_guru(provider),
        quality_guardian(provider),
        deploy_master(provider),
        bug_hunter(provider),
    ]
}

fn base_config(provider: &str, temperature: f32) -> AgentConfig {
    AgentConfig {
        primary_provider: provider.to_string(),
        temperature,
        ..AgentConfig::default()
    }
}

fn seasoned() -> AgentPerformance {
    AgentPerformance {
        tasks_completed: 0,
        success_rate: 0.9,
        average_time_ms: 30_000.0,
        quality_score: 0.85,
        user_rating: 0.8,
    }
}

fn code_master(provider: &str) -> Agent {
    Agent::new("code-master", "Code Master", AgentRole::Coder)
        .with_description("Writes, refactors and explains production code across languages")
        .with_capabilities([
            "code-generation",
            "refactoring",
            "multiple-languages",
            "communication",
        ])
        .with_performance(seasoned())
        .with_config(base_config(provider, 0.2))
}

fn design_guru(provider: &str) -> Agent {
    Agent::new("design-guru", "Design Guru", AgentRole::Designer)
        .with_description("Designs interfaces, user flows and interactive prototypes")
        .with_capabilities(["ui-design", "ux-design", "prototyping", "communication"])
        .with_performance(seasoned())
        .with_config(base_config(provider, 0.7))
}

fn quality_guardian(provider: &str) -> Agent {
    Agent::new("quality-guardian", "Quality Guardian", AgentRole::QualityAssurance)
        .with_description("Plans test strategy, automates suites and catches regressions")
        .with_capabilities([
            "testing",
            "test-automation",
            "quality-assurance",
            "bug-detection",
        ])
        .with_performance(seasoned())
        .with_config(base_config(provider, 0.3))
}

fn deploy_master(provider: &str) -> Agent {
    Agent::new("deploy-master", "Deploy Master", AgentRole::DevOps)
        .with_description("Owns pipelines, infrastructure and production rollouts")
        .with_capabilities(["deployment", "ci-cd", "infrastructure", "monitoring"])
        .with_performance(seasoned())
        .with_config(base_config(provider, 0.3))
}

fn bug_hunter(provider: &str) -> Agent {
    Agent::new("bug-hunter", "Bug Hunter", AgentRole::Debugger)
        .with_description("Reproduces failures, reads traces and profiles hot paths")
        .with_capabilities([
            "debugging",
            "error-analysis",
            "performance-profiling",
            "bug-detection",
        ])
        .with_performance(seasoned())
        .with_config(base_config(provider, 0.2))
        .inactive()
}

/// Default system prompt for a role. Supports the same placeholders as
/// [`AgentConfig::prompt_template`].
pub fn role_prompt(role: AgentRole) -> &'static str {
    match role {
        AgentRole::Coder => CODER_PROMPT,
        AgentRole::Designer => DESIGNER_PROMPT,
        AgentRole::QualityAssurance => QA_PROMPT,
        AgentRole::DevOps => DEVOPS_PROMPT,
        AgentRole::Debugger => DEBUGGER_PROMPT,
    }
}

const CODER_PROMPT: &str = "\
You are {name}, a {role} in the Maestro multi-agent team. You write clean, \
idiomatic, well-tested code.

Rules:
1. Follow the conventions of the project you are given.
2. Put every file in a fenced code block whose first line is `// path: <file>`.
3. Keep changes minimal and explain non-obvious decisions briefly.
4. When critiquing a teammate, list concrete problems before suggestions.
";

const DESIGNER_PROMPT: &str = "\
You are {name}, a {role} in the Maestro multi-agent team. You design usable, \
accessible interfaces.

Rules:
1. Start from the user's goal, then describe the flow screen by screen.
2. Name components and states explicitly so developers can build them.
3. Call out accessibility and responsive-layout concerns.
";

const QA_PROMPT: &str = "\
You are {name}, a {role} in the Maestro multi-agent team. You find defects \
before users do.

Rules:
1. Cover happy paths, edge cases and error conditions.
2. Prefer automated tests; write them in fenced code blocks.
3. Report each issue with steps to reproduce and expected behaviour.
";

const DEVOPS_PROMPT: &str = "\
You are {name}, a {role} in the Maestro multi-agent team. You ship software \
safely.

Rules:
1. Describe the rollout plan step by step, including rollback.
2. Keep pipelines and infrastructure as code in fenced code blocks.
3. Name the monitoring signals that confirm a healthy deploy.
";

const DEBUGGER_PROMPT: &str = "\
You are {name}, a {role} in the Maestro multi-agent team. You explain why \
things break.

Rules:
1. State the most likely root cause first, with evidence.
2. Propose the smallest fix and a test that would have caught it.
3. Flag performance hot spots when the symptoms point to them.
";

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_agents_count() {
        let agents = default_agents("default");
        assert_eq!(agents.len(), 5);
        assert_eq!(agents.iter().filter(|a| a.is_active).count(), 4);
    }

    #[test]
    fn test_debugger_starts_inactive() {
        let agents = default_agents("default");
        let hunter = agents.iter().find(|a| a.id == "bug-hunter").unwrap();
        assert_eq!(hunter.role, AgentRole::Debugger);
        assert!(!hunter.is_active);
    }

    #[test]
    fn test_all_roles_covered() {
        let agents = default_agents("default");
        for role in [
            AgentRole::Coder,
            AgentRole::Designer,
            AgentRole::QualityAssurance,
            AgentRole::DevOps,
            AgentRole::Debugger,
        ] {
            assert!(agents.iter().any(|a| a.role == role), "missing {role:?}");
            assert!(role_prompt(role).contains("{name}"));
        }
    }

    #[test]
    fn test_provider_is_propagated() {
        for agent in default_agents("openrouter") {
            assert_eq!(agent.config.primary_provider, "openrouter");
        }
    }

    #[test]
    fn test_coder_low_temperature() {
        let agents = default_agents("default");
        let coder = agents.iter().find(|a| a.role == AgentRole::Coder).unwrap();
        assert!(coder.config.temperature <= 0.3);
        assert!(coder.has_capability("communication"));
    }
}
