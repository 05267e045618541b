use crate::collaboration::{Collaboration, CollaborationStatus};
use crate::scoring::required_capabilities;
use crate::types::{Agent, AgentId, TaskType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;
use uuid::Uuid;

/// Samples needed before expertise reaches its full weight.
const EXPERTISE_SAMPLES: f64 = 10.0;

/// Learned per-agent affinity data, separate from raw performance counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpecialization {
    pub agent_id: AgentId,
    pub domains: BTreeSet<TaskType>,
    /// Capability → `[0, 1]` confidence-weighted performance.
    pub expertise: BTreeMap<String, f64>,
    /// Capability → share of finished collaborations that completed.
    pub performance: BTreeMap<String, f64>,
    /// Most recent collaborations, oldest first.
    pub collaboration_history: Vec<Uuid>,
    pub preferred_partners: BTreeSet<AgentId>,
    pub avoided_partners: BTreeSet<AgentId>,
    pub updated_at: DateTime<Utc>,
}

impl AgentSpecialization {
    /// All-zero record for an agent with no history.
    pub fn empty(agent_id: impl Into<AgentId>) -> Self {
        Self {
            agent_id: agent_id.into(),
            domains: BTreeSet::new(),
            expertise: BTreeMap::new(),
            performance: BTreeMap::new(),
            collaboration_history: Vec::new(),
            preferred_partners: BTreeSet::new(),
            avoided_partners: BTreeSet::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn expertise_in(&self, capability: &str) -> f64 {
        self.expertise.get(capability).copied().unwrap_or(0.0)
    }
}

#[derive(Default)]
struct Tally {
    samples: u32,
    successes: u32,
}

#[derive(Debug, Clone, Default)]
pub struct SpecializationStore {
    records: HashMap<AgentId, AgentSpecialization>,
}

impl SpecializationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record for `agent_id`, or an all-zero default for agents never learned.
    pub fn get(&self, agent_id: &str) -> Cow<'_, AgentSpecialization> {
        match self.records.get(agent_id) {
            Some(record) => Cow::Borrowed(record),
            None => Cow::Owned(AgentSpecialization::empty(agent_id)),
        }
    }

    pub fn insert(&mut self, record: AgentSpecialization) {
        self.records.insert(record.agent_id.clone(), record);
    }

    /// Rebuild every agent's record from collaboration history.
    ///
    /// `history` pairs each collaboration with its task's type and must be
    /// ordered oldest first.
    pub fn learn(
        &mut self,
        agents: &[Agent],
        history: &[(&Collaboration, TaskType)],
        history_limit: usize,
        now: DateTime<Utc>,
    ) {
        for agent in agents {
            let mine: Vec<&(&Collaboration, TaskType)> = history
                .iter()
                .filter(|(c, _)| c.participants.contains(&agent.id))
                .collect();

            let mut record = AgentSpecialization::empty(agent.id.clone());
            record.updated_at = now;

            let skip = mine.len().saturating_sub(history_limit);
            record.collaboration_history = mine.iter().skip(skip).map(|(c, _)| c.id).collect();
            record.domains = mine.iter().map(|(_, t)| *t).collect();

            let mut tallies: BTreeMap<&str, Tally> = BTreeMap::new();
            let mut succeeded_with: BTreeSet<AgentId> = BTreeSet::new();
            let mut failed_with: BTreeSet<AgentId> = BTreeSet::new();

            for (collab, task_type) in &mine {
                let completed = match collab.status {
                    CollaborationStatus::Completed => true,
                    CollaborationStatus::Failed => false,
                    _ => continue,
                };
                for cap in required_capabilities(*task_type)
                    .iter()
                    .filter(|c| agent.has_capability(c))
                {
                    let tally = tallies.entry(*cap).or_default();
                    tally.samples += 1;
                    if completed {
                        tally.successes += 1;
                    }
                }
                let partners = collab.participants.iter().filter(|p| **p != agent.id).cloned();
                if completed {
                    succeeded_with.extend(partners);
                } else {
                    failed_with.extend(partners);
                }
            }

            for (cap, tally) in tallies {
                let performance = f64::from(tally.successes) / f64::from(tally.samples);
                let confidence = (f64::from(tally.samples) / EXPERTISE_SAMPLES).min(1.0);
                record.performance.insert(cap.to_string(), performance);
                record.expertise.insert(cap.to_string(), performance * confidence);
            }
            record.avoided_partners = failed_with.difference(&succeeded_with).cloned().collect();
            record.preferred_partners = succeeded_with;

            debug!(
                agent = %agent.id,
                collaborations = record.collaboration_history.len(),
                "Specialization updated"
            );
            self.records.insert(agent.id.clone(), record);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::collaboration::CollaborationType;
    use crate::types::AgentRole;

    fn collab(participants: &[&str], status: CollaborationStatus) -> Collaboration {
        let mut c = Collaboration::new(
            Uuid::new_v4(),
            participants.iter().map(|p| p.to_string()).collect(),
            CollaborationType::Parallel,
        );
        c.status = status;
        c
    }

    fn coder() -> Agent {
        Agent::new("coder", "Coder", AgentRole::Coder)
            .with_capabilities(["code-generation", "refactoring"])
    }

    #[test]
    fn test_unknown_agent_gets_default() {
        let store = SpecializationStore::new();
        let record = store.get("nobody");
        assert_eq!(record.agent_id, "nobody");
        assert!(record.collaboration_history.is_empty());
        assert_eq!(record.expertise_in("refactoring"), 0.0);
    }

    #[test]
    fn test_learning_pass() {
        let done = collab(&["coder", "qa"], CollaborationStatus::Completed);
        let failed = collab(&["coder", "ops"], CollaborationStatus::Failed);
        let running = collab(&["coder"], CollaborationStatus::InProgress);
        let history = vec![
            (&done, TaskType::Code),
            (&failed, TaskType::Code),
            (&running, TaskType::Design),
        ];

        let mut store = SpecializationStore::new();
        store.learn(&[coder()], &history, 50, Utc::now());
        let record = store.get("coder");

        assert_eq!(record.collaboration_history.len(), 3);
        assert!(record.domains.contains(&TaskType::Design));
        assert_eq!(record.performance["code-generation"], 0.5);
        // 0.5 performance * 2/10 confidence
        assert!((record.expertise_in("code-generation") - 0.1).abs() < 1e-9);
        assert!(record.preferred_partners.contains("qa"));
        assert!(record.avoided_partners.contains("ops"));
        assert!(!record.avoided_partners.contains("qa"));
    }

    #[test]
    fn test_partner_seen_in_success_is_not_avoided() {
        let good = collab(&["coder", "qa"], CollaborationStatus::Completed);
        let bad = collab(&["coder", "qa"], CollaborationStatus::Failed);
        let history = vec![(&good, TaskType::Code), (&bad, TaskType::Code)];

        let mut store = SpecializationStore::new();
        store.learn(&[coder()], &history, 50, Utc::now());
        let record = store.get("coder");
        assert!(record.preferred_partners.contains("qa"));
        assert!(record.avoided_partners.is_empty());
    }

    #[test]
    fn test_history_limit_keeps_most_recent() {
        let collabs: Vec<Collaboration> = (0..5)
            .map(|_| collab(&["coder"], CollaborationStatus::Completed))
            .collect();
        let history: Vec<(&Collaboration, TaskType)> =
            collabs.iter().map(|c| (c, TaskType::Code)).collect();

        let mut store = SpecializationStore::new();
        store.learn(&[coder()], &history, 2, Utc::now());
        let record = store.get("coder");
        assert_eq!(record.collaboration_history, vec![collabs[3].id, collabs[4].id]);
        // every finished collaboration still counts
        assert!((record.expertise_in("refactoring") - 0.5).abs() < 1e-9);
    }
}
