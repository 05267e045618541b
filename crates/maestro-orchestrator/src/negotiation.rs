use crate::types::{AgentId, TaskId, TaskPriority};
use chrono::{DateTime, Utc};
use maestro_core::{MaestroError, MaestroResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NegotiationStatus {
    Initiated,
    /// Reserved for multi-round policies; the single-round resolver never sets it.
    Negotiating,
    Agreed,
    Failed,
}

impl NegotiationStatus {
    pub fn is_live(&self) -> bool {
        matches!(self, NegotiationStatus::Initiated | NegotiationStatus::Negotiating)
    }
}

impl std::fmt::Display for NegotiationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NegotiationStatus::Initiated => "initiated",
            NegotiationStatus::Negotiating => "negotiating",
            NegotiationStatus::Agreed => "agreed",
            NegotiationStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One agent's candidate answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub agent_id: AgentId,
    pub content: String,
    pub confidence: f64,
    pub priority: TaskPriority,
    /// Carried for future voting policies; not read by the resolver.
    #[serde(default)]
    pub votes: u32,
    pub tokens_used: u64,
    pub submitted_at: DateTime<Utc>,
}

impl Proposal {
    pub fn new(agent_id: impl Into<AgentId>, content: impl Into<String>, tokens_used: u64) -> Self {
        Self {
            agent_id: agent_id.into(),
            content: content.into(),
            confidence: 0.5,
            priority: TaskPriority::Medium,
            votes: 0,
            tokens_used,
            submitted_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Negotiation {
    pub id: Uuid,
    pub task_id: TaskId,
    pub topic: String,
    pub participants: Vec<AgentId>,
    pub proposals: Vec<Proposal>,
    pub status: NegotiationStatus,
    pub resolution: Option<Proposal>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Picks a winner among competing proposals for one task.
#[derive(Debug, Clone, Default)]
pub struct NegotiationResolver {
    negotiations: HashMap<Uuid, Negotiation>,
    order: Vec<Uuid>,
}

impl NegotiationResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: Uuid) -> MaestroResult<&Negotiation> {
        self.negotiations
            .get(&id)
            .ok_or(MaestroError::NegotiationNotFound(id))
    }

    pub fn live_for_task(&self, task_id: TaskId) -> Option<&Negotiation> {
        self.negotiations
            .values()
            .find(|n| n.task_id == task_id && n.status.is_live())
    }

    /// Every negotiation for `task_id`, oldest first.
    pub fn for_task(&self, task_id: TaskId) -> Vec<&Negotiation> {
        self.order
            .iter()
            .filter_map(|id| self.negotiations.get(id))
            .filter(|n| n.task_id == task_id)
            .collect()
    }

    /// Open a negotiation. A task may have at most one live negotiation.
    pub fn open(
        &mut self,
        task_id: TaskId,
        topic: impl Into<String>,
        participants: Vec<AgentId>,
    ) -> MaestroResult<Uuid> {
        if self.live_for_task(task_id).is_some() {
            return Err(MaestroError::NegotiationInProgress(task_id));
        }
        let negotiation = Negotiation {
            id: Uuid::new_v4(),
            task_id,
            topic: topic.into(),
            participants,
            proposals: Vec::new(),
            status: NegotiationStatus::Initiated,
            resolution: None,
            created_at: Utc::now(),
            resolved_at: None,
        };
        let id = negotiation.id;
        info!(negotiation_id = %id, task_id = %task_id, "Negotiation opened");
        self.negotiations.insert(id, negotiation);
        self.order.push(id);
        Ok(id)
    }

    fn live_mut(&mut self, id: Uuid) -> MaestroResult<&mut Negotiation> {
        let negotiation = self
            .negotiations
            .get_mut(&id)
            .ok_or(MaestroError::NegotiationNotFound(id))?;
        if !negotiation.status.is_live() {
            return Err(MaestroError::NegotiationTimeout(id));
        }
        Ok(negotiation)
    }

    /// Add a proposal. A second proposal from the same agent replaces the
    /// first without changing its position.
    pub fn submit_proposal(&mut self, id: Uuid, proposal: Proposal) -> MaestroResult<()> {
        let negotiation = self.live_mut(id)?;
        match negotiation
            .proposals
            .iter_mut()
            .find(|p| p.agent_id == proposal.agent_id)
        {
            Some(existing) => *existing = proposal,
            None => negotiation.proposals.push(proposal),
        }
        Ok(())
    }

    /// Resolve by picking the proposal with the most tokens used. The first
    /// submitted proposal wins ties.
    pub fn resolve(&mut self, id: Uuid) -> MaestroResult<Proposal> {
        let negotiation = self.live_mut(id)?;
        let mut winner: Option<&Proposal> = None;
        for proposal in &negotiation.proposals {
            match winner {
                Some(best) if proposal.tokens_used <= best.tokens_used => {}
                _ => winner = Some(proposal),
            }
        }
        let winner = winner.cloned();
        negotiation.resolved_at = Some(Utc::now());
        match winner {
            Some(proposal) => {
                negotiation.status = NegotiationStatus::Agreed;
                negotiation.resolution = Some(proposal.clone());
                info!(negotiation_id = %id, winner = %proposal.agent_id, "Negotiation agreed");
                Ok(proposal)
            }
            None => {
                negotiation.status = NegotiationStatus::Failed;
                warn!(negotiation_id = %id, "Negotiation failed without proposals");
                Err(MaestroError::NegotiationFailed(id))
            }
        }
    }

    /// Fail a live negotiation; no-op if it already ended.
    pub fn fail(&mut self, id: Uuid) {
        if let Ok(negotiation) = self.live_mut(id) {
            negotiation.status = NegotiationStatus::Failed;
            negotiation.resolved_at = Some(Utc::now());
        }
    }

    /// Fail every live negotiation created before `now - timeout`.
    /// Returns `(negotiation_id, task_id)` for each one expired.
    pub fn expire(&mut self, now: DateTime<Utc>, timeout: chrono::Duration) -> Vec<(Uuid, TaskId)> {
        let mut expired = Vec::new();
        for id in &self.order {
            let Some(negotiation) = self.negotiations.get_mut(id) else {
                continue;
            };
            if negotiation.status.is_live() && now - negotiation.created_at > timeout {
                negotiation.status = NegotiationStatus::Failed;
                negotiation.resolved_at = Some(now);
                warn!(negotiation_id = %id, task_id = %negotiation.task_id, "Negotiation timed out");
                expired.push((*id, negotiation.task_id));
            }
        }
        expired
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn participants() -> Vec<AgentId> {
        vec!["a".into(), "b".into(), "c".into()]
    }

    #[test]
    fn test_resolve_picks_most_tokens() {
        let mut resolver = NegotiationResolver::new();
        let task = Uuid::new_v4();
        let id = resolver.open(task, "approach", participants()).unwrap();
        resolver.submit_proposal(id, Proposal::new("a", "short", 10)).unwrap();
        resolver.submit_proposal(id, Proposal::new("b", "long", 90)).unwrap();
        resolver.submit_proposal(id, Proposal::new("c", "mid", 50)).unwrap();

        let winner = resolver.resolve(id).unwrap();
        assert_eq!(winner.agent_id, "b");
        let negotiation = resolver.get(id).unwrap();
        assert_eq!(negotiation.status, NegotiationStatus::Agreed);
        assert_eq!(negotiation.resolution.as_ref().unwrap().agent_id, "b");
    }

    #[test]
    fn test_first_submitted_wins_ties() {
        let mut resolver = NegotiationResolver::new();
        let id = resolver.open(Uuid::new_v4(), "t", participants()).unwrap();
        resolver.submit_proposal(id, Proposal::new("c", "x", 40)).unwrap();
        resolver.submit_proposal(id, Proposal::new("a", "y", 40)).unwrap();
        assert_eq!(resolver.resolve(id).unwrap().agent_id, "c");
    }

    #[test]
    fn test_single_live_negotiation_per_task() {
        let mut resolver = NegotiationResolver::new();
        let task = Uuid::new_v4();
        let id = resolver.open(task, "first", participants()).unwrap();
        assert!(matches!(
            resolver.open(task, "second", participants()),
            Err(MaestroError::NegotiationInProgress(t)) if t == task
        ));

        resolver.submit_proposal(id, Proposal::new("a", "x", 1)).unwrap();
        resolver.resolve(id).unwrap();
        assert!(resolver.open(task, "again", participants()).is_ok());
        assert_eq!(resolver.for_task(task).len(), 2);
    }

    #[test]
    fn test_zero_proposals_fails() {
        let mut resolver = NegotiationResolver::new();
        let id = resolver.open(Uuid::new_v4(), "t", participants()).unwrap();
        assert!(matches!(
            resolver.resolve(id),
            Err(MaestroError::NegotiationFailed(_))
        ));
        assert_eq!(resolver.get(id).unwrap().status, NegotiationStatus::Failed);
    }

    #[test]
    fn test_duplicate_proposal_replaces() {
        let mut resolver = NegotiationResolver::new();
        let id = resolver.open(Uuid::new_v4(), "t", participants()).unwrap();
        resolver.submit_proposal(id, Proposal::new("a", "v1", 1)).unwrap();
        resolver.submit_proposal(id, Proposal::new("a", "v2", 2)).unwrap();
        let negotiation = resolver.get(id).unwrap();
        assert_eq!(negotiation.proposals.len(), 1);
        assert_eq!(negotiation.proposals[0].content, "v2");
    }

    #[test]
    fn test_expire_fails_stale_negotiations() {
        let mut resolver = NegotiationResolver::new();
        let task = Uuid::new_v4();
        let id = resolver.open(task, "t", participants()).unwrap();

        let timeout = chrono::Duration::seconds(120);
        assert!(resolver.expire(Utc::now(), timeout).is_empty());

        let later = Utc::now() + chrono::Duration::seconds(121);
        assert_eq!(resolver.expire(later, timeout), vec![(id, task)]);
        assert!(matches!(
            resolver.submit_proposal(id, Proposal::new("a", "late", 1)),
            Err(MaestroError::NegotiationTimeout(_))
        ));
    }
}
