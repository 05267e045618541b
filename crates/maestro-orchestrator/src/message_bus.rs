//! Inter-agent message bus.
//!
//! Messages are processed strictly in enqueue order. `priority` is carried
//! for consumers but never reorders the queue.

use crate::state::OrchestratorState;
use crate::types::{AgentId, AgentStatus, TaskId, TaskPriority};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Sender id used for messages emitted by the orchestrator itself.
pub const ORCHESTRATOR_SENDER: &str = "orchestrator";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Request,
    Response,
    Broadcast,
    Coordination,
    Delegation,
    Status,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageTarget {
    Agent(AgentId),
    Broadcast,
}

impl MessageTarget {
    pub fn includes(&self, agent_id: &str) -> bool {
        match self {
            MessageTarget::Agent(id) => id == agent_id,
            MessageTarget::Broadcast => true,
        }
    }
}

/// A message between agents. Immutable once enqueued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    pub id: Uuid,
    pub from: AgentId,
    pub to: MessageTarget,
    pub message_type: MessageType,
    pub content: String,
    pub priority: TaskPriority,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub response_expected: bool,
    pub related_task: Option<TaskId>,
}

impl AgentMessage {
    pub fn new(
        from: impl Into<AgentId>,
        to: MessageTarget,
        message_type: MessageType,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            from: from.into(),
            to,
            message_type,
            content: content.into(),
            priority: TaskPriority::Medium,
            timestamp: Utc::now(),
            metadata: BTreeMap::new(),
            response_expected: false,
            related_task: None,
        }
    }

    pub fn to_agent(
        from: impl Into<AgentId>,
        to: impl Into<AgentId>,
        message_type: MessageType,
        content: impl Into<String>,
    ) -> Self {
        Self::new(from, MessageTarget::Agent(to.into()), message_type, content)
    }

    pub fn broadcast(
        from: impl Into<AgentId>,
        message_type: MessageType,
        content: impl Into<String>,
    ) -> Self {
        Self::new(from, MessageTarget::Broadcast, message_type, content)
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn expecting_response(mut self) -> Self {
        self.response_expected = true;
        self
    }

    pub fn about_task(mut self, task_id: TaskId) -> Self {
        self.related_task = Some(task_id);
        self
    }

    /// Collaboration id carried in metadata, if any.
    pub fn collaboration_id(&self) -> Option<Uuid> {
        self.metadata
            .get("collaboration_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
    }

    fn involves(&self, agent_id: &str) -> bool {
        self.from == agent_id || self.to.includes(agent_id)
    }
}

/// FIFO queue plus bounded per-agent inboxes and a bounded history log.
#[derive(Debug, Clone)]
pub struct MessageBus {
    queue: VecDeque<AgentMessage>,
    inboxes: HashMap<AgentId, VecDeque<AgentMessage>>,
    history: VecDeque<AgentMessage>,
    inbox_capacity: usize,
    history_capacity: usize,
}

impl MessageBus {
    pub fn new(inbox_capacity: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            inboxes: HashMap::new(),
            history: VecDeque::new(),
            inbox_capacity: inbox_capacity.max(1),
            history_capacity: inbox_capacity.max(1) * 10,
        }
    }

    pub fn enqueue(&mut self, message: AgentMessage) {
        debug!(from = %message.from, kind = ?message.message_type, "Message enqueued");
        self.queue.push_back(message);
    }

    pub fn pop(&mut self) -> Option<AgentMessage> {
        self.queue.pop_front()
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Snapshot of the undispatched queue, oldest first.
    pub fn queued(&self) -> impl Iterator<Item = &AgentMessage> {
        self.queue.iter()
    }

    pub fn deliver(&mut self, agent_id: &str, message: AgentMessage) {
        let inbox = self.inboxes.entry(agent_id.to_string()).or_default();
        if inbox.len() == self.inbox_capacity {
            inbox.pop_front();
        }
        inbox.push_back(message);
    }

    pub fn inbox(&self, agent_id: &str) -> Vec<AgentMessage> {
        self.inboxes
            .get(agent_id)
            .map(|i| i.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn record(&mut self, message: AgentMessage) {
        if self.history.len() == self.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(message);
    }

    /// Most recent dispatched messages sent by or addressed to `agent_id`,
    /// oldest first.
    pub fn recent_for(&self, agent_id: &str, limit: usize) -> Vec<AgentMessage> {
        let mut recent: Vec<AgentMessage> = self
            .history
            .iter()
            .rev()
            .filter(|m| m.involves(agent_id))
            .take(limit)
            .cloned()
            .collect();
        recent.reverse();
        recent
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(100)
    }
}

impl OrchestratorState {
    /// Drain the bus until empty, including messages enqueued while draining.
    /// Returns the number of messages dispatched.
    pub fn drain_messages(&mut self) -> usize {
        let mut dispatched = 0;
        while let Some(message) = self.bus.pop() {
            self.dispatch_message(message);
            dispatched += 1;
        }
        dispatched
    }

    fn dispatch_message(&mut self, message: AgentMessage) {
        match message.message_type {
            MessageType::Coordination => self.handle_coordination(&message),
            MessageType::Status => self.handle_status(&message),
            MessageType::Request => self.handle_request(&message),
            MessageType::Response => self.deliver_to_target(&message),
            MessageType::Delegation => self.handle_delegation(&message),
            MessageType::Broadcast => self.deliver_to_all(&message),
        }
        self.bus.record(message);
    }

    fn deliver_to_target(&mut self, message: &AgentMessage) {
        match &message.to {
            MessageTarget::Agent(id) => self.bus.deliver(id, message.clone()),
            MessageTarget::Broadcast => self.deliver_to_all(message),
        }
    }

    fn deliver_to_all(&mut self, message: &AgentMessage) {
        let ids: Vec<AgentId> = self.registry.list().iter().map(|a| a.id.clone()).collect();
        for id in ids {
            self.bus.deliver(&id, message.clone());
        }
    }

    fn handle_coordination(&mut self, message: &AgentMessage) {
        let collaboration_id = message.collaboration_id().or_else(|| {
            message
                .related_task
                .and_then(|task_id| self.collaborations.active_for_task(task_id))
                .map(|c| c.id)
        });
        let Some(collaboration_id) = collaboration_id else {
            warn!(message_id = %message.id, "Coordination message without a collaboration");
            return;
        };
        let participants = match self.collaborations.get_mut(collaboration_id) {
            Ok(collab) => {
                collab.messages.push(message.clone());
                collab.participants.clone()
            }
            Err(e) => {
                warn!(message_id = %message.id, error = %e, "Dropping coordination message");
                return;
            }
        };

        for participant in &participants {
            self.bus.deliver(participant, message.clone());
            if message.response_expected && participant != &message.from {
                let reply = AgentMessage::to_agent(
                    participant.clone(),
                    message.from.clone(),
                    MessageType::Response,
                    format!("{participant} ready for collaboration {collaboration_id}"),
                )
                .with_metadata("collaboration_id", collaboration_id.to_string());
                self.bus.enqueue(reply);
            }
        }
    }

    fn handle_status(&mut self, message: &AgentMessage) {
        let mut attached = 0;
        for collab in self.collaborations.involving_mut(&message.from) {
            collab.messages.push(message.clone());
            attached += 1;
        }
        debug!(from = %message.from, attached, "Status message attached");
        if message.to != MessageTarget::Broadcast {
            self.deliver_to_target(message);
        }
    }

    fn handle_request(&mut self, message: &AgentMessage) {
        self.deliver_to_target(message);
        if !message.response_expected {
            return;
        }
        if let MessageTarget::Agent(target) = &message.to {
            let mut reply = AgentMessage::to_agent(
                target.clone(),
                message.from.clone(),
                MessageType::Response,
                format!(
                    "Acknowledged request from {}: {}",
                    message.from, message.content
                ),
            )
            .with_priority(message.priority)
            .with_metadata("in_reply_to", message.id.to_string());
            reply.related_task = message.related_task;
            self.bus.enqueue(reply);
        }
    }

    /// Marks the target working unconditionally. An agent that is already
    /// busy has its `current_task` overwritten when the message names a task.
    fn handle_delegation(&mut self, message: &AgentMessage) {
        let MessageTarget::Agent(target) = &message.to else {
            warn!(message_id = %message.id, "Delegation needs a single target agent");
            return;
        };
        match self.registry.get_mut(target) {
            Ok(agent) => {
                if let (Some(previous), Some(next)) = (agent.current_task, message.related_task) {
                    if previous != next {
                        warn!(agent = %agent.id, %previous, %next, "Delegation overwrites current task");
                    }
                }
                agent.status = AgentStatus::Working;
                if let Some(task_id) = message.related_task {
                    agent.current_task = Some(task_id);
                }
                agent.updated_at = Utc::now();
                info!(agent = %target, from = %message.from, "Work delegated");
            }
            Err(e) => {
                warn!(error = %e, "Delegation to unknown agent");
                return;
            }
        }
        self.bus.deliver(target, message.clone());
    }
}
