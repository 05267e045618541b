use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing and capacity knobs for an [`Orchestrator`](crate::Orchestrator).
///
/// Every field has a default so a partial `[orchestrator]` table in
/// `maestro.toml` is enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Period of the queue-drain loop.
    #[serde(default = "default_queue_tick_ms")]
    pub queue_tick_ms: u64,
    /// Period of the message-drain loop.
    #[serde(default = "default_message_tick_ms")]
    pub message_tick_ms: u64,
    /// Period of the maintenance sweep.
    #[serde(default = "default_maintenance_interval_secs")]
    pub maintenance_interval_secs: u64,
    /// Age after which an in-progress collaboration is failed by the sweep.
    #[serde(default = "default_collaboration_timeout_secs")]
    pub collaboration_timeout_secs: u64,
    /// Age after which a live negotiation is failed by the sweep.
    #[serde(default = "default_negotiation_timeout_secs")]
    pub negotiation_timeout_secs: u64,
    /// Pause between queue items within one drain.
    #[serde(default = "default_inter_task_delay_ms")]
    pub inter_task_delay_ms: u64,
    /// Messages returned by `get_agent_status`.
    #[serde(default = "default_recent_message_limit")]
    pub recent_message_limit: usize,
    /// Per-agent inbox bound; oldest messages are dropped first.
    #[serde(default = "default_inbox_capacity")]
    pub inbox_capacity: usize,
    /// Collaborations kept per agent by the learning pass.
    #[serde(default = "default_collaboration_history_limit")]
    pub collaboration_history_limit: usize,
}

fn default_queue_tick_ms() -> u64 {
    1000
}

fn default_message_tick_ms() -> u64 {
    1000
}

fn default_maintenance_interval_secs() -> u64 {
    300
}

fn default_collaboration_timeout_secs() -> u64 {
    300
}

fn default_negotiation_timeout_secs() -> u64 {
    120
}

fn default_inter_task_delay_ms() -> u64 {
    100
}

fn default_recent_message_limit() -> usize {
    20
}

fn default_inbox_capacity() -> usize {
    100
}

fn default_collaboration_history_limit() -> usize {
    50
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            queue_tick_ms: default_queue_tick_ms(),
            message_tick_ms: default_message_tick_ms(),
            maintenance_interval_secs: default_maintenance_interval_secs(),
            collaboration_timeout_secs: default_collaboration_timeout_secs(),
            negotiation_timeout_secs: default_negotiation_timeout_secs(),
            inter_task_delay_ms: default_inter_task_delay_ms(),
            recent_message_limit: default_recent_message_limit(),
            inbox_capacity: default_inbox_capacity(),
            collaboration_history_limit: default_collaboration_history_limit(),
        }
    }
}

impl OrchestratorConfig {
    pub fn queue_tick(&self) -> Duration {
        Duration::from_millis(self.queue_tick_ms)
    }

    pub fn message_tick(&self) -> Duration {
        Duration::from_millis(self.message_tick_ms)
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs)
    }

    pub fn inter_task_delay(&self) -> Duration {
        Duration::from_millis(self.inter_task_delay_ms)
    }

    pub fn collaboration_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.collaboration_timeout_secs).unwrap_or(i64::MAX))
    }

    pub fn negotiation_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.negotiation_timeout_secs).unwrap_or(i64::MAX))
    }

    /// Config with no inter-task delay, for deterministic tests.
    pub fn immediate() -> Self {
        Self {
            inter_task_delay_ms: 0,
            ..Self::default()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.queue_tick_ms, 1000);
        assert_eq!(config.collaboration_timeout_secs, 300);
        assert_eq!(config.negotiation_timeout_secs, 120);
        assert_eq!(config.inter_task_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_partial_table_fills_defaults() {
        let config: OrchestratorConfig =
            serde_json::from_str(r#"{"collaboration_timeout_secs": 5}"#).unwrap();
        assert_eq!(config.collaboration_timeout_secs, 5);
        assert_eq!(config.inbox_capacity, 100);
        assert_eq!(config.collaboration_timeout(), chrono::Duration::seconds(5));
    }
}
