use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::sync::Arc;
use tokio::sync::broadcast;

use crate::action::{ActionStatus, RiskLevel, Tier};

/// Events emitted by the engine for external alerting and audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    // ── Action lifecycle ───────────────────────────────────────
    ActionProposed {
        action_id: Uuid,
        risk_level: RiskLevel,
        description: String,
    },
    ActionApproved {
        action_id: Uuid,
        approved_by: String,
    },
    /// Emitted after every transition into a terminal status.
    ActionTerminal {
        action_id: Uuid,
        status: ActionStatus,
        risk_level: RiskLevel,
        timestamp: DateTime<Utc>,
    },

    // ── Sweep lifecycle ────────────────────────────────────────
    SweepCompleted {
        tier: Tier,
        total: usize,
        successful: usize,
        failed: usize,
    },
    SweepFailed {
        tier: Tier,
        attempts: u32,
        error: String,
    },

    // ── System ─────────────────────────────────────────────────
    Heartbeat {
        timestamp: DateTime<Utc>,
    },
    Shutdown,
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ActionProposed { .. } => "action_proposed",
            Self::ActionApproved { .. } => "action_approved",
            Self::ActionTerminal { .. } => "action_terminal",
            Self::SweepCompleted { .. } => "sweep_completed",
            Self::SweepFailed { .. } => "sweep_failed",
            Self::Heartbeat { .. } => "heartbeat",
            Self::Shutdown => "shutdown",
        }
    }

    pub fn action_id(&self) -> Option<Uuid> {
        match self {
            Self::ActionProposed { action_id, .. }
            | Self::ActionApproved { action_id, .. }
            | Self::ActionTerminal { action_id, .. } => Some(*action_id),
            _ => None,
        }
    }
}

/// A broadcast-based event bus. Publishing never blocks the publisher.
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<Event>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn publish(&self, event: Event) {
        // Ignore send errors (no subscribers).
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(4096)
    }
}
