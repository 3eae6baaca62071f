use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::action::{Action, ActionSpec, Tier};

/// Captures a snapshot before a risky, reversible action runs.
#[async_trait]
pub trait CheckpointProvider: Send + Sync {
    async fn capture(&self, action: &Action) -> crate::Result<serde_json::Value>;
}

/// What a candidate provider knows when a sweep asks it for work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierContext {
    pub tier: Tier,
    pub fired_at: DateTime<Utc>,
    /// Conditions flagged by the most recent diagnostics sweep.
    #[serde(default)]
    pub flagged_conditions: Vec<String>,
}

/// Proposed actions for one sweep, plus any conditions the provider noticed
/// while discovering them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Discovery {
    pub candidates: Vec<ActionSpec>,
    #[serde(default)]
    pub findings: Vec<String>,
}

impl Discovery {
    pub fn new(candidates: Vec<ActionSpec>) -> Self {
        Self {
            candidates,
            findings: Vec::new(),
        }
    }
}

/// Enumerates proposed actions for a tier. Errors are treated as
/// infrastructure failures and retried at the sweep level.
#[async_trait]
pub trait CandidateProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn discover(&self, ctx: &TierContext) -> crate::Result<Discovery>;

    /// Whether a failed run of this candidate counts as a flagged condition.
    fn flags_on_failure(&self, _spec: &ActionSpec) -> bool {
        true
    }
}
