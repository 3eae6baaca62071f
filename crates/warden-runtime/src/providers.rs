use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use warden_config::schema::{CandidateConfig, TierConfig};
use warden_core::{
    Action, ActionOrigin, ActionSpec, CandidateProvider, CheckpointProvider, Discovery, Executor,
    Result, TierContext, WardenError,
};

/// Candidates declared statically in `warden.toml` for one tier.
pub struct ConfiguredCandidates {
    name: String,
    candidates: Vec<CandidateConfig>,
}

impl ConfiguredCandidates {
    pub fn new(name: impl Into<String>, candidates: Vec<CandidateConfig>) -> Self {
        Self {
            name: name.into(),
            candidates,
        }
    }

    pub fn from_tier(name: impl Into<String>, tier: &TierConfig) -> Self {
        Self::new(name, tier.candidates.clone())
    }
}

#[async_trait]
impl CandidateProvider for ConfiguredCandidates {
    fn name(&self) -> &str {
        &self.name
    }

    async fn discover(&self, ctx: &TierContext) -> Result<Discovery> {
        let candidates = self
            .candidates
            .iter()
            .map(|c| {
                let mut spec =
                    ActionSpec::new(c.action_type, c.risk_level, &c.command, &c.description)
                        .requested_by(format!("scheduler:{}", ctx.tier))
                        .with_origin(ActionOrigin::Scheduler { tier: ctx.tier });
                if let Some(ref rollback) = c.rollback_command {
                    spec = spec.with_rollback(rollback);
                }
                spec
            })
            .collect();
        Ok(Discovery::new(candidates))
    }

    fn flags_on_failure(&self, spec: &ActionSpec) -> bool {
        self.candidates
            .iter()
            .find(|c| c.command == spec.command)
            .is_none_or(|c| c.flag_on_failure)
    }
}

/// Records the action context and, when configured, the output of a
/// snapshot command run through the executor.
pub struct SnapshotCheckpoint {
    executor: Option<Arc<dyn Executor>>,
    command: Option<String>,
    timeout: Duration,
}

impl Default for SnapshotCheckpoint {
    fn default() -> Self {
        Self::context_only()
    }
}

impl SnapshotCheckpoint {
    /// Snapshot nothing but the action itself.
    pub fn context_only() -> Self {
        Self {
            executor: None,
            command: None,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_command(
        executor: Arc<dyn Executor>,
        command: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            executor: Some(executor),
            command: Some(command.into()),
            timeout,
        }
    }
}

#[async_trait]
impl CheckpointProvider for SnapshotCheckpoint {
    async fn capture(&self, action: &Action) -> Result<serde_json::Value> {
        let mut snapshot = json!({
            "captured_at": Utc::now(),
            "action_id": action.id,
            "action_type": action.action_type,
            "command": action.command,
            "rollback_command": action.rollback_command,
        });

        if let (Some(executor), Some(command)) = (&self.executor, &self.command) {
            let output = executor.run(command, self.timeout).await?;
            if !output.success() {
                return Err(WardenError::Checkpoint(format!(
                    "snapshot command exited with status {}: {}",
                    output.exit_code,
                    output.stderr.trim()
                )));
            }
            snapshot["snapshot_command"] = json!(command);
            snapshot["snapshot"] = json!(output.stdout);
        }
        Ok(snapshot)
    }
}
