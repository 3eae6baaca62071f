use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

use warden_autonomy::ActionLedger;
use warden_config::schema::ExecutionConfig;
use warden_core::{
    Action, ActionStatus, CheckpointProvider, CommandOutput, ExecutionResult, Executor, Result,
    RollbackOutcome, WardenError,
};

/// What one `execute` call did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Execution {
    /// This caller won the claim and drove the action to a terminal status.
    Finished(ExecutionOutcome),
    /// Another caller owns the action. Nothing was run.
    NotClaimed { action_id: Uuid },
}

impl Execution {
    pub fn outcome(&self) -> Option<&ExecutionOutcome> {
        match self {
            Self::Finished(outcome) => Some(outcome),
            Self::NotClaimed { .. } => None,
        }
    }

    pub fn is_claimed(&self) -> bool {
        matches!(self, Self::Finished(_))
    }
}

/// The terminal state written by the coordinator, returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub action_id: Uuid,
    pub status: ActionStatus,
    pub result: ExecutionResult,
}

impl ExecutionOutcome {
    pub fn success(&self) -> bool {
        self.result.success
    }

    pub fn error(&self) -> Option<&str> {
        self.result.error.as_deref()
    }
}

/// Claims approved actions and runs them, at most once each.
#[derive(Clone)]
pub struct ExecutionCoordinator {
    ledger: ActionLedger,
    executor: Arc<dyn Executor>,
    checkpoint: Arc<dyn CheckpointProvider>,
    config: ExecutionConfig,
}

impl ExecutionCoordinator {
    pub fn new(
        ledger: ActionLedger,
        executor: Arc<dyn Executor>,
        checkpoint: Arc<dyn CheckpointProvider>,
        config: ExecutionConfig,
    ) -> Self {
        Self {
            ledger,
            executor,
            checkpoint,
            config,
        }
    }

    pub fn ledger(&self) -> &ActionLedger {
        &self.ledger
    }

    /// Claim-then-run.
    ///
    /// The action must exist and be approved. A caller that loses the claim
    /// (or arrives after another caller already claimed it) gets
    /// [`Execution::NotClaimed`] and causes no side effect.
    pub async fn execute(&self, id: Uuid) -> Result<Execution> {
        let action = self.ledger.get(id).await?;
        match action.status {
            ActionStatus::Approved => {}
            ActionStatus::Executing | ActionStatus::Executed | ActionStatus::Failed => {
                return Ok(Execution::NotClaimed { action_id: id });
            }
            from => {
                return Err(WardenError::InvalidTransition {
                    id,
                    from,
                    operation: "execute",
                });
            }
        }

        if !self.ledger.claim(id, Utc::now()).await? {
            info!(action_id = %id, "action already claimed, skipping");
            return Ok(Execution::NotClaimed { action_id: id });
        }

        let result = self.run_claimed(&action).await;
        let finished = self.ledger.finalize(id, result, Utc::now()).await?;

        if finished.status == ActionStatus::Executed {
            info!(action_id = %id, duration_ms = ?finished.execution_time_ms, "action executed");
        } else {
            warn!(
                action_id = %id,
                error = finished
                    .execution_result
                    .as_ref()
                    .and_then(|r| r.error.as_deref())
                    .unwrap_or("unknown"),
                "action failed"
            );
        }

        Ok(Execution::Finished(ExecutionOutcome {
            action_id: id,
            status: finished.status,
            result: finished.execution_result.unwrap_or_default(),
        }))
    }

    /// Everything between a won claim and the terminal write. Never errors:
    /// every failure becomes part of the returned result.
    async fn run_claimed(&self, action: &Action) -> ExecutionResult {
        if action.requires_checkpoint {
            if let Err(e) = self.capture_checkpoint(action).await {
                error!(action_id = %action.id, error = %e, "checkpoint failed, not running command");
                return ExecutionResult {
                    success: false,
                    error: Some(e.to_string()),
                    ..Default::default()
                };
            }
        }

        let timeout = self.config.timeout_for(action.action_type);
        let run = self.run_command(&action.command, timeout).await;

        let mut result = ExecutionResult {
            success: run.error.is_none(),
            exit_code: run.output.as_ref().map(|o| o.exit_code),
            stdout: run.output.as_ref().map(|o| o.stdout.clone()).unwrap_or_default(),
            stderr: run.output.as_ref().map(|o| o.stderr.clone()).unwrap_or_default(),
            error: run.error,
            timed_out: run.timed_out,
            duration_ms: run.duration_ms,
            rollback: None,
        };

        if !result.success {
            if let Some(ref rollback) = action.rollback_command {
                result.rollback = Some(self.rollback(action.id, rollback, timeout).await);
            }
        }
        result
    }

    async fn capture_checkpoint(&self, action: &Action) -> Result<()> {
        let snapshot = self
            .checkpoint
            .capture(action)
            .await
            .map_err(|e| match e {
                WardenError::Checkpoint(_) => e,
                other => WardenError::Checkpoint(other.to_string()),
            })?;
        self.ledger.record_checkpoint(action.id, snapshot).await?;
        info!(action_id = %action.id, "checkpoint recorded");
        Ok(())
    }

    /// Compensate once. The outcome is recorded whether or not it worked.
    async fn rollback(&self, id: Uuid, command: &str, timeout: Duration) -> RollbackOutcome {
        warn!(action_id = %id, rollback = command, "running rollback");
        let run = self.run_command(command, timeout).await;
        if let Some(ref e) = run.error {
            error!(action_id = %id, error = %e, "rollback failed");
        }
        RollbackOutcome {
            command: command.to_string(),
            success: run.error.is_none(),
            exit_code: run.output.as_ref().map(|o| o.exit_code),
            stdout: run.output.as_ref().map(|o| o.stdout.clone()).unwrap_or_default(),
            stderr: run.output.as_ref().map(|o| o.stderr.clone()).unwrap_or_default(),
            error: run.error,
            duration_ms: run.duration_ms,
        }
    }

    async fn run_command(&self, command: &str, timeout: Duration) -> CommandRun {
        let started = Instant::now();
        let attempt = tokio::time::timeout(timeout, self.executor.run(command, timeout)).await;
        let elapsed = started.elapsed().as_millis() as u64;

        match attempt {
            Ok(Ok(output)) if output.success() => CommandRun {
                duration_ms: output.duration_ms.max(elapsed),
                output: Some(output),
                error: None,
                timed_out: false,
            },
            Ok(Ok(output)) => CommandRun {
                duration_ms: output.duration_ms.max(elapsed),
                error: Some(format!("command exited with status {}", output.exit_code)),
                output: Some(output),
                timed_out: false,
            },
            Ok(Err(WardenError::Timeout { secs })) => CommandRun::timed_out(secs, elapsed),
            Err(_) => CommandRun::timed_out(timeout.as_secs(), elapsed),
            Ok(Err(e)) => CommandRun {
                output: None,
                error: Some(e.to_string()),
                timed_out: false,
                duration_ms: elapsed,
            },
        }
    }
}

struct CommandRun {
    output: Option<CommandOutput>,
    error: Option<String>,
    timed_out: bool,
    duration_ms: u64,
}

impl CommandRun {
    fn timed_out(secs: u64, elapsed: u64) -> Self {
        Self {
            output: None,
            error: Some(WardenError::Timeout { secs }.to_string()),
            timed_out: true,
            duration_ms: elapsed,
        }
    }
}
