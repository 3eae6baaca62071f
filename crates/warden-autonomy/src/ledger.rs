use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use warden_core::{
    Action, ActionSpec, ActionStatus, Event, EventBus, ExecutionResult, Result, WardenError,
};
use warden_store::{ActionFilter, ActionPatch, ActionStore};

use crate::policy::RiskPolicyEngine;
use crate::validation;

/// Recorded as `approved_by` when the grace period elapses.
pub const AUTO_APPROVAL_ACTOR: &str = "system:auto-approval";
/// Recorded as `approved_by` for low-risk actions run without a human.
pub const AUTO_EXECUTE_ACTOR: &str = "system:auto-execute";
/// Recorded as `cancelled_by` when a pending action outlives its TTL.
pub const EXPIRY_ACTOR: &str = "system:expiry";

pub const EXPIRED_REASON: &str = "expired";
pub const INTERRUPTED_ERROR: &str = "execution interrupted";

/// The owner of the action state machine.
///
/// ```text
/// pending  -> approved | rejected | cancelled
/// approved -> executing | cancelled
/// executing -> executed | failed
/// ```
///
/// Every transition is one conditional update on the stored status. A guard
/// failure leaves the row untouched and reports the status that was found.
#[derive(Clone)]
pub struct ActionLedger {
    store: Arc<dyn ActionStore>,
    policy: RiskPolicyEngine,
    bus: EventBus,
}

impl ActionLedger {
    pub fn new(store: Arc<dyn ActionStore>, policy: RiskPolicyEngine, bus: EventBus) -> Self {
        Self { store, policy, bus }
    }

    pub fn policy(&self) -> &RiskPolicyEngine {
        &self.policy
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    // ── Proposals ──────────────────────────────────────────────

    pub async fn create(&self, spec: ActionSpec) -> Result<Action> {
        self.create_at(spec, Utc::now()).await
    }

    /// Validate, classify and persist a new pending action.
    pub async fn create_at(&self, spec: ActionSpec, now: DateTime<Utc>) -> Result<Action> {
        validation::validate(&spec)?;
        let outcome = self.policy.evaluate(&spec, now);

        let action = Action {
            id: Uuid::new_v4(),
            action_type: spec.action_type,
            status: ActionStatus::Pending,
            risk_level: spec.risk_level,
            origin: spec.origin,
            autonomy: outcome.decision,
            command: spec.command,
            rollback_command: spec.rollback_command,
            description: spec.description,
            requested_by: spec.requested_by,
            requested_at: now,
            approved_by: None,
            approved_at: None,
            rejected_by: None,
            rejected_at: None,
            rejection_reason: None,
            cancelled_by: None,
            cancelled_at: None,
            cancellation_reason: None,
            claimed_at: None,
            executed_at: None,
            execution_result: None,
            execution_time_ms: None,
            checkpoint_data: None,
            expires_at: outcome.expires_at,
            auto_approve_after: outcome.auto_approve_after,
            requires_checkpoint: outcome.requires_checkpoint,
        };
        self.store.create(&action).await?;

        info!(
            action_id = %action.id,
            action_type = %action.action_type,
            risk = %action.risk_level,
            autonomy = %action.autonomy,
            origin = %action.origin,
            "action proposed"
        );
        self.bus.publish(Event::ActionProposed {
            action_id: action.id,
            risk_level: action.risk_level,
            description: action.description.clone(),
        });
        Ok(action)
    }

    // ── Decisions ──────────────────────────────────────────────

    pub async fn approve(&self, id: Uuid, by: &str) -> Result<Action> {
        let action = self
            .transition(
                id,
                ActionStatus::Pending,
                ActionStatus::Approved,
                ActionPatch::approved(by, Utc::now()),
                "approve",
            )
            .await?;
        info!(action_id = %id, approved_by = by, "action approved");
        self.bus.publish(Event::ActionApproved {
            action_id: id,
            approved_by: by.to_string(),
        });
        Ok(action)
    }

    pub async fn reject(&self, id: Uuid, by: &str, reason: &str) -> Result<Action> {
        let action = self
            .transition(
                id,
                ActionStatus::Pending,
                ActionStatus::Rejected,
                ActionPatch::rejected(by, reason, Utc::now()),
                "reject",
            )
            .await?;
        info!(action_id = %id, rejected_by = by, reason, "action rejected");
        self.publish_terminal(&action);
        Ok(action)
    }

    /// Cancel a pending or approved action. Fails once the action has been
    /// claimed for execution.
    pub async fn cancel(&self, id: Uuid, by: &str, reason: Option<&str>) -> Result<Action> {
        let reason = reason.unwrap_or("cancelled");
        let now = Utc::now();
        for expected in [ActionStatus::Pending, ActionStatus::Approved] {
            let affected = self
                .store
                .conditional_update(
                    id,
                    expected,
                    ActionStatus::Cancelled,
                    ActionPatch::cancelled(by, reason, now),
                )
                .await?;
            if affected == 1 {
                let action = self.get(id).await?;
                info!(action_id = %id, cancelled_by = by, from = %expected, "action cancelled");
                self.publish_terminal(&action);
                return Ok(action);
            }
        }
        Err(self.guard_error(id, "cancel").await)
    }

    // ── Time-triggered sweeps ──────────────────────────────────

    /// Approve every pending action whose grace period has elapsed.
    /// Returns the ids this call approved.
    pub async fn auto_approve_sweep(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>> {
        let pending = self.list_by_status(ActionStatus::Pending).await?;
        let mut approved = Vec::new();
        for action in pending.iter().filter(|a| a.is_auto_approvable(now)) {
            let affected = self
                .store
                .conditional_update(
                    action.id,
                    ActionStatus::Pending,
                    ActionStatus::Approved,
                    ActionPatch::approved(AUTO_APPROVAL_ACTOR, now),
                )
                .await?;
            if affected == 1 {
                info!(action_id = %action.id, risk = %action.risk_level, "action auto-approved");
                self.bus.publish(Event::ActionApproved {
                    action_id: action.id,
                    approved_by: AUTO_APPROVAL_ACTOR.into(),
                });
                approved.push(action.id);
            }
        }
        Ok(approved)
    }

    /// Cancel every pending action whose TTL has passed. Approved rows are
    /// never touched. Returns the ids this call cancelled.
    pub async fn expire_sweep(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>> {
        let pending = self.list_by_status(ActionStatus::Pending).await?;
        let mut expired = Vec::new();
        for action in pending.iter().filter(|a| a.is_expired(now)) {
            let affected = self
                .store
                .conditional_update(
                    action.id,
                    ActionStatus::Pending,
                    ActionStatus::Cancelled,
                    ActionPatch::cancelled(EXPIRY_ACTOR, EXPIRED_REASON, now),
                )
                .await?;
            if affected == 1 {
                info!(action_id = %action.id, expires_at = %action.expires_at, "action expired");
                self.bus.publish(Event::ActionTerminal {
                    action_id: action.id,
                    status: ActionStatus::Cancelled,
                    risk_level: action.risk_level,
                    timestamp: now,
                });
                expired.push(action.id);
            }
        }
        Ok(expired)
    }

    // ── Execution lifecycle ────────────────────────────────────

    /// Move an approved action to `executing`. Exactly one concurrent caller
    /// gets `true`; everyone else gets `false` and must not run anything.
    pub async fn claim(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let affected = self
            .store
            .conditional_update(
                id,
                ActionStatus::Approved,
                ActionStatus::Executing,
                ActionPatch::claimed(now),
            )
            .await?;
        debug!(action_id = %id, won = affected == 1, "claim attempted");
        Ok(affected == 1)
    }

    /// Persist a snapshot onto a claimed action.
    pub async fn record_checkpoint(&self, id: Uuid, data: serde_json::Value) -> Result<()> {
        let affected = self
            .store
            .conditional_update(
                id,
                ActionStatus::Executing,
                ActionStatus::Executing,
                ActionPatch::checkpoint(data),
            )
            .await?;
        if affected == 0 {
            return Err(self.guard_error(id, "record checkpoint for").await);
        }
        Ok(())
    }

    /// Write the terminal state of a claimed action: `executed` when the
    /// result succeeded, `failed` otherwise.
    pub async fn finalize(
        &self,
        id: Uuid,
        result: ExecutionResult,
        now: DateTime<Utc>,
    ) -> Result<Action> {
        let status = if result.success {
            ActionStatus::Executed
        } else {
            ActionStatus::Failed
        };
        let action = self
            .transition(
                id,
                ActionStatus::Executing,
                status,
                ActionPatch::finished(result, now),
                "finalize",
            )
            .await?;
        self.publish_terminal(&action);
        Ok(action)
    }

    /// Fail actions that have been `executing` for longer than `older_than`.
    /// Their worker is presumed dead. They are never re-run.
    pub async fn recover_stale_claims(
        &self,
        now: DateTime<Utc>,
        older_than: Duration,
    ) -> Result<Vec<Uuid>> {
        let Some(cutoff) = now.checked_sub_signed(older_than) else {
            return Ok(Vec::new());
        };
        let executing = self.list_by_status(ActionStatus::Executing).await?;
        let mut recovered = Vec::new();
        for action in executing {
            let claimed_at = action.claimed_at.unwrap_or(action.requested_at);
            if claimed_at > cutoff {
                continue;
            }
            let result = ExecutionResult {
                success: false,
                error: Some(INTERRUPTED_ERROR.into()),
                ..Default::default()
            };
            let affected = self
                .store
                .conditional_update(
                    action.id,
                    ActionStatus::Executing,
                    ActionStatus::Failed,
                    ActionPatch::finished(result, now),
                )
                .await?;
            if affected == 1 {
                warn!(action_id = %action.id, %claimed_at, "recovered stale claim");
                self.bus.publish(Event::ActionTerminal {
                    action_id: action.id,
                    status: ActionStatus::Failed,
                    risk_level: action.risk_level,
                    timestamp: now,
                });
                recovered.push(action.id);
            }
        }
        Ok(recovered)
    }

    // ── Queries ────────────────────────────────────────────────

    pub async fn get(&self, id: Uuid) -> Result<Action> {
        self.store
            .get(id)
            .await?
            .ok_or(WardenError::NotFound(id))
    }

    pub async fn list(&self, filter: &ActionFilter) -> Result<Vec<Action>> {
        self.store.list(filter).await
    }

    pub async fn list_by_status(&self, status: ActionStatus) -> Result<Vec<Action>> {
        self.store.list(&ActionFilter::status(status)).await
    }

    // ── Internals ──────────────────────────────────────────────

    async fn transition(
        &self,
        id: Uuid,
        expected: ActionStatus,
        new: ActionStatus,
        patch: ActionPatch,
        operation: &'static str,
    ) -> Result<Action> {
        let affected = self
            .store
            .conditional_update(id, expected, new, patch)
            .await?;
        if affected == 0 {
            return Err(self.guard_error(id, operation).await);
        }
        self.get(id).await
    }

    /// Explain why a conditional update matched nothing.
    async fn guard_error(&self, id: Uuid, operation: &'static str) -> WardenError {
        match self.store.get(id).await {
            Ok(Some(current)) => WardenError::InvalidTransition {
                id,
                from: current.status,
                operation,
            },
            Ok(None) => WardenError::NotFound(id),
            Err(e) => e,
        }
    }

    fn publish_terminal(&self, action: &Action) {
        self.bus.publish(Event::ActionTerminal {
            action_id: action.id,
            status: action.status,
            risk_level: action.risk_level,
            timestamp: Utc::now(),
        });
    }
}
