use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use warden_core::{Action, ActionStatus, ActionType, ExecutionResult, Result, RiskLevel};

/// The persistence contract. Implementations must make
/// [`conditional_update`](ActionStore::conditional_update) atomic: the status
/// check and the write happen as one step, so at most one of several racing
/// callers observes `1`.
#[async_trait]
pub trait ActionStore: Send + Sync {
    /// Insert a new row. Fails if the id already exists.
    async fn create(&self, action: &Action) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<Action>>;

    /// Rows matching the filter, oldest `requested_at` first.
    async fn list(&self, filter: &ActionFilter) -> Result<Vec<Action>>;

    /// Set `status = new` and apply `patch`, but only if the stored status is
    /// still `expected`. Returns the number of rows affected (0 or 1).
    async fn conditional_update(
        &self,
        id: Uuid,
        expected: ActionStatus,
        new: ActionStatus,
        patch: ActionPatch,
    ) -> Result<usize>;
}

/// Which timestamp a time-range filter applies to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimeField {
    #[default]
    RequestedAt,
    ExecutedAt,
}

#[derive(Debug, Clone, Default)]
pub struct ActionFilter {
    pub status: Option<ActionStatus>,
    pub action_type: Option<ActionType>,
    pub risk_level: Option<RiskLevel>,
    /// Inclusive lower bound on `time_field`.
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `time_field`.
    pub until: Option<DateTime<Utc>>,
    pub time_field: TimeField,
    pub limit: Option<usize>,
}

impl ActionFilter {
    pub fn status(status: ActionStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Rows whose `executed_at` falls inside `[since, until)`.
    pub fn executed_between(since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        Self {
            since: Some(since),
            until: Some(until),
            time_field: TimeField::ExecutedAt,
            ..Default::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, action: &Action) -> bool {
        if self.status.is_some_and(|s| s != action.status) {
            return false;
        }
        if self.action_type.is_some_and(|t| t != action.action_type) {
            return false;
        }
        if self.risk_level.is_some_and(|r| r != action.risk_level) {
            return false;
        }
        if self.since.is_none() && self.until.is_none() {
            return true;
        }
        let ts = match self.time_field {
            TimeField::RequestedAt => Some(action.requested_at),
            TimeField::ExecutedAt => action.executed_at,
        };
        let Some(ts) = ts else {
            return false;
        };
        self.since.is_none_or(|since| ts >= since) && self.until.is_none_or(|until| ts < until)
    }
}

/// Fields written alongside a status change. `None` leaves the stored value as is.
#[derive(Debug, Clone, Default)]
pub struct ActionPatch {
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<String>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub cancelled_by: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>,
    pub execution_result: Option<ExecutionResult>,
    pub execution_time_ms: Option<u64>,
    pub checkpoint_data: Option<serde_json::Value>,
}

impl ActionPatch {
    pub fn approved(by: &str, at: DateTime<Utc>) -> Self {
        Self {
            approved_by: Some(by.to_string()),
            approved_at: Some(at),
            ..Default::default()
        }
    }

    pub fn rejected(by: &str, reason: &str, at: DateTime<Utc>) -> Self {
        Self {
            rejected_by: Some(by.to_string()),
            rejected_at: Some(at),
            rejection_reason: Some(reason.to_string()),
            ..Default::default()
        }
    }

    pub fn cancelled(by: &str, reason: &str, at: DateTime<Utc>) -> Self {
        Self {
            cancelled_by: Some(by.to_string()),
            cancelled_at: Some(at),
            cancellation_reason: Some(reason.to_string()),
            ..Default::default()
        }
    }

    pub fn claimed(at: DateTime<Utc>) -> Self {
        Self {
            claimed_at: Some(at),
            ..Default::default()
        }
    }

    pub fn checkpoint(data: serde_json::Value) -> Self {
        Self {
            checkpoint_data: Some(data),
            ..Default::default()
        }
    }

    pub fn finished(result: ExecutionResult, at: DateTime<Utc>) -> Self {
        Self {
            executed_at: Some(at),
            execution_time_ms: Some(result.duration_ms),
            execution_result: Some(result),
            ..Default::default()
        }
    }

    /// Write the populated fields onto an in-memory record.
    pub fn apply(self, action: &mut Action) {
        macro_rules! set {
            ($($field:ident),*) => {
                $(if let Some(v) = self.$field { action.$field = Some(v); })*
            };
        }
        set!(
            approved_by,
            approved_at,
            rejected_by,
            rejected_at,
            rejection_reason,
            cancelled_by,
            cancelled_at,
            cancellation_reason,
            claimed_at,
            executed_at,
            execution_result,
            execution_time_ms,
            checkpoint_data
        );
    }
}
