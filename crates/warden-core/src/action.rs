use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::WardenError;

/// The closed set of operation kinds an agent may propose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    CommandExecution,
    Deployment,
    ConfigurationChange,
    SystemModification,
}

impl ActionType {
    pub const ALL: [ActionType; 4] = [
        Self::CommandExecution,
        Self::Deployment,
        Self::ConfigurationChange,
        Self::SystemModification,
    ];

    /// Whether a compensating action can meaningfully undo this kind of change.
    /// Ad-hoc commands are treated as irreversible.
    pub fn is_reversible(&self) -> bool {
        !matches!(self, Self::CommandExecution)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CommandExecution => "command_execution",
            Self::Deployment => "deployment",
            Self::ConfigurationChange => "configuration_change",
            Self::SystemModification => "system_modification",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "command_execution" | "command" => Ok(Self::CommandExecution),
            "deployment" | "deploy" => Ok(Self::Deployment),
            "configuration_change" | "config" => Ok(Self::ConfigurationChange),
            "system_modification" | "system" => Ok(Self::SystemModification),
            other => Err(WardenError::Validation(format!(
                "unknown action type '{other}'"
            ))),
        }
    }
}

/// Lifecycle status of an action.
///
/// `Executing` is the claimed state: it is only entered through the claim
/// compare-and-swap and only left for `Executed` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Approved,
    Executing,
    Executed,
    Failed,
    Rejected,
    Cancelled,
}

impl ActionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Executed | Self::Failed | Self::Rejected | Self::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Executing => "executing",
            Self::Executed => "executed",
            Self::Failed => "failed",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionStatus {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "executing" => Ok(Self::Executing),
            "executed" => Ok(Self::Executed),
            "failed" => Ok(Self::Failed),
            "rejected" => Ok(Self::Rejected),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            other => Err(WardenError::Validation(format!("unknown status '{other}'"))),
        }
    }
}

/// Ordered risk category. Drives the autonomy policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(WardenError::Validation(format!(
                "unknown risk level '{other}'"
            ))),
        }
    }
}

/// The three scheduled sweep cadences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Read-only health checks, always low risk.
    Diagnostics,
    /// Fixes for conditions flagged by diagnostics.
    Remediation,
    /// Daily upkeep (updates, cleanups, rotations).
    Maintenance,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Self::Diagnostics, Self::Remediation, Self::Maintenance];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Diagnostics => "diagnostics",
            Self::Remediation => "remediation",
            Self::Maintenance => "maintenance",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "diagnostics" | "tier1" | "1" => Ok(Self::Diagnostics),
            "remediation" | "tier2" | "2" => Ok(Self::Remediation),
            "maintenance" | "proactive" | "tier3" | "3" => Ok(Self::Maintenance),
            other => Err(WardenError::Validation(format!("unknown tier '{other}'"))),
        }
    }
}

/// Where a proposal came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionOrigin {
    /// Discovered by a scheduled sweep.
    Scheduler { tier: Tier },
    /// Requested directly by the agent.
    Agent,
    /// Requested on behalf of another agent. Never auto-approved.
    Collaboration,
}

impl fmt::Display for ActionOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scheduler { tier } => write!(f, "scheduler:{tier}"),
            Self::Agent => f.write_str("agent"),
            Self::Collaboration => f.write_str("collaboration"),
        }
    }
}

impl FromStr for ActionOrigin {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some(("scheduler", tier)) => Ok(Self::Scheduler { tier: tier.parse()? }),
            None if s == "agent" => Ok(Self::Agent),
            None if s == "collaboration" => Ok(Self::Collaboration),
            _ => Err(WardenError::Validation(format!("unknown origin '{s}'"))),
        }
    }
}

/// Output of the risk policy engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutonomyDecision {
    AutoExecute,
    RequireApproval,
    RequireApprovalWithCheckpoint,
}

impl AutonomyDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoExecute => "auto_execute",
            Self::RequireApproval => "require_approval",
            Self::RequireApprovalWithCheckpoint => "require_approval_with_checkpoint",
        }
    }

    pub fn requires_approval(&self) -> bool {
        !matches!(self, Self::AutoExecute)
    }
}

impl fmt::Display for AutonomyDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AutonomyDecision {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto_execute" => Ok(Self::AutoExecute),
            "require_approval" => Ok(Self::RequireApproval),
            "require_approval_with_checkpoint" => Ok(Self::RequireApprovalWithCheckpoint),
            other => Err(WardenError::Validation(format!(
                "unknown autonomy decision '{other}'"
            ))),
        }
    }
}

/// A proposed action before it enters the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSpec {
    pub action_type: ActionType,
    pub risk_level: RiskLevel,
    pub command: String,
    #[serde(default)]
    pub rollback_command: Option<String>,
    pub description: String,
    pub requested_by: String,
    pub origin: ActionOrigin,
}

impl ActionSpec {
    pub fn new(
        action_type: ActionType,
        risk_level: RiskLevel,
        command: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            action_type,
            risk_level,
            command: command.into(),
            rollback_command: None,
            description: description.into(),
            requested_by: "agent".into(),
            origin: ActionOrigin::Agent,
        }
    }

    pub fn with_rollback(mut self, rollback: impl Into<String>) -> Self {
        self.rollback_command = Some(rollback.into());
        self
    }

    pub fn requested_by(mut self, by: impl Into<String>) -> Self {
        self.requested_by = by.into();
        self
    }

    pub fn with_origin(mut self, origin: ActionOrigin) -> Self {
        self.origin = origin;
        self
    }
}

/// Outcome of the compensating command, recorded inside [`ExecutionResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackOutcome {
    pub command: String,
    pub success: bool,
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Everything known about a finished execution. Stored as JSON on the action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    /// The original failure (non-zero exit, timeout, executor error).
    pub error: Option<String>,
    #[serde(default)]
    pub timed_out: bool,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackOutcome>,
}

/// The central ledger record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: Uuid,
    pub action_type: ActionType,
    pub status: ActionStatus,
    pub risk_level: RiskLevel,
    pub origin: ActionOrigin,
    pub autonomy: AutonomyDecision,
    pub command: String,
    pub rollback_command: Option<String>,
    pub description: String,
    pub requested_by: String,
    pub requested_at: DateTime<Utc>,

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

    pub expires_at: DateTime<Utc>,
    pub auto_approve_after: Option<DateTime<Utc>>,
    pub requires_checkpoint: bool,
}

impl Action {
    pub fn can_approve(&self) -> bool {
        self.status == ActionStatus::Pending
    }

    pub fn can_cancel(&self) -> bool {
        matches!(self.status, ActionStatus::Pending | ActionStatus::Approved)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    /// Past its grace period but not its TTL. An expired row is never
    /// approved by the system, however long the grace window was.
    pub fn is_auto_approvable(&self, now: DateTime<Utc>) -> bool {
        self.status == ActionStatus::Pending
            && self.auto_approve_after.is_some_and(|at| at <= now)
            && !self.is_expired(now)
    }

    pub fn succeeded(&self) -> bool {
        self.status == ActionStatus::Executed
    }
}
