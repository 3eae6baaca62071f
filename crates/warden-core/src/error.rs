use thiserror::Error;
use uuid::Uuid;

use crate::action::ActionStatus;

/// Unified error type for the entire Warden engine.
#[derive(Error, Debug)]
pub enum WardenError {
    // ── Guard violations ───────────────────────────────────────
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid transition for action {id}: cannot {operation} from status {from}")]
    InvalidTransition {
        id: Uuid,
        from: ActionStatus,
        operation: &'static str,
    },

    #[error("action not found: {0}")]
    NotFound(Uuid),

    // ── Action-level execution errors ──────────────────────────
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    #[error("command timed out after {secs}s")]
    Timeout { secs: u64 },

    // ── Infrastructure errors ──────────────────────────────────
    #[error("store error: {0}")]
    Store(String),

    #[error("executor error: {0}")]
    Executor(String),

    #[error("checkpoint capture failed: {0}")]
    Checkpoint(String),

    #[error("candidate provider unavailable: {tier}: {reason}")]
    CandidateProvider { tier: String, reason: String },

    #[error("scheduler error: {0}")]
    Scheduler(String),

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    #[error("config validation failed: {field}: {reason}")]
    ConfigValidation { field: String, reason: String },

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// The three handling classes. Only infrastructure errors are ever retried,
/// and only at the sweep boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Infrastructure,
    ActionLevel,
    Guard,
}

impl WardenError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Validation(_)
            | Self::InvalidTransition { .. }
            | Self::NotFound(_)
            | Self::Config(_)
            | Self::ConfigValidation { .. } => ErrorClass::Guard,
            Self::ExecutionFailed(_) | Self::Timeout { .. } => ErrorClass::ActionLevel,
            Self::Store(_)
            | Self::Executor(_)
            | Self::Checkpoint(_)
            | Self::CandidateProvider { .. }
            | Self::Scheduler(_)
            | Self::Io(_)
            | Self::Serialization(_)
            | Self::Other(_) => ErrorClass::Infrastructure,
        }
    }

    pub fn is_infrastructure(&self) -> bool {
        self.class() == ErrorClass::Infrastructure
    }
}

pub type Result<T> = std::result::Result<T, WardenError>;
