//! # warden-runtime
//!
//! Runs the engine: the [`ExecutionCoordinator`] claims and executes
//! approved actions, the [`TieredScheduler`] drives the diagnostics,
//! remediation and maintenance sweeps, and the [`MetricsAggregator`] reads
//! execution history back out. [`Governance`] wires them together behind
//! one query and command surface.

pub mod audit;
pub mod coordinator;
pub mod metrics;
pub mod mock;
pub mod providers;
pub mod retry;
pub mod scheduler;
pub mod service;
pub mod shell;

pub use audit::{AuditRecorder, AuditSession};
pub use coordinator::{Execution, ExecutionCoordinator, ExecutionOutcome};
pub use metrics::{HourlyBucket, MetricsAggregator, MetricsReport, TypeFailures};
pub use providers::{ConfiguredCandidates, SnapshotCheckpoint};
pub use retry::{RetryExhausted, RetryPolicy};
pub use scheduler::{
    ActionOutcome, Housekeeping, OutcomeKind, SchedulerOptions, SweepReport, TierRegistration,
    TieredScheduler,
};
pub use service::{Components, Governance};
pub use shell::ShellExecutor;
