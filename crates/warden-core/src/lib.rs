//! # warden-core
//!
//! Core types, traits, and primitives for the Warden action governance engine.
//! This crate defines the shared vocabulary used by every other crate in the workspace:
//! the [`Action`] record and its enums, the unified error type, the event bus,
//! and the collaborator traits (executor, checkpoint and candidate providers).

pub mod action;
pub mod error;
pub mod event;
pub mod executor;
pub mod provider;

pub use action::{
    Action, ActionOrigin, ActionSpec, ActionStatus, ActionType, AutonomyDecision,
    ExecutionResult, RiskLevel, RollbackOutcome, Tier,
};
pub use error::{ErrorClass, Result, WardenError};
pub use event::{Event, EventBus};
pub use executor::{CommandOutput, Executor};
pub use provider::{CandidateProvider, CheckpointProvider, Discovery, TierContext};
