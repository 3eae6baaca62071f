//! # warden-autonomy
//!
//! Decides how much autonomy a proposed action gets and owns its lifecycle.
//! The [`RiskPolicyEngine`] classifies proposals, [`validation`] applies the
//! per-type rules, and the [`ActionLedger`] performs every status transition
//! as a compare-and-swap against the store.

pub mod ledger;
pub mod policy;
pub mod validation;

pub use ledger::{
    AUTO_APPROVAL_ACTOR, AUTO_EXECUTE_ACTOR, ActionLedger, EXPIRED_REASON, EXPIRY_ACTOR,
    INTERRUPTED_ERROR,
};
pub use policy::{PolicyOutcome, RiskPolicyEngine};
pub use validation::{SpecRule, validate};
