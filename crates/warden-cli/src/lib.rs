//! # warden-cli
//!
//! Command-line interface for the Warden action governance engine.
//!
//! ## Commands
//!
//! - `warden start`: run the tiered scheduler until Ctrl-C
//! - `warden sweep <tier>`: run one sweep now
//! - `warden propose`: record a proposal (low risk runs immediately)
//! - `warden list` / `warden show`: inspect the ledger
//! - `warden approve` / `reject` / `cancel`: decide on pending actions
//! - `warden metrics`: success rate and failures over a window
//! - `warden logs`: recent audit log entries
//! - `warden config` / `warden init`: inspect or create configuration

pub mod commands;

pub use commands::Cli;
