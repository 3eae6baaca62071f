//! # warden-config
//!
//! Configuration system for the Warden engine. Reads from `warden.toml`, then
//! applies environment variable overrides.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::WardenConfig;
pub use schema::{ConfigWarning, WarningSeverity, normalize_cron};
