//! # warden-store
//!
//! The persistence contract consumed by the action ledger, and two
//! implementations of it:
//!
//! - [`MemoryStore`]: a mutex-guarded map, used by tests and one-shot runs.
//! - [`SqliteStore`]: a durable SQLite database with an append-only audit log.
//!
//! Every state change goes through [`ActionStore::conditional_update`], a
//! compare-and-swap on the stored status that reports how many rows it touched.

pub mod contract;
pub mod memory;
pub mod sqlite;

pub use contract::{ActionFilter, ActionPatch, ActionStore, TimeField};
pub use memory::MemoryStore;
pub use sqlite::{AuditEntry, SqliteStore};
