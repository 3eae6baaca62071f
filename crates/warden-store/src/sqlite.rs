use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, types::Type};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::contract::{ActionFilter, ActionPatch, ActionStore, TimeField};
use warden_core::{Action, ActionStatus, Result, WardenError};

const COLUMNS: &str = "id, action_type, status, risk_level, origin, autonomy, command, \
    rollback_command, description, requested_by, requested_at, approved_by, approved_at, \
    rejected_by, rejected_at, rejection_reason, cancelled_by, cancelled_at, \
    cancellation_reason, claimed_at, executed_at, execution_result, execution_time_ms, \
    checkpoint_data, expires_at, auto_approve_after, requires_checkpoint";

/// Durable action ledger backed by SQLite.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Mutex<Connection>>,
}

/// One row of the append-only audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: String,
    pub event_type: String,
    pub action_id: Option<String>,
    pub details: Option<String>,
    pub checksum: String,
}

impl SqliteStore {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        info!(?path, "opening action store");

        let conn = Connection::open(path).map_err(store_err)?;

        // Enable WAL mode for concurrent reads
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(store_err)?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS actions (
                id TEXT PRIMARY KEY,
                action_type TEXT NOT NULL,
                status TEXT NOT NULL,
                risk_level TEXT NOT NULL,
                origin TEXT NOT NULL,
                autonomy TEXT NOT NULL,
                command TEXT NOT NULL,
                rollback_command TEXT,
                description TEXT NOT NULL,
                requested_by TEXT NOT NULL,
                requested_at TEXT NOT NULL,
                approved_by TEXT,
                approved_at TEXT,
                rejected_by TEXT,
                rejected_at TEXT,
                rejection_reason TEXT,
                cancelled_by TEXT,
                cancelled_at TEXT,
                cancellation_reason TEXT,
                claimed_at TEXT,
                executed_at TEXT,
                execution_result TEXT,
                execution_time_ms INTEGER,
                checkpoint_data TEXT,
                expires_at TEXT NOT NULL,
                auto_approve_after TEXT,
                requires_checkpoint INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_type TEXT NOT NULL,
                action_id TEXT,
                details TEXT,
                checksum TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_actions_status ON actions(status);
            CREATE INDEX IF NOT EXISTS idx_actions_requested ON actions(requested_at);
            CREATE INDEX IF NOT EXISTS idx_actions_executed ON actions(executed_at);
            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            ",
        )
        .map_err(store_err)?;

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for tests).
    pub fn open_in_memory() -> Result<Self> {
        Self::open(Path::new(":memory:"))
    }

    /// Append an audit entry. Each checksum covers the previous one, so
    /// editing or deleting a row breaks every checksum after it.
    pub fn audit(
        &self,
        event_type: &str,
        action_id: Option<Uuid>,
        details: Option<&str>,
    ) -> Result<()> {
        let timestamp = fmt_ts(Utc::now());
        let action_id = action_id.map(|id| id.to_string());

        let db = self.db.lock();
        let prev: String = db
            .query_row(
                "SELECT checksum FROM audit_log ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(store_err)?
            .unwrap_or_default();
        let checksum = chain_checksum(
            &prev,
            &timestamp,
            event_type,
            action_id.as_deref(),
            details,
        );
        db.execute(
            "INSERT INTO audit_log (timestamp, event_type, action_id, details, checksum) VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![timestamp, event_type, action_id, details, checksum],
        )
        .map_err(store_err)?;
        Ok(())
    }

    /// Most recent audit entries, newest first.
    pub fn audit_log(&self, limit: usize, event_type: Option<&str>) -> Result<Vec<AuditEntry>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare(
                "SELECT id, timestamp, event_type, action_id, details, checksum FROM audit_log
                 WHERE (?1 IS NULL OR event_type = ?1)
                 ORDER BY id DESC LIMIT ?2",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map(rusqlite::params![event_type, limit as i64], |row| {
                Ok(AuditEntry {
                    id: row.get(0)?,
                    timestamp: row.get(1)?,
                    event_type: row.get(2)?,
                    action_id: row.get(3)?,
                    details: row.get(4)?,
                    checksum: row.get(5)?,
                })
            })
            .map_err(store_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(store_err)?;
        Ok(rows)
    }

    /// Recompute the checksum chain. Returns the id of the first broken entry.
    pub fn verify_audit_chain(&self) -> Result<Option<i64>> {
        let mut entries = self.audit_log(usize::MAX >> 1, None)?;
        entries.reverse();
        let mut prev = String::new();
        for entry in entries {
            let expected = chain_checksum(
                &prev,
                &entry.timestamp,
                &entry.event_type,
                entry.action_id.as_deref(),
                entry.details.as_deref(),
            );
            if expected != entry.checksum {
                return Ok(Some(entry.id));
            }
            prev = entry.checksum;
        }
        Ok(None)
    }

    #[cfg(test)]
    pub(crate) fn raw(&self) -> parking_lot::MutexGuard<'_, Connection> {
        self.db.lock()
    }
}

#[async_trait]
impl ActionStore for SqliteStore {
    async fn create(&self, action: &Action) -> Result<()> {
        let result_json = action
            .execution_result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let checkpoint_json = action
            .checkpoint_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let db = self.db.lock();
        db.execute(
            &format!(
                "INSERT INTO actions ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, \
                 ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27)"
            ),
            rusqlite::params![
                action.id.to_string(),
                action.action_type.as_str(),
                action.status.as_str(),
                action.risk_level.as_str(),
                action.origin.to_string(),
                action.autonomy.as_str(),
                action.command,
                action.rollback_command,
                action.description,
                action.requested_by,
                fmt_ts(action.requested_at),
                action.approved_by,
                action.approved_at.map(fmt_ts),
                action.rejected_by,
                action.rejected_at.map(fmt_ts),
                action.rejection_reason,
                action.cancelled_by,
                action.cancelled_at.map(fmt_ts),
                action.cancellation_reason,
                action.claimed_at.map(fmt_ts),
                action.executed_at.map(fmt_ts),
                result_json,
                action.execution_time_ms.map(|ms| ms as i64),
                checkpoint_json,
                fmt_ts(action.expires_at),
                action.auto_approve_after.map(fmt_ts),
                action.requires_checkpoint,
            ],
        )
        .map_err(store_err)?;
        debug!(action_id = %action.id, "inserted action row");
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Action>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare(&format!("SELECT {COLUMNS} FROM actions WHERE id = ?1"))
            .map_err(store_err)?;
        let mut rows = stmt
            .query_map(rusqlite::params![id.to_string()], row_to_action)
            .map_err(store_err)?;
        rows.next().transpose().map_err(store_err)
    }

    async fn list(&self, filter: &ActionFilter) -> Result<Vec<Action>> {
        let mut clauses: Vec<String> = Vec::new();
        let mut params: Vec<String> = Vec::new();

        let mut push = |clause: &str, value: String| {
            params.push(value);
            clauses.push(format!("{clause} ?{}", params.len()));
        };
        if let Some(status) = filter.status {
            push("status =", status.as_str().to_string());
        }
        if let Some(action_type) = filter.action_type {
            push("action_type =", action_type.as_str().to_string());
        }
        if let Some(risk) = filter.risk_level {
            push("risk_level =", risk.as_str().to_string());
        }
        let time_column = match filter.time_field {
            TimeField::RequestedAt => "requested_at",
            TimeField::ExecutedAt => "executed_at",
        };
        if let Some(since) = filter.since {
            push(&format!("{time_column} >="), fmt_ts(since));
        }
        if let Some(until) = filter.until {
            push(&format!("{time_column} <"), fmt_ts(until));
        }

        let mut sql = format!("SELECT {COLUMNS} FROM actions");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY requested_at ASC");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let db = self.db.lock();
        let mut stmt = db.prepare(&sql).map_err(store_err)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(params.iter()), row_to_action)
            .map_err(store_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(store_err)?;
        Ok(rows)
    }

    async fn conditional_update(
        &self,
        id: Uuid,
        expected: ActionStatus,
        new: ActionStatus,
        patch: ActionPatch,
    ) -> Result<usize> {
        let result_json = patch
            .execution_result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let checkpoint_json = patch
            .checkpoint_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let db = self.db.lock();
        let affected = db
            .execute(
                "UPDATE actions SET
                    status = ?3,
                    approved_by = COALESCE(?4, approved_by),
                    approved_at = COALESCE(?5, approved_at),
                    rejected_by = COALESCE(?6, rejected_by),
                    rejected_at = COALESCE(?7, rejected_at),
                    rejection_reason = COALESCE(?8, rejection_reason),
                    cancelled_by = COALESCE(?9, cancelled_by),
                    cancelled_at = COALESCE(?10, cancelled_at),
                    cancellation_reason = COALESCE(?11, cancellation_reason),
                    claimed_at = COALESCE(?12, claimed_at),
                    executed_at = COALESCE(?13, executed_at),
                    execution_result = COALESCE(?14, execution_result),
                    execution_time_ms = COALESCE(?15, execution_time_ms),
                    checkpoint_data = COALESCE(?16, checkpoint_data)
                 WHERE id = ?1 AND status = ?2",
                rusqlite::params![
                    id.to_string(),
                    expected.as_str(),
                    new.as_str(),
                    patch.approved_by,
                    patch.approved_at.map(fmt_ts),
                    patch.rejected_by,
                    patch.rejected_at.map(fmt_ts),
                    patch.rejection_reason,
                    patch.cancelled_by,
                    patch.cancelled_at.map(fmt_ts),
                    patch.cancellation_reason,
                    patch.claimed_at.map(fmt_ts),
                    patch.executed_at.map(fmt_ts),
                    result_json,
                    patch.execution_time_ms.map(|ms| ms as i64),
                    checkpoint_json,
                ],
            )
            .map_err(store_err)?;
        Ok(affected)
    }
}

fn store_err(e: rusqlite::Error) -> WardenError {
    WardenError::Store(e.to_string())
}

/// Fixed-width RFC 3339 so that string comparison in SQL orders correctly.
fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn chain_checksum(
    prev: &str,
    timestamp: &str,
    event_type: &str,
    action_id: Option<&str>,
    details: Option<&str>,
) -> String {
    let mut hasher = blake3::Hasher::new();
    for part in [
        prev,
        timestamp,
        event_type,
        action_id.unwrap_or(""),
        details.unwrap_or(""),
    ] {
        hasher.update(part.as_bytes());
        hasher.update(b"\x1f");
    }
    hasher.finalize().to_hex().to_string()
}

fn conversion_err(idx: usize, e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn parsed<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = WardenError>,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_err(idx, e))
}

fn ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}

fn opt_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| conversion_err(idx, e))
    })
    .transpose()
}

fn opt_json<T: serde::de::DeserializeOwned>(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<T>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| serde_json::from_str(&s).map_err(|e| conversion_err(idx, e)))
        .transpose()
}

fn row_to_action(row: &Row<'_>) -> rusqlite::Result<Action> {
    let id: String = row.get(0)?;
    Ok(Action {
        id: Uuid::parse_str(&id).map_err(|e| conversion_err(0, e))?,
        action_type: parsed(row, 1)?,
        status: parsed(row, 2)?,
        risk_level: parsed(row, 3)?,
        origin: parsed(row, 4)?,
        autonomy: parsed(row, 5)?,
        command: row.get(6)?,
        rollback_command: row.get(7)?,
        description: row.get(8)?,
        requested_by: row.get(9)?,
        requested_at: ts(row, 10)?,
        approved_by: row.get(11)?,
        approved_at: opt_ts(row, 12)?,
        rejected_by: row.get(13)?,
        rejected_at: opt_ts(row, 14)?,
        rejection_reason: row.get(15)?,
        cancelled_by: row.get(16)?,
        cancelled_at: opt_ts(row, 17)?,
        cancellation_reason: row.get(18)?,
        claimed_at: opt_ts(row, 19)?,
        executed_at: opt_ts(row, 20)?,
        execution_result: opt_json(row, 21)?,
        execution_time_ms: row.get::<_, Option<i64>>(22)?.map(|ms| ms.max(0) as u64),
        checkpoint_data: opt_json(row, 23)?,
        expires_at: ts(row, 24)?,
        auto_approve_after: opt_ts(row, 25)?,
        requires_checkpoint: row.get(26)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_chain_detects_tampering() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.audit("action_proposed", Some(Uuid::new_v4()), Some("{}")).unwrap();
        store.audit("action_terminal", None, Some("{\"status\":\"executed\"}")).unwrap();
        store.audit("sweep_completed", None, None).unwrap();
        assert_eq!(store.verify_audit_chain().unwrap(), None);

        store
            .raw()
            .execute("UPDATE audit_log SET details = 'forged' WHERE id = 2", [])
            .unwrap();
        assert_eq!(store.verify_audit_chain().unwrap(), Some(2));
    }

    #[test]
    fn test_audit_surfaces_unreadable_previous_checksum() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.audit("action_proposed", None, None).unwrap();
        store
            .raw()
            .execute("UPDATE audit_log SET checksum = x'00ff'", [])
            .unwrap();

        let err = store.audit("action_terminal", None, None).unwrap_err();
        assert!(matches!(err, WardenError::Store(_)));
        assert!(store.audit_log(10, None).is_err());
        let count: i64 = store
            .raw()
            .query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_timestamp_format_sorts_lexically() {
        let earlier = Utc::now();
        let later = earlier + chrono::Duration::milliseconds(1);
        assert!(fmt_ts(earlier) < fmt_ts(later));
    }
}
