// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Audit trail: append-only SQLite log of every batch and certificate state
// change.
//
// Schema:
//   audit_log(
//     id         INTEGER PRIMARY KEY AUTOINCREMENT,
//     timestamp  TEXT    NOT NULL,   -- RFC 3339, millisecond precision
//     actor_id   TEXT    NOT NULL,
//     action     TEXT    NOT NULL,   -- e.g. "issue certificate"
//     entity_id  TEXT    NOT NULL,   -- batch or certificate id
//     details    TEXT                -- optional JSON object
//   )

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use agripass_core::audit::{AuditEvent, AuditSink};
use agripass_core::error::{AgripassError, Result};
use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS audit_log (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp  TEXT    NOT NULL,
    actor_id   TEXT    NOT NULL,
    action     TEXT    NOT NULL,
    entity_id  TEXT    NOT NULL,
    details    TEXT
);
CREATE INDEX IF NOT EXISTS idx_audit_entity ON audit_log(entity_id);";

const SELECT_COLUMNS: &str = "SELECT id, timestamp, actor_id, action, entity_id, details FROM audit_log";

/// Convert a `rusqlite::Error` into an `AgripassError::Database`.
fn db_err(e: rusqlite::Error) -> AgripassError {
    AgripassError::Database(e.to_string())
}

/// A single stored audit row, used for queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: String,
    pub actor_id: String,
    pub action: String,
    pub entity_id: String,
    pub details: Option<serde_json::Value>,
}

impl AuditEntry {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let details: Option<String> = row.get(5)?;
        Ok(Self {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            actor_id: row.get(2)?,
            action: row.get(3)?,
            entity_id: row.get(4)?,
            // Rows are only ever written by `record`, which stores valid JSON.
            // Anything else is surfaced as a plain string rather than dropped.
            details: details.map(|d| {
                serde_json::from_str(&d).unwrap_or(serde_json::Value::String(d))
            }),
        })
    }
}

/// Append-only audit log backed by a SQLite database.
///
/// The connection sits behind a mutex so one log can be shared as an
/// `Arc<dyn AuditSink>` across the service layer.
pub struct AuditLog {
    conn: Mutex<Connection>,
}

impl AuditLog {
    /// Open (or create) the audit database at `path`, in WAL mode.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        debug!("audit log opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory audit database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        debug!("in-memory audit log opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AgripassError::Database("audit connection lock poisoned".into()))
    }

    /// Append one event.
    #[instrument(skip(self, event), fields(actor = %event.actor_id, action = %event.action, entity = %event.entity_id))]
    pub fn append(&self, event: &AuditEvent) -> Result<()> {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let details = event
            .details
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.conn()?
            .execute(
                "INSERT INTO audit_log (timestamp, actor_id, action, entity_id, details)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![timestamp, event.actor_id, event.action, event.entity_id, details],
            )
            .map_err(db_err)?;

        debug!("audit entry recorded");
        Ok(())
    }

    /// All entries for one batch or certificate, oldest first.
    pub fn entries_for_entity(&self, entity_id: &str) -> Result<Vec<AuditEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("{SELECT_COLUMNS} WHERE entity_id = ?1 ORDER BY id ASC"))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![entity_id], AuditEntry::from_row)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// All entries written by one actor, oldest first.
    pub fn entries_for_actor(&self, actor_id: &str) -> Result<Vec<AuditEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("{SELECT_COLUMNS} WHERE actor_id = ?1 ORDER BY id ASC"))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![actor_id], AuditEntry::from_row)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// The most recent `limit` entries, newest first.
    pub fn recent_entries(&self, limit: u32) -> Result<Vec<AuditEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("{SELECT_COLUMNS} ORDER BY id DESC LIMIT ?1"))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![limit], AuditEntry::from_row)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// Total number of entries in the log.
    pub fn count(&self) -> Result<u64> {
        self.conn()?
            .query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get(0))
            .map_err(db_err)
    }
}

impl AuditSink for AuditLog {
    fn record(&self, event: &AuditEvent) -> Result<()> {
        self.append(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agripass_core::types::{Actor, Role};

    fn make_log() -> AuditLog {
        AuditLog::open_in_memory().expect("open in-memory audit log")
    }

    fn qa() -> Actor {
        Actor::new("qa-7", Role::QaAgency)
    }

    #[test]
    fn record_and_count() {
        let log = make_log();
        assert_eq!(log.count().unwrap(), 0);

        log.append(&AuditEvent::new(&qa(), "begin inspection", "BATCH-1"))
            .unwrap();
        log.append(&AuditEvent::new(&qa(), "record inspection", "BATCH-1"))
            .unwrap();

        assert_eq!(log.count().unwrap(), 2);
    }

    #[test]
    fn entries_for_entity_oldest_first() {
        let log = make_log();
        let exporter = Actor::new("exp-1", Role::Exporter);
        log.append(&AuditEvent::new(&exporter, "submit batch", "BATCH-1"))
            .unwrap();
        log.append(&AuditEvent::new(&exporter, "submit batch", "BATCH-2"))
            .unwrap();
        log.append(&AuditEvent::new(&qa(), "reject batch", "BATCH-1"))
            .unwrap();

        let entries = log.entries_for_entity("BATCH-1").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, "submit batch");
        assert_eq!(entries[0].actor_id, "exp-1");
        assert_eq!(entries[1].action, "reject batch");
        assert_eq!(entries[1].actor_id, "qa-7");

        assert_eq!(log.entries_for_actor("exp-1").unwrap().len(), 2);
    }

    #[test]
    fn details_survive_storage() {
        let log = make_log();
        let event = AuditEvent::new(&qa(), "issue certificate", "CERT-0000ABCD")
            .with_detail("authority", "local_fallback")
            .with_detail("batch_id", "BATCH-1");
        log.append(&event).unwrap();

        let entries = log.entries_for_entity("CERT-0000ABCD").unwrap();
        let details = entries[0].details.as_ref().unwrap();
        assert_eq!(details["authority"], "local_fallback");
        assert_eq!(details["batch_id"], "BATCH-1");
    }

    #[test]
    fn recent_entries_ordering() {
        let log = make_log();
        for i in 0..5 {
            log.append(&AuditEvent::new(&qa(), "begin inspection", format!("BATCH-{i}")))
                .unwrap();
        }

        let recent = log.recent_entries(3).unwrap();
        assert_eq!(recent.len(), 3);
        assert!(recent[0].id > recent[1].id);
        assert!(recent[1].id > recent[2].id);
        assert_eq!(recent[0].entity_id, "BATCH-4");
    }

    #[test]
    fn usable_as_shared_sink() {
        let sink: std::sync::Arc<dyn AuditSink> = std::sync::Arc::new(make_log());
        sink.record(&AuditEvent::new(&qa(), "revoke certificate", "CERT-1"))
            .unwrap();
    }

    #[test]
    fn file_backed_log_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.db");
        {
            let log = AuditLog::open(&path).unwrap();
            log.append(&AuditEvent::new(&qa(), "issue certificate", "CERT-1"))
                .unwrap();
        }
        let reopened = AuditLog::open(&path).unwrap();
        assert_eq!(reopened.count().unwrap(), 1);
    }
}
