// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Record store for batches, certificates and registered users.
//
// The store only persists what it is given. It never computes hashes or
// identifiers, and it never checks lifecycle rules; the service does both
// before writing.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use agripass_core::error::{AgripassError, Result};
use agripass_core::types::{
    Actor, Authority, Batch, BatchId, BatchStatus, Certificate, CertificateId, CertificateStatus,
    ColumnFault, Role,
};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info, instrument};

pub trait RecordStore: Send + Sync {
    fn insert_batch(&self, batch: &Batch) -> Result<()>;
    fn get_batch(&self, id: &BatchId) -> Result<Option<Batch>>;
    /// Overwrite an existing batch. `NotFound` if it was never inserted.
    fn update_batch(&self, batch: &Batch) -> Result<()>;
    /// Batches in submission order, optionally filtered by status.
    fn list_batches(&self, status: Option<BatchStatus>) -> Result<Vec<Batch>>;

    fn insert_certificate(&self, cert: &Certificate) -> Result<()>;
    fn get_certificate(&self, id: &CertificateId) -> Result<Option<Certificate>>;
    /// Overwrite an existing certificate. `NotFound` if it was never inserted.
    fn update_certificate(&self, cert: &Certificate) -> Result<()>;
    fn certificates_for_batch(&self, batch_id: &BatchId) -> Result<Vec<Certificate>>;
    /// Certificates in issuance order, optionally filtered by stored status.
    fn list_certificates(&self, status: Option<CertificateStatus>) -> Result<Vec<Certificate>>;
    /// Insert a newly issued certificate and overwrite its certified batch as
    /// one write: either both land or neither does.
    fn record_issuance(&self, cert: &Certificate, batch: &Batch) -> Result<()>;

    fn insert_user(&self, user: &Actor) -> Result<()>;
    fn get_user(&self, id: &str) -> Result<Option<Actor>>;
    /// Overwrite an existing user. `NotFound` if it was never inserted.
    fn update_user(&self, user: &Actor) -> Result<()>;
    /// Users in registration order, optionally filtered by role.
    fn list_users(&self, role: Option<Role>) -> Result<Vec<Actor>>;
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

const CREATE_TABLES_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS batches (
        id TEXT PRIMARY KEY,
        status TEXT NOT NULL,
        submitted_at TEXT NOT NULL,
        record TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS certificates (
        id TEXT PRIMARY KEY,
        batch_id TEXT NOT NULL REFERENCES batches(id),
        status TEXT NOT NULL,
        issued_at TEXT NOT NULL,
        expires_at TEXT NOT NULL,
        hash TEXT NOT NULL DEFAULT '',
        issuer TEXT NOT NULL,
        authority TEXT NOT NULL,
        credential TEXT NOT NULL,
        proof_image TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_certificates_batch ON certificates(batch_id);
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        name TEXT,
        role TEXT NOT NULL
    );
"#;

const CERTIFICATE_COLUMNS: &str = "id, batch_id, status, issued_at, expires_at, hash, issuer, \
     authority, credential, proof_image";

fn db_err(context: &str, e: rusqlite::Error) -> AgripassError {
    AgripassError::Database(format!("{context}: {e}"))
}

fn timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn conversion_err<E>(column: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
}

/// SQLite-backed store. Batches are kept as JSON documents next to the
/// columns used for filtering; certificates are fully columnar so that the
/// sealed fields can be read (and audited) with plain SQL.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`, in WAL mode.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(|e| db_err("open", e))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| db_err("WAL pragma", e))?;
        conn.execute_batch(CREATE_TABLES_SQL)
            .map_err(|e| db_err("create tables", e))?;

        info!("record store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| db_err("open in-memory", e))?;
        conn.execute_batch(CREATE_TABLES_SQL)
            .map_err(|e| db_err("create tables", e))?;

        debug!("in-memory record store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AgripassError::Database("record store lock poisoned".into()))
    }

    fn query_batches(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<Batch>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql).map_err(|e| db_err("prepare batches", e))?;
        let records = stmt
            .query_map(args, |row| row.get::<_, String>(0))
            .map_err(|e| db_err("query batches", e))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| db_err("collect batches", e))?;
        records
            .iter()
            .map(|json| serde_json::from_str(json).map_err(AgripassError::from))
            .collect()
    }

    fn query_certificates(
        &self,
        sql: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<Certificate>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| db_err("prepare certificates", e))?;
        let certs = stmt
            .query_map(args, row_to_certificate)
            .map_err(|e| db_err("query certificates", e))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| db_err("collect certificates", e))?;
        Ok(certs)
    }

    fn query_users(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<Actor>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql).map_err(|e| db_err("prepare users", e))?;
        let users = stmt
            .query_map(args, row_to_user)
            .map_err(|e| db_err("query users", e))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| db_err("collect users", e))?;
        Ok(users)
    }
}

impl RecordStore for SqliteStore {
    #[instrument(skip_all, fields(batch_id = %batch.id))]
    fn insert_batch(&self, batch: &Batch) -> Result<()> {
        let record = serde_json::to_string(batch)?;
        self.conn()?
            .execute(
                "INSERT INTO batches (id, status, submitted_at, record) VALUES (?1, ?2, ?3, ?4)",
                params![
                    batch.id.as_str(),
                    batch.status.as_str(),
                    timestamp(&batch.submitted_at),
                    record
                ],
            )
            .map_err(|e| db_err("insert batch", e))?;
        debug!("batch inserted");
        Ok(())
    }

    fn get_batch(&self, id: &BatchId) -> Result<Option<Batch>> {
        let record: Option<String> = self
            .conn()?
            .query_row(
                "SELECT record FROM batches WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| db_err("get batch", e))?;
        record
            .map(|json| serde_json::from_str(&json).map_err(AgripassError::from))
            .transpose()
    }

    #[instrument(skip_all, fields(batch_id = %batch.id, status = %batch.status))]
    fn update_batch(&self, batch: &Batch) -> Result<()> {
        write_batch(&*self.conn()?, batch)?;
        debug!("batch updated");
        Ok(())
    }

    fn list_batches(&self, status: Option<BatchStatus>) -> Result<Vec<Batch>> {
        match status {
            Some(status) => self.query_batches(
                "SELECT record FROM batches WHERE status = ?1 ORDER BY submitted_at ASC, rowid ASC",
                params![status.as_str()],
            ),
            None => self.query_batches(
                "SELECT record FROM batches ORDER BY submitted_at ASC, rowid ASC",
                params![],
            ),
        }
    }

    #[instrument(skip_all, fields(certificate_id = %cert.id, batch_id = %cert.batch_id))]
    fn insert_certificate(&self, cert: &Certificate) -> Result<()> {
        write_new_certificate(&*self.conn()?, cert)?;
        debug!("certificate inserted");
        Ok(())
    }

    fn get_certificate(&self, id: &CertificateId) -> Result<Option<Certificate>> {
        self.conn()?
            .query_row(
                &format!("SELECT {CERTIFICATE_COLUMNS} FROM certificates WHERE id = ?1"),
                params![id.as_str()],
                row_to_certificate,
            )
            .optional()
            .map_err(|e| db_err("get certificate", e))
    }

    #[instrument(skip_all, fields(certificate_id = %cert.id, status = %cert.status))]
    fn update_certificate(&self, cert: &Certificate) -> Result<()> {
        let credential = serde_json::to_string(&cert.credential)?;
        let rows = self
            .conn()?
            .execute(
                "UPDATE certificates
                 SET batch_id = ?1, status = ?2, issued_at = ?3, expires_at = ?4, hash = ?5,
                     issuer = ?6, authority = ?7, credential = ?8, proof_image = ?9
                 WHERE id = ?10",
                params![
                    cert.batch_id.as_str(),
                    cert.status.as_str(),
                    timestamp(&cert.issued_at),
                    timestamp(&cert.expires_at),
                    cert.hash,
                    cert.issuer,
                    cert.authority.as_str(),
                    credential,
                    cert.proof_image,
                    cert.id.as_str(),
                ],
            )
            .map_err(|e| db_err("update certificate", e))?;
        if rows == 0 {
            return Err(AgripassError::NotFound {
                kind: "certificate",
                id: cert.id.to_string(),
            });
        }
        debug!("certificate updated");
        Ok(())
    }

    fn certificates_for_batch(&self, batch_id: &BatchId) -> Result<Vec<Certificate>> {
        self.query_certificates(
            &format!(
                "SELECT {CERTIFICATE_COLUMNS} FROM certificates
                 WHERE batch_id = ?1 ORDER BY issued_at ASC, rowid ASC"
            ),
            params![batch_id.as_str()],
        )
    }

    fn list_certificates(&self, status: Option<CertificateStatus>) -> Result<Vec<Certificate>> {
        match status {
            Some(status) => self.query_certificates(
                &format!(
                    "SELECT {CERTIFICATE_COLUMNS} FROM certificates
                     WHERE status = ?1 ORDER BY issued_at ASC, rowid ASC"
                ),
                params![status.as_str()],
            ),
            None => self.query_certificates(
                &format!(
                    "SELECT {CERTIFICATE_COLUMNS} FROM certificates ORDER BY issued_at ASC, rowid ASC"
                ),
                params![],
            ),
        }
    }

    #[instrument(skip_all, fields(certificate_id = %cert.id, batch_id = %batch.id))]
    fn record_issuance(&self, cert: &Certificate, batch: &Batch) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| db_err("begin issuance", e))?;
        write_new_certificate(&tx, cert)?;
        write_batch(&tx, batch)?;
        tx.commit().map_err(|e| db_err("commit issuance", e))?;
        debug!("issuance recorded");
        Ok(())
    }

    #[instrument(skip_all, fields(user_id = %user.id, role = user.role.as_str()))]
    fn insert_user(&self, user: &Actor) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO users (id, name, role) VALUES (?1, ?2, ?3)",
                params![user.id, user.name, user.role.as_str()],
            )
            .map_err(|e| db_err("insert user", e))?;
        debug!("user inserted");
        Ok(())
    }

    fn get_user(&self, id: &str) -> Result<Option<Actor>> {
        self.conn()?
            .query_row(
                "SELECT id, name, role FROM users WHERE id = ?1",
                params![id],
                row_to_user,
            )
            .optional()
            .map_err(|e| db_err("get user", e))
    }

    #[instrument(skip_all, fields(user_id = %user.id, role = user.role.as_str()))]
    fn update_user(&self, user: &Actor) -> Result<()> {
        let rows = self
            .conn()?
            .execute(
                "UPDATE users SET name = ?1, role = ?2 WHERE id = ?3",
                params![user.name, user.role.as_str(), user.id],
            )
            .map_err(|e| db_err("update user", e))?;
        if rows == 0 {
            return Err(AgripassError::NotFound {
                kind: "user",
                id: user.id.clone(),
            });
        }
        Ok(())
    }

    fn list_users(&self, role: Option<Role>) -> Result<Vec<Actor>> {
        match role {
            Some(role) => self.query_users(
                "SELECT id, name, role FROM users WHERE role = ?1 ORDER BY rowid ASC",
                params![role.as_str()],
            ),
            None => self.query_users("SELECT id, name, role FROM users ORDER BY rowid ASC", params![]),
        }
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<Actor> {
    let role: String = row.get(2)?;
    Ok(Actor {
        id: row.get(0)?,
        name: row.get(1)?,
        role: role.parse().map_err(|e| conversion_err(2, e))?,
    })
}

fn write_batch(conn: &Connection, batch: &Batch) -> Result<()> {
    let record = serde_json::to_string(batch)?;
    let rows = conn
        .execute(
            "UPDATE batches SET status = ?1, record = ?2 WHERE id = ?3",
            params![batch.status.as_str(), record, batch.id.as_str()],
        )
        .map_err(|e| db_err("update batch", e))?;
    if rows == 0 {
        return Err(AgripassError::NotFound {
            kind: "batch",
            id: batch.id.to_string(),
        });
    }
    Ok(())
}

fn write_new_certificate(conn: &Connection, cert: &Certificate) -> Result<()> {
    let credential = serde_json::to_string(&cert.credential)?;
    conn.execute(
        &format!(
            "INSERT INTO certificates ({CERTIFICATE_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
        ),
        params![
            cert.id.as_str(),
            cert.batch_id.as_str(),
            cert.status.as_str(),
            timestamp(&cert.issued_at),
            timestamp(&cert.expires_at),
            cert.hash,
            cert.issuer,
            cert.authority.as_str(),
            credential,
            cert.proof_image,
        ],
    )
    .map_err(|e| db_err("insert certificate", e))?;
    Ok(())
}

/// Parse a timestamp column. Text that is not exactly what [`timestamp`]
/// writes is recorded as a fault; the parsed instant is still returned when
/// there is one.
fn read_timestamp(
    column: &str,
    text: &str,
    faults: &mut Vec<ColumnFault>,
) -> Option<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.with_timezone(&Utc));
    if parsed.as_ref().map(timestamp).as_deref() != Some(text) {
        faults.push(fault(column, text));
    }
    parsed
}

fn fault(column: &str, stored: &str) -> ColumnFault {
    ColumnFault {
        column: column.to_owned(),
        stored: stored.to_owned(),
    }
}

/// Map a certificate row. Column order follows `CERTIFICATE_COLUMNS`.
///
/// Typed columns that do not hold what this store writes are not an error:
/// they become `ColumnFault`s with a placeholder value, and the certificate
/// reads as tampered. One edited row must not hide the others.
fn row_to_certificate(row: &rusqlite::Row<'_>) -> rusqlite::Result<Certificate> {
    let id: String = row.get(0)?;
    let batch_id: String = row.get(1)?;
    let status: String = row.get(2)?;
    let issued_at: String = row.get(3)?;
    let expires_at: String = row.get(4)?;
    let hash: String = row.get(5)?;
    let issuer: String = row.get(6)?;
    let authority: String = row.get(7)?;
    let credential: String = row.get(8)?;
    let proof_image: Option<String> = row.get(9)?;

    let mut faults = Vec::new();
    let status = match status.parse::<CertificateStatus>() {
        Ok(parsed) if parsed.as_str() == status => parsed,
        _ => {
            faults.push(fault("status", &status));
            CertificateStatus::Revoked
        }
    };
    let issued_at = read_timestamp("issued_at", &issued_at, &mut faults).unwrap_or_default();
    let expires_at = read_timestamp("expires_at", &expires_at, &mut faults).unwrap_or(issued_at);
    let authority = match authority.as_str() {
        "remote" => Authority::Remote,
        "local_fallback" => Authority::LocalFallback,
        other => {
            faults.push(fault("authority", other));
            Authority::LocalFallback
        }
    };
    let credential = serde_json::from_str(&credential).unwrap_or_else(|_| {
        faults.push(fault("credential", &credential));
        serde_json::Value::Null
    });

    Ok(Certificate {
        id: CertificateId(id),
        batch_id: BatchId(batch_id),
        issued_at,
        expires_at,
        status,
        credential,
        proof_image,
        authority,
        hash,
        issuer,
        faults,
    })
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Tables {
    batches: BTreeMap<BatchId, (u64, Batch)>,
    certificates: BTreeMap<CertificateId, (u64, Certificate)>,
    users: BTreeMap<String, (u64, Actor)>,
    next_seq: u64,
}

impl Tables {
    fn seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}

/// Process-local store for tests and one-shot tools.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| AgripassError::Database("memory store lock poisoned".into()))
    }
}

fn in_insertion_order<K, V: Clone>(rows: &BTreeMap<K, (u64, V)>, keep: impl Fn(&V) -> bool) -> Vec<V> {
    let mut found: Vec<&(u64, V)> = rows.values().filter(|(_, v)| keep(v)).collect();
    found.sort_by_key(|(seq, _)| *seq);
    found.into_iter().map(|(_, v)| v.clone()).collect()
}

impl RecordStore for MemoryStore {
    fn insert_batch(&self, batch: &Batch) -> Result<()> {
        let mut tables = self.tables()?;
        if tables.batches.contains_key(&batch.id) {
            return Err(AgripassError::Database(format!("batch {} already exists", batch.id)));
        }
        let seq = tables.seq();
        tables.batches.insert(batch.id.clone(), (seq, batch.clone()));
        Ok(())
    }

    fn get_batch(&self, id: &BatchId) -> Result<Option<Batch>> {
        Ok(self.tables()?.batches.get(id).map(|(_, b)| b.clone()))
    }

    fn update_batch(&self, batch: &Batch) -> Result<()> {
        let mut tables = self.tables()?;
        match tables.batches.get_mut(&batch.id) {
            Some((_, stored)) => {
                *stored = batch.clone();
                Ok(())
            }
            None => Err(AgripassError::NotFound {
                kind: "batch",
                id: batch.id.to_string(),
            }),
        }
    }

    fn list_batches(&self, status: Option<BatchStatus>) -> Result<Vec<Batch>> {
        let tables = self.tables()?;
        Ok(in_insertion_order(&tables.batches, |b| {
            status.is_none_or(|s| b.status == s)
        }))
    }

    fn insert_certificate(&self, cert: &Certificate) -> Result<()> {
        let mut tables = self.tables()?;
        if tables.certificates.contains_key(&cert.id) {
            return Err(AgripassError::Database(format!(
                "certificate {} already exists",
                cert.id
            )));
        }
        let seq = tables.seq();
        tables.certificates.insert(cert.id.clone(), (seq, cert.clone()));
        Ok(())
    }

    fn get_certificate(&self, id: &CertificateId) -> Result<Option<Certificate>> {
        Ok(self.tables()?.certificates.get(id).map(|(_, c)| c.clone()))
    }

    fn update_certificate(&self, cert: &Certificate) -> Result<()> {
        let mut tables = self.tables()?;
        match tables.certificates.get_mut(&cert.id) {
            Some((_, stored)) => {
                *stored = cert.clone();
                Ok(())
            }
            None => Err(AgripassError::NotFound {
                kind: "certificate",
                id: cert.id.to_string(),
            }),
        }
    }

    fn certificates_for_batch(&self, batch_id: &BatchId) -> Result<Vec<Certificate>> {
        let tables = self.tables()?;
        Ok(in_insertion_order(&tables.certificates, |c| &c.batch_id == batch_id))
    }

    fn list_certificates(&self, status: Option<CertificateStatus>) -> Result<Vec<Certificate>> {
        let tables = self.tables()?;
        Ok(in_insertion_order(&tables.certificates, |c| {
            status.is_none_or(|s| c.status == s)
        }))
    }

    fn record_issuance(&self, cert: &Certificate, batch: &Batch) -> Result<()> {
        let mut tables = self.tables()?;
        if tables.certificates.contains_key(&cert.id) {
            return Err(AgripassError::Database(format!(
                "certificate {} already exists",
                cert.id
            )));
        }
        let Some((_, stored)) = tables.batches.get_mut(&batch.id) else {
            return Err(AgripassError::NotFound {
                kind: "batch",
                id: batch.id.to_string(),
            });
        };
        *stored = batch.clone();
        let seq = tables.seq();
        tables.certificates.insert(cert.id.clone(), (seq, cert.clone()));
        Ok(())
    }

    fn insert_user(&self, user: &Actor) -> Result<()> {
        let mut tables = self.tables()?;
        if tables.users.contains_key(&user.id) {
            return Err(AgripassError::Database(format!("user {} already exists", user.id)));
        }
        let seq = tables.seq();
        tables.users.insert(user.id.clone(), (seq, user.clone()));
        Ok(())
    }

    fn get_user(&self, id: &str) -> Result<Option<Actor>> {
        Ok(self.tables()?.users.get(id).map(|(_, u)| u.clone()))
    }

    fn update_user(&self, user: &Actor) -> Result<()> {
        let mut tables = self.tables()?;
        match tables.users.get_mut(&user.id) {
            Some((_, stored)) => {
                *stored = user.clone();
                Ok(())
            }
            None => Err(AgripassError::NotFound {
                kind: "user",
                id: user.id.clone(),
            }),
        }
    }

    fn list_users(&self, role: Option<Role>) -> Result<Vec<Actor>> {
        let tables = self.tables()?;
        Ok(in_insertion_order(&tables.users, |u| role.is_none_or(|r| u.role == r)))
    }
}
