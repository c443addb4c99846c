use chrono::{DateTime, Utc};
use monty_common::types::{CheckOutcome, DomainStatus, SslStatus};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Result, StorageError};

const CHECK_OUTCOMES_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS check_outcomes (
    id TEXT PRIMARY KEY,
    endpoint_id TEXT NOT NULL,
    succeeded INTEGER NOT NULL,
    response_time_ms INTEGER NOT NULL,
    error_message TEXT,
    checked_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_outcomes_endpoint ON check_outcomes(endpoint_id);
CREATE INDEX IF NOT EXISTS idx_outcomes_checked_at ON check_outcomes(checked_at);
";

const SSL_STATUSES_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS ssl_statuses (
    id TEXT PRIMARY KEY,
    endpoint_id TEXT NOT NULL UNIQUE,
    certificate_expires_at INTEGER,
    days_until_expiry INTEGER,
    is_valid INTEGER NOT NULL,
    domain_matches INTEGER NOT NULL,
    chain_valid INTEGER NOT NULL,
    issuer TEXT,
    subject TEXT,
    serial_number TEXT,
    tls_version TEXT,
    error_message TEXT,
    checked_at INTEGER NOT NULL
);
";

const DOMAIN_STATUSES_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS domain_statuses (
    id TEXT PRIMARY KEY,
    endpoint_id TEXT NOT NULL UNIQUE,
    domain_expires_at INTEGER,
    days_until_expiry INTEGER,
    is_registered INTEGER NOT NULL,
    registrar TEXT,
    error_message TEXT,
    checked_at INTEGER NOT NULL
);
";

/// Persistence for probe results.
///
/// Outcomes are append-only; SSL and domain statuses keep one row per
/// endpoint where the last write wins.
pub trait ResultStore: Send + Sync {
    /// Append one completed probe. Rows are never updated afterwards.
    fn append_outcome(&self, outcome: &CheckOutcome) -> Result<()>;

    /// Recent outcomes for one endpoint, newest first.
    fn outcomes(&self, endpoint_id: &str, limit: usize) -> Result<Vec<CheckOutcome>>;

    /// Uptime percentage over stored outcomes, optionally bounded to a
    /// lookback window in seconds. `None` when no outcome exists; the
    /// value is never fabricated for an unprobed endpoint.
    fn uptime(&self, endpoint_id: &str, window_secs: Option<i64>) -> Result<Option<f64>>;

    fn upsert_ssl_status(&self, status: &SslStatus) -> Result<()>;

    /// Latest SSL status per endpoint.
    fn ssl_statuses(&self) -> Result<Vec<SslStatus>>;

    fn upsert_domain_status(&self, status: &DomainStatus) -> Result<()>;

    /// Latest domain status per endpoint.
    fn domain_statuses(&self) -> Result<Vec<DomainStatus>>;

    /// Remove every stored outcome and status for one endpoint.
    fn purge_endpoint(&self, endpoint_id: &str) -> Result<()>;
}

pub struct SqliteResultStore {
    conn: Mutex<Connection>,
    _db_path: PathBuf,
}

impl SqliteResultStore {
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .map_err(|e| StorageError::Other(format!("create data dir: {e}")))?;
        let db_path = data_dir.join("results.db");
        let conn = Connection::open(&db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(CHECK_OUTCOMES_SCHEMA)?;
        conn.execute_batch(SSL_STATUSES_SCHEMA)?;
        conn.execute_batch(DOMAIN_STATUSES_SCHEMA)?;
        tracing::info!(path = %db_path.display(), "Initialized result store");
        Ok(Self {
            conn: Mutex::new(conn),
            _db_path: db_path,
        })
    }

    fn row_to_outcome(row: &rusqlite::Row) -> Result<CheckOutcome> {
        let succeeded_int: i32 = row.get(2)?;
        let checked: i64 = row.get(5)?;
        Ok(CheckOutcome {
            id: row.get(0)?,
            endpoint_id: row.get(1)?,
            succeeded: succeeded_int != 0,
            response_time_ms: row.get::<_, i64>(3)? as u64,
            error_message: row.get(4)?,
            checked_at: DateTime::from_timestamp(checked, 0).unwrap_or_default(),
        })
    }

    fn row_to_ssl_status(row: &rusqlite::Row) -> Result<SslStatus> {
        let expires: Option<i64> = row.get(2)?;
        let is_valid_int: i32 = row.get(4)?;
        let domain_int: i32 = row.get(5)?;
        let chain_int: i32 = row.get(6)?;
        let checked: i64 = row.get(12)?;
        Ok(SslStatus {
            id: row.get(0)?,
            endpoint_id: row.get(1)?,
            certificate_expires_at: expires.and_then(|ts| DateTime::from_timestamp(ts, 0)),
            days_until_expiry: row.get(3)?,
            is_valid: is_valid_int != 0,
            domain_matches: domain_int != 0,
            chain_valid: chain_int != 0,
            issuer: row.get(7)?,
            subject: row.get(8)?,
            serial_number: row.get(9)?,
            tls_version: row.get(10)?,
            error_message: row.get(11)?,
            checked_at: DateTime::from_timestamp(checked, 0).unwrap_or_default(),
        })
    }

    fn row_to_domain_status(row: &rusqlite::Row) -> Result<DomainStatus> {
        let expires: Option<i64> = row.get(2)?;
        let registered_int: i32 = row.get(4)?;
        let checked: i64 = row.get(7)?;
        Ok(DomainStatus {
            id: row.get(0)?,
            endpoint_id: row.get(1)?,
            domain_expires_at: expires.and_then(|ts| DateTime::from_timestamp(ts, 0)),
            days_until_expiry: row.get(3)?,
            is_registered: registered_int != 0,
            registrar: row.get(5)?,
            error_message: row.get(6)?,
            checked_at: DateTime::from_timestamp(checked, 0).unwrap_or_default(),
        })
    }
}

impl ResultStore for SqliteResultStore {
    fn append_outcome(&self, outcome: &CheckOutcome) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO check_outcomes (id, endpoint_id, succeeded, response_time_ms, error_message, checked_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                outcome.id,
                outcome.endpoint_id,
                outcome.succeeded as i32,
                outcome.response_time_ms as i64,
                outcome.error_message,
                outcome.checked_at.timestamp(),
            ],
        )?;
        Ok(())
    }

    fn outcomes(&self, endpoint_id: &str, limit: usize) -> Result<Vec<CheckOutcome>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, endpoint_id, succeeded, response_time_ms, error_message, checked_at
             FROM check_outcomes
             WHERE endpoint_id = ?1
             ORDER BY checked_at DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![endpoint_id, limit as i64], |row| {
            Ok(Self::row_to_outcome(row))
        })?;
        let mut outcomes = Vec::new();
        for row in rows {
            outcomes.push(row??);
        }
        Ok(outcomes)
    }

    fn uptime(&self, endpoint_id: &str, window_secs: Option<i64>) -> Result<Option<f64>> {
        let conn = self.conn.lock().unwrap();
        let mut sql = String::from(
            "SELECT COUNT(*), COALESCE(SUM(succeeded), 0) FROM check_outcomes WHERE endpoint_id = ?1",
        );
        let mut params: Vec<Box<dyn rusqlite::types::ToSql>> =
            vec![Box::new(endpoint_id.to_string())];
        if let Some(window) = window_secs {
            sql.push_str(" AND checked_at >= ?2");
            params.push(Box::new(Utc::now().timestamp() - window));
        }
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            params.iter().map(|p| p.as_ref()).collect();
        let (total, successes): (i64, i64) =
            conn.query_row(&sql, param_refs.as_slice(), |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?;
        if total == 0 {
            return Ok(None);
        }
        Ok(Some(100.0 * successes as f64 / total as f64))
    }

    fn upsert_ssl_status(&self, status: &SslStatus) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO ssl_statuses (id, endpoint_id, certificate_expires_at, days_until_expiry, \
             is_valid, domain_matches, chain_valid, issuer, subject, serial_number, tls_version, \
             error_message, checked_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(endpoint_id) DO UPDATE SET
                 certificate_expires_at = excluded.certificate_expires_at,
                 days_until_expiry = excluded.days_until_expiry,
                 is_valid = excluded.is_valid,
                 domain_matches = excluded.domain_matches,
                 chain_valid = excluded.chain_valid,
                 issuer = excluded.issuer,
                 subject = excluded.subject,
                 serial_number = excluded.serial_number,
                 tls_version = excluded.tls_version,
                 error_message = excluded.error_message,
                 checked_at = excluded.checked_at",
            rusqlite::params![
                status.id,
                status.endpoint_id,
                status.certificate_expires_at.map(|t| t.timestamp()),
                status.days_until_expiry,
                status.is_valid as i32,
                status.domain_matches as i32,
                status.chain_valid as i32,
                status.issuer,
                status.subject,
                status.serial_number,
                status.tls_version,
                status.error_message,
                status.checked_at.timestamp(),
            ],
        )?;
        Ok(())
    }

    fn ssl_statuses(&self) -> Result<Vec<SslStatus>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, endpoint_id, certificate_expires_at, days_until_expiry, is_valid, \
             domain_matches, chain_valid, issuer, subject, serial_number, tls_version, \
             error_message, checked_at
             FROM ssl_statuses
             ORDER BY checked_at DESC",
        )?;
        let rows = stmt.query_map([], |row| Ok(Self::row_to_ssl_status(row)))?;
        let mut statuses = Vec::new();
        for row in rows {
            statuses.push(row??);
        }
        Ok(statuses)
    }

    fn upsert_domain_status(&self, status: &DomainStatus) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO domain_statuses (id, endpoint_id, domain_expires_at, days_until_expiry, \
             is_registered, registrar, error_message, checked_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(endpoint_id) DO UPDATE SET
                 domain_expires_at = excluded.domain_expires_at,
                 days_until_expiry = excluded.days_until_expiry,
                 is_registered = excluded.is_registered,
                 registrar = excluded.registrar,
                 error_message = excluded.error_message,
                 checked_at = excluded.checked_at",
            rusqlite::params![
                status.id,
                status.endpoint_id,
                status.domain_expires_at.map(|t| t.timestamp()),
                status.days_until_expiry,
                status.is_registered as i32,
                status.registrar,
                status.error_message,
                status.checked_at.timestamp(),
            ],
        )?;
        Ok(())
    }

    fn domain_statuses(&self) -> Result<Vec<DomainStatus>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, endpoint_id, domain_expires_at, days_until_expiry, is_registered, \
             registrar, error_message, checked_at
             FROM domain_statuses
             ORDER BY checked_at DESC",
        )?;
        let rows = stmt.query_map([], |row| Ok(Self::row_to_domain_status(row)))?;
        let mut statuses = Vec::new();
        for row in rows {
            statuses.push(row??);
        }
        Ok(statuses)
    }

    fn purge_endpoint(&self, endpoint_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM check_outcomes WHERE endpoint_id = ?1",
            rusqlite::params![endpoint_id],
        )?;
        conn.execute(
            "DELETE FROM ssl_statuses WHERE endpoint_id = ?1",
            rusqlite::params![endpoint_id],
        )?;
        conn.execute(
            "DELETE FROM domain_statuses WHERE endpoint_id = ?1",
            rusqlite::params![endpoint_id],
        )?;
        Ok(())
    }
}
