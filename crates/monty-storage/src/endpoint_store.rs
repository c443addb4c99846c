use chrono::{DateTime, Utc};
use monty_common::types::{CheckType, CreateEndpointRequest, Endpoint, UpdateEndpointRequest};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Result, StorageError};

const ENDPOINTS_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS endpoints (
    id TEXT PRIMARY KEY,
    url TEXT NOT NULL,
    check_type TEXT NOT NULL,
    interval_secs INTEGER NOT NULL,
    timeout_secs INTEGER NOT NULL,
    expected_status_codes TEXT NOT NULL,
    max_response_time_ms INTEGER NOT NULL,
    tcp_port INTEGER NOT NULL DEFAULT 0,
    expected_dns_answers TEXT NOT NULL,
    min_days_valid INTEGER NOT NULL,
    check_chain INTEGER NOT NULL DEFAULT 1,
    check_domain_match INTEGER NOT NULL DEFAULT 1,
    acceptable_tls_versions TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_endpoints_check_type ON endpoints(check_type);
";

const SELECT_COLUMNS: &str = "id, url, check_type, interval_secs, timeout_secs, \
     expected_status_codes, max_response_time_ms, tcp_port, expected_dns_answers, \
     min_days_valid, check_chain, check_domain_match, acceptable_tls_versions, created_at";

/// Endpoint configuration store: CRUD plus validation.
pub struct EndpointStore {
    conn: Mutex<Connection>,
    _db_path: PathBuf,
}

impl EndpointStore {
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .map_err(|e| StorageError::Other(format!("create data dir: {e}")))?;
        let db_path = data_dir.join("endpoints.db");
        let conn = Connection::open(&db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(ENDPOINTS_SCHEMA)?;
        tracing::info!(path = %db_path.display(), "Initialized endpoint store");
        Ok(Self {
            conn: Mutex::new(conn),
            _db_path: db_path,
        })
    }

    /// Reject configurations the checkers cannot act on.
    fn validate(endpoint: &Endpoint) -> Result<()> {
        if endpoint.url.trim().is_empty() {
            return Err(StorageError::validation("url is required"));
        }
        if endpoint.interval_secs == 0 {
            return Err(StorageError::validation(
                "interval must be at least 1 second",
            ));
        }
        if endpoint.timeout_secs == 0 {
            return Err(StorageError::validation(
                "timeout must be at least 1 second",
            ));
        }
        if endpoint.check_type == CheckType::Tcp && endpoint.tcp_port == 0 {
            return Err(StorageError::validation(
                "tcp_port must be between 1 and 65535 for tcp checks",
            ));
        }
        if endpoint.check_type == CheckType::Ssl && endpoint.min_days_valid < 0 {
            return Err(StorageError::validation(
                "min_days_valid must not be negative",
            ));
        }
        if endpoint.timeout_secs >= endpoint.interval_secs {
            tracing::warn!(
                url = %endpoint.url,
                timeout = endpoint.timeout_secs,
                interval = endpoint.interval_secs,
                "timeout is not smaller than the check interval"
            );
        }
        Ok(())
    }

    pub fn create(&self, req: CreateEndpointRequest) -> Result<Endpoint> {
        let endpoint = req.into_endpoint(monty_common::id::next_id(), Utc::now());
        Self::validate(&endpoint)?;

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO endpoints (id, url, check_type, interval_secs, timeout_secs, \
             expected_status_codes, max_response_time_ms, tcp_port, expected_dns_answers, \
             min_days_valid, check_chain, check_domain_match, acceptable_tls_versions, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            rusqlite::params![
                endpoint.id,
                endpoint.url,
                endpoint.check_type.to_string(),
                endpoint.interval_secs as i64,
                endpoint.timeout_secs as i64,
                serde_json::to_string(&endpoint.expected_status_codes)?,
                endpoint.max_response_time_ms as i64,
                endpoint.tcp_port as i64,
                serde_json::to_string(&endpoint.expected_dns_answers)?,
                endpoint.min_days_valid,
                endpoint.check_chain as i32,
                endpoint.check_domain_match as i32,
                serde_json::to_string(&endpoint.acceptable_tls_versions)?,
                endpoint.created_at.timestamp(),
            ],
        )?;
        drop(conn);

        self.get(&endpoint.id)?
            .ok_or(StorageError::InsertReadback {
                entity: "endpoint",
            })
    }

    pub fn get(&self, id: &str) -> Result<Option<Endpoint>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM endpoints WHERE id = ?1"
        ))?;
        let mut rows = stmt.query_map(rusqlite::params![id], |row| Ok(Self::row_to_endpoint(row)))?;
        match rows.next() {
            Some(Ok(Ok(e))) => Ok(Some(e)),
            Some(Ok(Err(e))) => Err(e),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    pub fn list(&self) -> Result<Vec<Endpoint>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM endpoints ORDER BY created_at ASC"
        ))?;
        let rows = stmt.query_map([], |row| Ok(Self::row_to_endpoint(row)))?;
        let mut endpoints = Vec::new();
        for row in rows {
            endpoints.push(row??);
        }
        Ok(endpoints)
    }

    pub fn count(&self) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM endpoints", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Partial update. The merged configuration is re-validated before
    /// anything is written.
    pub fn update(&self, id: &str, req: UpdateEndpointRequest) -> Result<Endpoint> {
        let existing = self.get(id)?.ok_or_else(|| StorageError::NotFound {
            entity: "endpoint",
            id: id.to_string(),
        })?;

        let merged = Endpoint {
            id: existing.id.clone(),
            url: req.url.clone().unwrap_or(existing.url),
            check_type: req.check_type.unwrap_or(existing.check_type),
            interval_secs: req.interval_secs.unwrap_or(existing.interval_secs),
            timeout_secs: req.timeout_secs.unwrap_or(existing.timeout_secs),
            expected_status_codes: req
                .expected_status_codes
                .clone()
                .unwrap_or(existing.expected_status_codes),
            max_response_time_ms: req
                .max_response_time_ms
                .unwrap_or(existing.max_response_time_ms),
            tcp_port: req.tcp_port.unwrap_or(existing.tcp_port),
            expected_dns_answers: req
                .expected_dns_answers
                .clone()
                .unwrap_or(existing.expected_dns_answers),
            min_days_valid: req.min_days_valid.unwrap_or(existing.min_days_valid),
            check_chain: req.check_chain.unwrap_or(existing.check_chain),
            check_domain_match: req.check_domain_match.unwrap_or(existing.check_domain_match),
            acceptable_tls_versions: req
                .acceptable_tls_versions
                .clone()
                .unwrap_or(existing.acceptable_tls_versions),
            created_at: existing.created_at,
        };
        Self::validate(&merged)?;

        let conn = self.conn.lock().unwrap();
        let mut sets: Vec<String> = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        let mut idx = 1;

        let mut set = |col: &str, value: Box<dyn rusqlite::types::ToSql>| {
            sets.push(format!("{col} = ?{idx}"));
            params.push(value);
            idx += 1;
        };
        if let Some(url) = req.url {
            set("url", Box::new(url));
        }
        if let Some(ct) = req.check_type {
            set("check_type", Box::new(ct.to_string()));
        }
        if let Some(v) = req.interval_secs {
            set("interval_secs", Box::new(v as i64));
        }
        if let Some(v) = req.timeout_secs {
            set("timeout_secs", Box::new(v as i64));
        }
        if let Some(v) = req.expected_status_codes {
            set("expected_status_codes", Box::new(serde_json::to_string(&v)?));
        }
        if let Some(v) = req.max_response_time_ms {
            set("max_response_time_ms", Box::new(v as i64));
        }
        if let Some(v) = req.tcp_port {
            set("tcp_port", Box::new(v as i64));
        }
        if let Some(v) = req.expected_dns_answers {
            set("expected_dns_answers", Box::new(serde_json::to_string(&v)?));
        }
        if let Some(v) = req.min_days_valid {
            set("min_days_valid", Box::new(v));
        }
        if let Some(v) = req.check_chain {
            set("check_chain", Box::new(v as i32));
        }
        if let Some(v) = req.check_domain_match {
            set("check_domain_match", Box::new(v as i32));
        }
        if let Some(v) = req.acceptable_tls_versions {
            set("acceptable_tls_versions", Box::new(serde_json::to_string(&v)?));
        }

        if !sets.is_empty() {
            let sql = format!("UPDATE endpoints SET {} WHERE id = ?{idx}", sets.join(", "));
            params.push(Box::new(id.to_string()));
            let param_refs: Vec<&dyn rusqlite::types::ToSql> =
                params.iter().map(|p| p.as_ref()).collect();
            conn.execute(&sql, param_refs.as_slice())?;
        }
        drop(conn);

        Ok(merged)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute("DELETE FROM endpoints WHERE id = ?1", rusqlite::params![id])?;
        if deleted == 0 {
            return Err(StorageError::NotFound {
                entity: "endpoint",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    fn row_to_endpoint(row: &rusqlite::Row) -> Result<Endpoint> {
        let check_type_str: String = row.get(2)?;
        let check_type = check_type_str
            .parse::<CheckType>()
            .map_err(StorageError::Other)?;
        let codes_json: String = row.get(5)?;
        let answers_json: String = row.get(8)?;
        let versions_json: String = row.get(12)?;
        let check_chain_int: i32 = row.get(10)?;
        let check_domain_int: i32 = row.get(11)?;
        let created: i64 = row.get(13)?;
        Ok(Endpoint {
            id: row.get(0)?,
            url: row.get(1)?,
            check_type,
            interval_secs: row.get::<_, i64>(3)? as u64,
            timeout_secs: row.get::<_, i64>(4)? as u64,
            expected_status_codes: serde_json::from_str(&codes_json)?,
            max_response_time_ms: row.get::<_, i64>(6)? as u64,
            tcp_port: row.get::<_, i64>(7)? as u16,
            expected_dns_answers: serde_json::from_str(&answers_json)?,
            min_days_valid: row.get(9)?,
            check_chain: check_chain_int != 0,
            check_domain_match: check_domain_int != 0,
            acceptable_tls_versions: serde_json::from_str(&versions_json)?,
            created_at: DateTime::from_timestamp(created, 0).unwrap_or_default(),
        })
    }
}
