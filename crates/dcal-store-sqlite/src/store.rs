// crates/dcal-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Audit Store
// Description: Append-only, hash-chained AuditSink backed by SQLite.
// Purpose: Persist every claim decision as an immutable, linked record and
//          let a verifier detect tampering without trusting the storage
//          layer.
// Dependencies: dcal-core, rusqlite, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Each [`append`](SqliteAuditStore::append) reads the prior record's
//! `chain_hash` and allocates the next `sequence_number` inside the same
//! transaction that inserts the new row, so two callers racing to append
//! never collide. `UPDATE`/`DELETE` triggers on the audit table make the
//! append-only invariant a property of the database file itself, not just
//! of this crate's API.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use dcal_core::AnalysisId;
use dcal_core::AuditError;
use dcal_core::AuditRecord;
use dcal_core::AuditSink;
use dcal_core::GENESIS_HASH;
use dcal_core::ReportSnapshot;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::params;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

const SCHEMA_VERSION: i64 = 1;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Configuration for the `SQLite` audit store.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` audit store errors.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite audit store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite audit store db error: {0}")]
    Db(String),
    /// Stored data failed integrity verification.
    #[error("sqlite audit store corruption at sequence {sequence}: {detail}")]
    Corrupt {
        /// The sequence number at which corruption was detected.
        sequence: u64,
        /// Human-readable detail.
        detail: String,
    },
    /// Invalid store path or configuration.
    #[error("sqlite audit store invalid: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for AuditError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) | SqliteStoreError::Db(message) | SqliteStoreError::Invalid(message) => {
                Self::Sink(message)
            }
            SqliteStoreError::Corrupt { sequence, detail } => Self::ChainBroken { sequence, detail },
        }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed, hash-chained audit store.
#[derive(Clone)]
pub struct SqliteAuditStore {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteAuditStore {
    /// Opens (creating if absent) a `SQLite` audit store at the configured
    /// path.
    ///
    /// # Errors
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(config)?;
        initialize_schema(&mut connection)?;
        Ok(Self { connection: Arc::new(Mutex::new(connection)) })
    }
}

impl AuditSink for SqliteAuditStore {
    fn append(
        &self,
        analysis_id: AnalysisId,
        claim_id: &str,
        timestamp: &str,
        snapshot: ReportSnapshot,
    ) -> Result<AuditRecord, AuditError> {
        let mut guard = self.connection.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let tx = guard.transaction().map_err(|err| SqliteStoreError::Db(err.to_string()))?;

        let next_seq: i64 = tx
            .query_row("SELECT COALESCE(MAX(sequence_number), -1) + 1 FROM audit_records", params![], |row| row.get(0))
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let previous_hash: String = tx
            .query_row(
                "SELECT chain_hash FROM audit_records ORDER BY sequence_number DESC LIMIT 1",
                params![],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?
            .unwrap_or_else(|| GENESIS_HASH.to_string());

        let snapshot_json = serde_json::to_string(&snapshot).map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        let sequence_number = u64::try_from(next_seq).unwrap_or(u64::MAX);
        let record = AuditRecord::next(sequence_number, analysis_id, claim_id, timestamp, snapshot, &previous_hash)
            .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;

        tx.execute(
            "INSERT INTO audit_records (sequence_number, analysis_id, claim_id, timestamp, snapshot_json, \
             content_hash, previous_hash, chain_hash) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                next_seq,
                record.analysis_id.to_string(),
                record.claim_id,
                record.timestamp,
                snapshot_json,
                record.content_hash,
                record.previous_hash,
                record.chain_hash,
            ],
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;

        Ok(record)
    }

    fn last_chain_hash(&self) -> Result<String, AuditError> {
        let guard = self.connection.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let hash: Option<String> = guard
            .query_row("SELECT chain_hash FROM audit_records ORDER BY sequence_number DESC LIMIT 1", params![], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        Ok(hash.unwrap_or_else(|| GENESIS_HASH.to_string()))
    }

    fn verify(&self, from_seq: u64, to_seq: u64) -> Result<Vec<u64>, AuditError> {
        let guard = self.connection.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut statement = guard
            .prepare(
                "SELECT sequence_number, analysis_id, claim_id, timestamp, snapshot_json, content_hash, \
                 previous_hash, chain_hash FROM audit_records WHERE sequence_number BETWEEN ?1 AND ?2 \
                 ORDER BY sequence_number ASC",
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;

        let from_i64 = i64::try_from(from_seq).unwrap_or(i64::MAX);
        let to_i64 = i64::try_from(to_seq).unwrap_or(i64::MAX);
        let rows = statement
            .query_map(params![from_i64, to_i64], |row| {
                let sequence_number: i64 = row.get(0)?;
                let analysis_id: String = row.get(1)?;
                let claim_id: String = row.get(2)?;
                let timestamp: String = row.get(3)?;
                let snapshot_json: String = row.get(4)?;
                let content_hash: String = row.get(5)?;
                let previous_hash: String = row.get(6)?;
                let chain_hash: String = row.get(7)?;
                Ok((sequence_number, analysis_id, claim_id, timestamp, snapshot_json, content_hash, previous_hash, chain_hash))
            })
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;

        let mut broken = Vec::new();
        let mut expected_previous: Option<String> = None;
        let mut expected_sequence: Option<u64> = None;
        for row in rows {
            let (sequence_number, analysis_id, claim_id, timestamp, snapshot_json, content_hash, previous_hash, chain_hash) =
                row.map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            let sequence_number = u64::try_from(sequence_number).unwrap_or(u64::MAX);

            let snapshot: ReportSnapshot =
                serde_json::from_str(&snapshot_json).map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
            let record = AuditRecord {
                sequence_number,
                analysis_id: parse_analysis_id(&analysis_id)
                    .map_err(|detail| SqliteStoreError::Corrupt { sequence: sequence_number, detail })?,
                claim_id,
                timestamp,
                snapshot,
                content_hash,
                previous_hash: previous_hash.clone(),
                chain_hash: chain_hash.clone(),
            };

            let links = expected_previous.as_ref().is_none_or(|expected| *expected == previous_hash);
            let gap_free = expected_sequence.is_none_or(|expected| expected == sequence_number);
            if !record.verify_self_consistent() || !links || !gap_free {
                broken.push(sequence_number);
            }
            expected_previous = Some(chain_hash);
            expected_sequence = Some(sequence_number + 1);
        }
        Ok(broken)
    }

    fn readiness(&self) -> Result<(), AuditError> {
        let guard = self.connection.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard
            .query_row("SELECT 1", params![], |_| Ok(()))
            .map_err(|err| AuditError::Sink(err.to_string()))
    }
}

fn parse_analysis_id(value: &str) -> Result<AnalysisId, String> {
    serde_json::from_value(serde_json::Value::String(value.to_string())).map_err(|err| err.to_string())
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    let path_string = path.display().to_string();
    if path_string.is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    if path.exists() && path.is_dir() {
        return Err(SqliteStoreError::Invalid("store path must be a file, not a directory".to_string()));
    }
    Ok(())
}

fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags).map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = FULL;").map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(connection)
}

/// Creates the audit table, indexes, and the triggers that reject any
/// `UPDATE` or `DELETE` against it.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    if version.is_none() {
        tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        tx.execute_batch(
            "CREATE TABLE IF NOT EXISTS audit_records (
                sequence_number INTEGER PRIMARY KEY,
                analysis_id TEXT NOT NULL,
                claim_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                snapshot_json TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                previous_hash TEXT NOT NULL,
                chain_hash TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_audit_records_claim_id ON audit_records (claim_id);
            CREATE TRIGGER IF NOT EXISTS audit_records_no_update
                BEFORE UPDATE ON audit_records
                BEGIN
                    SELECT RAISE(ABORT, 'audit records are immutable');
                END;
            CREATE TRIGGER IF NOT EXISTS audit_records_no_delete
                BEFORE DELETE ON audit_records
                BEGIN
                    SELECT RAISE(ABORT, 'audit records are immutable');
                END;",
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    }
    tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, SqliteAuditStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("audit.sqlite3");
        let store = SqliteAuditStore::open(&SqliteStoreConfig { path, busy_timeout_ms: 1_000 }).expect("opens");
        (dir, store)
    }

    fn snapshot() -> ReportSnapshot {
        ReportSnapshot {
            recommendation: "AUTO_APPROVE".to_string(),
            confidence_score: 0.9,
            risk_score: 0.1,
            assigned_queue: None,
            rule_engine_outcome: "PASS".to_string(),
            decision_trace_hash: None,
        }
    }

    #[test]
    fn appended_records_chain_to_their_predecessor() {
        let (_dir, store) = store();
        let first = store.append(AnalysisId::new(), "CLM-2026-000001", "2026-07-28T00:00:00Z", snapshot()).expect("appends");
        assert_eq!(first.sequence_number, 0);
        assert_eq!(first.previous_hash, GENESIS_HASH);

        let second = store.append(AnalysisId::new(), "CLM-2026-000002", "2026-07-28T00:05:00Z", snapshot()).expect("appends");
        assert_eq!(second.sequence_number, 1);
        assert_eq!(second.previous_hash, first.chain_hash);
        assert_eq!(store.last_chain_hash().expect("reads"), second.chain_hash);
    }

    #[test]
    fn verify_reports_no_breaks_for_an_untouched_chain() {
        let (_dir, store) = store();
        for index in 0 .. 5 {
            store.append(AnalysisId::new(), &format!("CLM-2026-{index:06}"), "2026-07-28T00:00:00Z", snapshot()).expect("appends");
        }
        let broken = store.verify(0, 4).expect("verifies");
        assert!(broken.is_empty());
    }

    #[test]
    fn verify_detects_a_sequence_gap_with_otherwise_consistent_hashes() {
        let (_dir, store) = store();
        store.append(AnalysisId::new(), "CLM-2026-000001", "2026-07-28T00:00:00Z", snapshot()).expect("appends");
        let second = store.append(AnalysisId::new(), "CLM-2026-000002", "2026-07-28T00:05:00Z", snapshot()).expect("appends");

        let gapped =
            AuditRecord::next(3, AnalysisId::new(), "CLM-2026-000003", "2026-07-28T00:10:00Z", snapshot(), &second.chain_hash)
                .expect("builds record");
        let snapshot_json = serde_json::to_string(&snapshot()).expect("serializes");
        let guard = store.connection.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard
            .execute(
                "INSERT INTO audit_records (sequence_number, analysis_id, claim_id, timestamp, snapshot_json, \
                 content_hash, previous_hash, chain_hash) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    3i64,
                    gapped.analysis_id.to_string(),
                    gapped.claim_id,
                    gapped.timestamp,
                    snapshot_json,
                    gapped.content_hash,
                    gapped.previous_hash,
                    gapped.chain_hash,
                ],
            )
            .expect("inserts gapped row");
        drop(guard);

        let broken = store.verify(0, 3).expect("verifies");
        assert_eq!(broken, vec![3]);
    }

    #[test]
    fn direct_sql_update_against_audit_records_is_rejected() {
        let (_dir, store) = store();
        store.append(AnalysisId::new(), "CLM-2026-000001", "2026-07-28T00:00:00Z", snapshot()).expect("appends");
        let guard = store.connection.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let result = guard.execute("UPDATE audit_records SET claim_id = 'TAMPERED' WHERE sequence_number = 0", params![]);
        assert!(result.is_err());
    }

    #[test]
    fn readiness_succeeds_on_an_open_connection() {
        let (_dir, store) = store();
        assert!(store.readiness().is_ok());
    }
}
