// crates/dcal-core/src/diagnostics.rs
// ============================================================================
// Module: Operational Journal
// Description: Non-authoritative structured JSON-lines diagnostic records
//              (§10.2).
// Purpose: Give ingestion, the rule engine, the breaker, and the
//          degradation manager one narrow way to surface operator-facing
//          detail, distinct from the audit trail.
// Dependencies: serde, serde_json, std::io::Write
// ============================================================================

use std::collections::BTreeMap;
use std::io::Write as _;

use serde::Serialize;

/// Journal record severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JournalLevel {
    /// Routine progress detail, gated per-category.
    Debug,
    /// Normal operational event.
    Info,
    /// A recoverable anomaly.
    Warn,
    /// A failure that affected the claim's outcome.
    Error,
}

/// One structured journal record.
#[derive(Debug, Clone, Serialize)]
pub struct JournalRecord {
    /// RFC3339 timestamp.
    pub timestamp: String,
    /// Record severity.
    pub level: JournalLevel,
    /// Pipeline stage that emitted the record.
    pub stage: String,
    /// Claim identifier, when the record is claim-scoped.
    pub claim_id: Option<String>,
    /// Analysis identifier, when available.
    pub analysis_id: Option<String>,
    /// Human-readable message.
    pub message: String,
    /// Free-form structured detail.
    pub fields: BTreeMap<String, String>,
}

/// Per-category toggles gating noisy journal categories, mirroring the
/// teacher's `log_precheck_payloads`-style boolean switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct JournalToggles {
    /// Log the rule snapshot considered for each claim.
    pub log_rule_snapshots: bool,
    /// Log per-model ML scores.
    pub log_ml_scores: bool,
    /// Log every ingestion envelope, including rejected ones.
    pub log_ingestion_envelopes: bool,
}

/// A sink for operational journal records. `Stdout`/`Stderr` writes are
/// forbidden by the workspace lint policy; implementations write
/// elsewhere (a file, a channel, nothing at all).
pub trait JournalWriter: Send + Sync {
    /// Appends one record. Errors are swallowed by callers — the journal
    /// is diagnostic, never load-bearing.
    fn write(&self, record: &JournalRecord);
}

/// A no-op journal, used in tests and wherever diagnostics are disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullJournal;

impl JournalWriter for NullJournal {
    fn write(&self, _record: &JournalRecord) {}
}

impl<T: JournalWriter + ?Sized> JournalWriter for std::sync::Arc<T> {
    fn write(&self, record: &JournalRecord) {
        (**self).write(record);
    }
}

/// A file-backed journal writing newline-delimited JSON, appending under a
/// mutex to keep concurrent writers from interleaving lines.
pub struct FileJournal {
    file: std::sync::Mutex<std::fs::File>,
}

impl FileJournal {
    /// Opens (creating if absent) `path` for append.
    ///
    /// # Errors
    /// Returns the underlying [`std::io::Error`] if the file cannot be
    /// opened for append.
    pub fn open(path: &std::path::Path) -> std::io::Result<Self> {
        let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file: std::sync::Mutex::new(file) })
    }
}

impl JournalWriter for FileJournal {
    fn write(&self, record: &JournalRecord) {
        let Ok(mut line) = serde_json::to_string(record) else {
            return;
        };
        line.push('\n');
        let mut guard = self.file.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let _ = guard.write_all(line.as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> JournalRecord {
        JournalRecord {
            timestamp: "2026-07-28T00:00:00Z".to_string(),
            level: JournalLevel::Info,
            stage: "INGESTION".to_string(),
            claim_id: Some("CLM-2026-000001".to_string()),
            analysis_id: None,
            message: "accepted".to_string(),
            fields: BTreeMap::new(),
        }
    }

    #[test]
    fn null_journal_never_panics() {
        NullJournal.write(&record());
    }

    #[test]
    fn file_journal_appends_one_line_per_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("journal.ndjson");
        let journal = FileJournal::open(&path).expect("opens");
        journal.write(&record());
        journal.write(&record());
        let contents = std::fs::read_to_string(&path).expect("reads");
        assert_eq!(contents.lines().count(), 2);
    }
}
