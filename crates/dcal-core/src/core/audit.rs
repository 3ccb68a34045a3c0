// crates/dcal-core/src/core/audit.rs
// ============================================================================
// Module: Audit Record
// Description: The hash-chained, append-only record type written to the
//              authoritative Audit Store for every claim decision.
// Purpose: Give every stored record a tamper-evident link to the one
//          before it, so a broken chain is detectable without trusting
//          the storage layer.
// Dependencies: serde, crate::core::{hashing, identifiers, report}
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::hashing::chain_hash;
use crate::core::hashing::sha256_hex_of_canonical_json;
use crate::core::identifiers::AnalysisId;
use crate::core::report::IntelligenceReport;

/// The fields of an [`IntelligenceReport`] that are snapshotted into an
/// audit record, excluding the decision trace (stored separately since it
/// already carries its own integrity hash).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSnapshot {
    /// Final recommendation, serialized as its `SCREAMING_SNAKE_CASE` name.
    pub recommendation: String,
    /// Joint confidence score at the time of decision.
    pub confidence_score: f64,
    /// Combined risk score at the time of decision.
    pub risk_score: f64,
    /// Assigned queue, if any.
    pub assigned_queue: Option<String>,
    /// Rule engine aggregate outcome.
    pub rule_engine_outcome: String,
    /// Decision trace integrity hash, cross-referenced rather than
    /// duplicated.
    pub decision_trace_hash: Option<String>,
}

impl ReportSnapshot {
    /// Builds a snapshot from a sealed report. The report's trace must
    /// already be locked; an unlocked trace snapshots a `None` hash.
    #[must_use]
    pub fn from_report(report: &IntelligenceReport) -> Self {
        Self {
            recommendation: report.recommendation.as_label().to_string(),
            confidence_score: report.confidence_score,
            risk_score: report.risk_score,
            assigned_queue: report.assigned_queue.map(|q| q.as_label().to_string()),
            rule_engine_outcome: report.rule_engine_outcome.as_label().to_string(),
            decision_trace_hash: report.decision_trace.integrity_hash().map(str::to_string),
        }
    }
}

/// One immutable, hash-chained entry in the authoritative Audit Store.
///
/// # Invariants
/// - `sequence_number` is strictly increasing within a single audit chain,
///   assigned transactionally by the storage layer.
/// - `content_hash = SHA256(canonical_json({analysis_id, claim_id,
///   timestamp, snapshot}))`.
/// - `chain_hash = SHA256(content_hash || previous_hash)`, where
///   `previous_hash` is the prior record's `chain_hash` (or a fixed genesis
///   value for `sequence_number == 0`).
/// - Once written, a record is never updated or deleted; the storage layer
///   enforces this, not this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Monotonic sequence number within the chain.
    pub sequence_number: u64,
    /// The analysis run this record documents.
    pub analysis_id: AnalysisId,
    /// The claim this record documents.
    pub claim_id: String,
    /// RFC3339 timestamp when the record was appended.
    pub timestamp: String,
    /// Snapshot of the decided report's fields.
    pub snapshot: ReportSnapshot,
    /// SHA-256 of the canonical JSON of the fields above.
    pub content_hash: String,
    /// The previous record's `chain_hash`, or the genesis value.
    pub previous_hash: String,
    /// `SHA256(content_hash || previous_hash)`.
    pub chain_hash: String,
}

/// Fixed previous-hash value for the first record in a chain.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000";

#[derive(Serialize)]
struct ContentHashInput<'a> {
    analysis_id: &'a AnalysisId,
    claim_id: &'a str,
    timestamp: &'a str,
    snapshot: &'a ReportSnapshot,
}

impl AuditRecord {
    /// Builds the next record in a chain given the previous record's chain
    /// hash (or [`GENESIS_HASH`] for the first record).
    ///
    /// # Errors
    /// Returns the underlying serialization error if the snapshot cannot be
    /// canonicalized (never fails for ordinary data).
    pub fn next(
        sequence_number: u64,
        analysis_id: AnalysisId,
        claim_id: impl Into<String>,
        timestamp: impl Into<String>,
        snapshot: ReportSnapshot,
        previous_hash: &str,
    ) -> Result<Self, serde_json::Error> {
        let claim_id = claim_id.into();
        let timestamp = timestamp.into();
        let content_hash = sha256_hex_of_canonical_json(&ContentHashInput {
            analysis_id: &analysis_id,
            claim_id: &claim_id,
            timestamp: &timestamp,
            snapshot: &snapshot,
        })?;
        let chain = chain_hash(&content_hash, previous_hash);
        Ok(Self {
            sequence_number,
            analysis_id,
            claim_id,
            timestamp,
            snapshot,
            content_hash,
            previous_hash: previous_hash.to_string(),
            chain_hash: chain,
        })
    }

    /// Recomputes `content_hash` and `chain_hash` from this record's own
    /// fields and compares them to the stored values. Used by the audit
    /// chain verifier to detect tampering or corruption.
    #[must_use]
    pub fn verify_self_consistent(&self) -> bool {
        let recomputed_content = sha256_hex_of_canonical_json(&ContentHashInput {
            analysis_id: &self.analysis_id,
            claim_id: &self.claim_id,
            timestamp: &self.timestamp,
            snapshot: &self.snapshot,
        })
        .unwrap_or_default();
        if recomputed_content != self.content_hash {
            return false;
        }
        chain_hash(&self.content_hash, &self.previous_hash) == self.chain_hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> ReportSnapshot {
        ReportSnapshot {
            recommendation: "AutoApprove".to_string(),
            confidence_score: 0.9,
            risk_score: 0.1,
            assigned_queue: None,
            rule_engine_outcome: "Pass".to_string(),
            decision_trace_hash: Some("abc".to_string()),
        }
    }

    #[test]
    fn chain_links_to_previous_record() {
        let first = AuditRecord::next(
            0,
            AnalysisId::new(),
            "CLM-2026-000001",
            "2026-07-28T00:00:00Z",
            snapshot(),
            GENESIS_HASH,
        )
        .expect("builds");
        let second = AuditRecord::next(
            1,
            AnalysisId::new(),
            "CLM-2026-000002",
            "2026-07-28T00:05:00Z",
            snapshot(),
            &first.chain_hash,
        )
        .expect("builds");
        assert_eq!(second.previous_hash, first.chain_hash);
        assert!(first.verify_self_consistent());
        assert!(second.verify_self_consistent());
    }

    #[test]
    fn tampered_content_fails_self_consistency() {
        let mut record = AuditRecord::next(
            0,
            AnalysisId::new(),
            "CLM-2026-000001",
            "2026-07-28T00:00:00Z",
            snapshot(),
            GENESIS_HASH,
        )
        .expect("builds");
        record.snapshot.risk_score = 0.99;
        assert!(!record.verify_self_consistent());
    }
}
