// crates/dcal-core/src/interfaces/mod.rs
// ============================================================================
// Module: Runtime Interfaces
// Description: Backend-agnostic traits the runtime stages depend on.
// Purpose: Let the Audit Store, Result Publisher, and ML Scorer be swapped
//          (SQLite vs. another store, a message broker vs. a stub, a real
//          model host vs. a test double) without touching pipeline logic.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Implementations must fail closed: an unreachable audit store or
//! publisher is reported as an error, never silently swallowed, since the
//! pipeline's degradation manager decides what to do with that error.

use thiserror::Error;

use crate::core::audit::AuditRecord;
use crate::core::audit::ReportSnapshot;
use crate::core::claim::Claim;
use crate::core::identifiers::AnalysisId;
use crate::core::ml::MLEngineResult;
use crate::core::ml::ModelResult;
use crate::core::report::IntelligenceReport;

/// Errors raised by an [`AuditSink`] implementation.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The sink could not be reached or the write did not durably commit.
    #[error("audit sink error: {0}")]
    Sink(String),
    /// The chain's previous-hash lookup found a gap or mismatch.
    #[error("audit chain broken at sequence {sequence}: {detail}")]
    ChainBroken {
        /// The sequence number at which the break was detected.
        sequence: u64,
        /// Human-readable detail.
        detail: String,
    },
}

/// Authoritative, append-only store for [`AuditRecord`]s (C7).
///
/// `append` takes only the fields a caller can know in advance: the
/// sequence number and previous chain hash are read and assigned inside
/// the implementation's own transaction, so two pipeline instances
/// racing to append never observe or reuse the same sequence number. The
/// returned [`AuditRecord`] carries the sequence number and chain hash
/// the store actually assigned.
pub trait AuditSink {
    /// Appends the next record in the chain, atomically allocating its
    /// sequence number and reading the prior `chain_hash` (or
    /// [`crate::core::audit::GENESIS_HASH`] for the first record) within
    /// the same transaction.
    ///
    /// # Errors
    /// Returns [`AuditError`] when the write cannot be durably committed.
    fn append(
        &self,
        analysis_id: AnalysisId,
        claim_id: &str,
        timestamp: &str,
        snapshot: ReportSnapshot,
    ) -> Result<AuditRecord, AuditError>;

    /// Returns the most recently appended record's `chain_hash`, or
    /// [`crate::core::audit::GENESIS_HASH`] if the chain is empty.
    ///
    /// # Errors
    /// Returns [`AuditError`] when the store cannot be read.
    fn last_chain_hash(&self) -> Result<String, AuditError>;

    /// Verifies the chain between two sequence numbers, returning the
    /// sequence numbers of any records whose stored hash does not match a
    /// fresh recomputation, whose `previous_hash` does not link to the
    /// prior record's `chain_hash`, or whose `sequence_number` leaves a gap
    /// in the range.
    ///
    /// # Errors
    /// Returns [`AuditError`] when the store cannot be read.
    fn verify(&self, from_seq: u64, to_seq: u64) -> Result<Vec<u64>, AuditError>;

    /// Reports store readiness for health checks.
    ///
    /// # Errors
    /// Returns [`AuditError`] when the store is unavailable.
    fn readiness(&self) -> Result<(), AuditError> {
        Ok(())
    }
}

/// Errors raised by a [`ReportPublisher`] implementation.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The outbound channel rejected or could not accept the report.
    #[error("publish error: {0}")]
    Channel(String),
    /// The publisher's outbound buffer is full; caller should apply
    /// backpressure or spill to the durable outbox.
    #[error("publisher buffer full")]
    BufferFull,
}

/// Publishes completed [`IntelligenceReport`]s to downstream systems (C10).
pub trait ReportPublisher {
    /// Publishes a report, at-least-once, deduplicated downstream by
    /// `analysis_id`.
    ///
    /// # Errors
    /// Returns [`PublishError`] when the report cannot be enqueued.
    fn publish(&self, report: &IntelligenceReport) -> Result<(), PublishError>;

    /// Replays everything currently sitting in the durable outbox.
    ///
    /// # Errors
    /// Returns [`PublishError`] when replay cannot proceed.
    fn replay_outbox(&self) -> Result<u64, PublishError>;
}

/// Errors raised by an [`MlScorer`] implementation.
#[derive(Debug, Error)]
pub enum ScorerError {
    /// The model host returned an error or malformed response.
    #[error("scorer error for model {model_id}: {detail}")]
    Failed {
        /// The model that failed.
        model_id: String,
        /// Human-readable detail.
        detail: String,
    },
    /// The scorer did not respond within its allotted budget.
    #[error("scorer timed out for model {model_id}")]
    TimedOut {
        /// The model that timed out.
        model_id: String,
    },
}

/// A single configured ML model, scored independently and fanned out in
/// parallel by the runtime (C4). Treated as an opaque black box: this
/// trait defines only the call contract, not model internals.
pub trait MlScorer {
    /// Scores one claim, returning this model's contribution.
    ///
    /// # Errors
    /// Returns [`ScorerError`] when scoring fails or times out.
    fn score(&self, claim: &Claim) -> Result<ModelResult, ScorerError>;
}

/// Fans a claim out to every configured [`MlScorer`] and aggregates their
/// results into an [`MLEngineResult`]. Implemented by the runtime's ML
/// Scorer Interface; exposed here so pipeline code can depend on the
/// trait rather than the concrete fan-out strategy.
pub trait MlEngine {
    /// Scores a claim across all configured models within the ML budget,
    /// substituting [`ModelResult::degraded`] for any model that fails,
    /// times out, or is cancelled due to budget exhaustion.
    fn score_claim(&self, claim: &Claim) -> MLEngineResult;
}
