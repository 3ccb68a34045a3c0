// crates/dcal-core/src/core/trace.rs
// ============================================================================
// Module: Decision Trace
// Description: Ordered stage markers and decision entries accumulated
//              during synthesis, locked and integrity-hashed at completion.
// Purpose: Give every stage of the pipeline a place to record what
//          happened, then seal that record so it cannot be altered once
//          the claim's outcome is decided.
// Dependencies: serde, thiserror, crate::core::hashing
// ============================================================================

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::hashing::sha256_hex_of_canonical_json;

/// One stage boundary recorded during processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageMarker {
    /// Stage name (e.g. `"RULES_COMPLETED"`).
    pub stage_name: String,
    /// RFC3339 timestamp when the stage completed.
    pub timestamp: String,
    /// How long the stage took.
    pub duration: Duration,
    /// Free-form structured detail for this stage.
    pub details: std::collections::BTreeMap<String, String>,
}

/// One synthesis decision recorded during processing (e.g. a confidence
/// override or an amount guardrail trip).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionEntry {
    /// Decision category, e.g. `"CONFIDENCE_OVERRIDE"`.
    pub decision_type: String,
    /// Human-readable reason.
    pub reason: String,
    /// Structured supporting detail.
    pub details: std::collections::BTreeMap<String, String>,
    /// RFC3339 timestamp.
    pub timestamp: String,
}

/// Errors raised by [`DecisionTrace`] mutation methods.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TraceError {
    /// A write was attempted after the trace was locked.
    #[error("decision trace is locked; no further writes are permitted")]
    Locked,
}

/// Canonicalization input for the trace integrity hash — excludes the hash
/// field itself.
#[derive(Serialize)]
struct TraceHashInput<'a> {
    stages: &'a [StageMarker],
    decisions: &'a [DecisionEntry],
}

/// Ordered accumulation of stage markers and decision entries for one
/// claim's processing. Becomes immutable ("locked") at the end of
/// synthesis; subsequent writes are a [`TraceError::Locked`] error.
///
/// # Invariants
/// - Once [`DecisionTrace::lock`] is called, no further stage or decision
///   may be appended.
/// - `integrity_hash` after locking is SHA-256 of the canonical
///   serialization of `{stages, decisions}`, and locking twice yields the
///   same hash (idempotent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTrace {
    stages: Vec<StageMarker>,
    decisions: Vec<DecisionEntry>,
    locked: bool,
    integrity_hash: Option<String>,
}

impl DecisionTrace {
    /// Builds an empty, unlocked trace.
    #[must_use]
    pub fn new() -> Self {
        Self { stages: Vec::new(), decisions: Vec::new(), locked: false, integrity_hash: None }
    }

    /// Appends a stage marker.
    ///
    /// # Errors
    /// Returns [`TraceError::Locked`] if the trace is already locked.
    pub fn record_stage(&mut self, marker: StageMarker) -> Result<(), TraceError> {
        if self.locked {
            return Err(TraceError::Locked);
        }
        self.stages.push(marker);
        Ok(())
    }

    /// Appends a decision entry.
    ///
    /// # Errors
    /// Returns [`TraceError::Locked`] if the trace is already locked.
    pub fn record_decision(&mut self, entry: DecisionEntry) -> Result<(), TraceError> {
        if self.locked {
            return Err(TraceError::Locked);
        }
        self.decisions.push(entry);
        Ok(())
    }

    /// Locks the trace, computing (or returning the already-computed)
    /// integrity hash. Idempotent: locking an already-locked trace returns
    /// the same hash without modifying its contents.
    ///
    /// # Panics
    /// Never: canonicalization of this type's own fields cannot fail.
    pub fn lock(&mut self) -> &str {
        if !self.locked {
            let input = TraceHashInput { stages: &self.stages, decisions: &self.decisions };
            let hash = sha256_hex_of_canonical_json(&input).unwrap_or_default();
            self.integrity_hash = Some(hash);
            self.locked = true;
        }
        self.integrity_hash.as_deref().unwrap_or_default()
    }

    /// Returns whether the trace is locked.
    #[must_use]
    pub const fn is_locked(&self) -> bool {
        self.locked
    }

    /// Returns the integrity hash, if locked.
    #[must_use]
    pub fn integrity_hash(&self) -> Option<&str> {
        self.integrity_hash.as_deref()
    }

    /// Returns the recorded stage markers.
    #[must_use]
    pub fn stages(&self) -> &[StageMarker] {
        &self.stages
    }

    /// Returns the recorded decision entries.
    #[must_use]
    pub fn decisions(&self) -> &[DecisionEntry] {
        &self.decisions
    }
}

impl Default for DecisionTrace {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker(name: &str) -> StageMarker {
        StageMarker {
            stage_name: name.to_string(),
            timestamp: "2026-07-28T00:00:00Z".to_string(),
            duration: Duration::from_millis(1),
            details: std::collections::BTreeMap::new(),
        }
    }

    #[test]
    fn locking_twice_yields_identical_hash() {
        let mut trace = DecisionTrace::new();
        trace.record_stage(marker("RECEIVED")).expect("unlocked");
        let first = trace.lock().to_string();
        let second = trace.lock().to_string();
        assert_eq!(first, second);
    }

    #[test]
    fn write_after_lock_is_an_error() {
        let mut trace = DecisionTrace::new();
        trace.lock();
        let err = trace.record_stage(marker("RECEIVED")).unwrap_err();
        assert_eq!(err, TraceError::Locked);
    }
}
