// crates/dcal-core/src/runtime/degradation.rs
// ============================================================================
// Module: Degradation Manager
// Description: Component health snapshot and degradation level selection
//              (C8).
// Purpose: Fold a health snapshot into one of L0-L5, applying the strictest
//          matching level, and expose it as an atomically-read value for
//          the claim pipeline to consult once per claim.
// Dependencies: std::sync::atomic::AtomicU8
// ============================================================================

use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering;

/// Degradation level, lowest-precedence-wins (L0 is least severe). Variant
/// order matches `u8` encoding for the atomic holder below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum DegradationLevel {
    /// All dependencies healthy.
    Full = 0,
    /// At least one ML scorer is unhealthy.
    MlDegraded = 1,
    /// CPU, memory, or ingest queue depth exceeds its threshold.
    HighLoad = 2,
    /// Error rate exceeds 10%; ML is skipped entirely.
    RulesOnly = 3,
    /// The Rule Engine or Decision Synthesizer is unhealthy.
    ManualOnly = 4,
    /// The Audit Store is unhealthy; publication is suspended.
    Emergency = 5,
}

impl DegradationLevel {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Full,
            1 => Self::MlDegraded,
            2 => Self::HighLoad,
            3 => Self::RulesOnly,
            4 => Self::ManualOnly,
            _ => Self::Emergency,
        }
    }
}

/// A point-in-time read of every dependency's health, folded into a
/// [`DegradationLevel`] by [`select_level`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthSnapshot {
    /// Whether every configured ML scorer is healthy.
    pub any_ml_scorer_unhealthy: bool,
    /// CPU utilization in `[0, 1]`.
    pub cpu_utilization: f64,
    /// Memory utilization in `[0, 1]`.
    pub memory_utilization: f64,
    /// Current ingest queue depth.
    pub ingest_queue_depth: u64,
    /// Configured ingest queue depth threshold for L2.
    pub ingest_queue_depth_threshold: u64,
    /// Rolling error rate in `[0, 1]` across recent claims.
    pub error_rate: f64,
    /// Whether the Rule Engine or Decision Synthesizer is unhealthy.
    pub decision_engine_unhealthy: bool,
    /// Whether the Audit Store is unhealthy.
    pub audit_store_unhealthy: bool,
}

const HIGH_LOAD_UTILIZATION_THRESHOLD: f64 = 0.90;
const RULES_ONLY_ERROR_RATE_THRESHOLD: f64 = 0.10;

/// Selects the strictest matching [`DegradationLevel`] for a health
/// snapshot, per §4.8's ordered conditions (L5 takes precedence over L4,
/// down to L0).
#[must_use]
pub fn select_level(snapshot: &HealthSnapshot) -> DegradationLevel {
    if snapshot.audit_store_unhealthy {
        return DegradationLevel::Emergency;
    }
    if snapshot.decision_engine_unhealthy {
        return DegradationLevel::ManualOnly;
    }
    if snapshot.error_rate > RULES_ONLY_ERROR_RATE_THRESHOLD {
        return DegradationLevel::RulesOnly;
    }
    let high_load = snapshot.cpu_utilization > HIGH_LOAD_UTILIZATION_THRESHOLD
        || snapshot.memory_utilization > HIGH_LOAD_UTILIZATION_THRESHOLD
        || (snapshot.ingest_queue_depth_threshold > 0 && snapshot.ingest_queue_depth > snapshot.ingest_queue_depth_threshold);
    if high_load {
        return DegradationLevel::HighLoad;
    }
    if snapshot.any_ml_scorer_unhealthy {
        return DegradationLevel::MlDegraded;
    }
    DegradationLevel::Full
}

/// A many-reader, occasional-writer holder for the current degradation
/// level. Claims read it once at the start of processing; a level change
/// mid-claim never retroactively affects that claim (§4.12).
#[derive(Debug)]
pub struct DegradationState {
    level: AtomicU8,
}

impl DegradationState {
    /// Builds a holder starting at L0 Full.
    #[must_use]
    pub const fn new() -> Self {
        Self { level: AtomicU8::new(DegradationLevel::Full as u8) }
    }

    /// Reads the current level.
    #[must_use]
    pub fn current(&self) -> DegradationLevel {
        DegradationLevel::from_u8(self.level.load(Ordering::Acquire))
    }

    /// Publishes a newly selected level.
    pub fn update(&self, level: DegradationLevel) {
        self.level.store(level as u8, Ordering::Release);
    }
}

impl Default for DegradationState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_unhealthy_dominates_every_other_condition() {
        let snapshot = HealthSnapshot {
            audit_store_unhealthy: true,
            decision_engine_unhealthy: true,
            error_rate: 1.0,
            ..HealthSnapshot::default()
        };
        assert_eq!(select_level(&snapshot), DegradationLevel::Emergency);
    }

    #[test]
    fn healthy_snapshot_selects_full() {
        assert_eq!(select_level(&HealthSnapshot::default()), DegradationLevel::Full);
    }

    #[test]
    fn high_queue_depth_selects_high_load() {
        let snapshot = HealthSnapshot { ingest_queue_depth: 6000, ingest_queue_depth_threshold: 5000, ..HealthSnapshot::default() };
        assert_eq!(select_level(&snapshot), DegradationLevel::HighLoad);
    }

    #[test]
    fn degradation_state_read_once_does_not_change_mid_read() {
        let state = DegradationState::new();
        let observed = state.current();
        state.update(DegradationLevel::Emergency);
        assert_eq!(observed, DegradationLevel::Full);
        assert_eq!(state.current(), DegradationLevel::Emergency);
    }
}
