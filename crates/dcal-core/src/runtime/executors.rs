// crates/dcal-core/src/runtime/executors.rs
// ============================================================================
// Module: Degraded-mode Executors
// Description: Per-degradation-level strategy selection (C12).
// Purpose: Translate a `DegradationLevel`, read once at claim start, into a
//          concrete plan the pipeline follows for that claim: whether ML is
//          invoked, whether auto decisions stay available, and whether
//          publication is suppressed.
// Dependencies: crate::runtime::degradation
// ============================================================================

use crate::runtime::degradation::DegradationLevel;

/// The execution plan selected for one claim at the moment processing
/// begins. A later change in [`DegradationLevel`] never mutates an
/// in-flight claim's plan (§4.12).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutorPlan {
    /// Whether the ML Scorer Interface is invoked at all for this claim.
    pub invoke_ml: bool,
    /// Whether every claim under this plan is forced to `MANUAL_REVIEW`
    /// regardless of rule/ML outcome.
    pub force_manual_review: bool,
    /// Multiplier applied to `auto_approve_ml_threshold` (L2 tightens it by
    /// 50%; `1.0` elsewhere).
    pub auto_approve_ml_threshold_multiplier: f64,
    /// Whether an otherwise-eligible `PASS` may still auto-approve only
    /// when the claim's billed amount is small (L3 Rules-only).
    pub auto_approve_requires_small_amount: bool,
    /// Amount ceiling applied when `auto_approve_requires_small_amount` is
    /// set.
    pub small_amount_ceiling: f64,
    /// Whether the Result Publisher is bypassed; the report is journaled
    /// locally instead (L5 Emergency).
    pub suppress_publish: bool,
}

const FULL_PLAN: ExecutorPlan = ExecutorPlan {
    invoke_ml: true,
    force_manual_review: false,
    auto_approve_ml_threshold_multiplier: 1.0,
    auto_approve_requires_small_amount: false,
    small_amount_ceiling: 0.0,
    suppress_publish: false,
};

/// Default amount ceiling for L3 Rules-only auto-approval.
pub const DEFAULT_RULES_ONLY_SMALL_AMOUNT_CEILING: f64 = 500.0;

/// Selects the [`ExecutorPlan`] for `level`, consulted once per claim at
/// the start of processing.
#[must_use]
pub fn select_executor(level: DegradationLevel) -> ExecutorPlan {
    match level {
        DegradationLevel::Full => FULL_PLAN,
        DegradationLevel::MlDegraded => ExecutorPlan { invoke_ml: true, ..FULL_PLAN },
        DegradationLevel::HighLoad => {
            ExecutorPlan { auto_approve_ml_threshold_multiplier: 0.5, ..FULL_PLAN }
        }
        DegradationLevel::RulesOnly => ExecutorPlan {
            invoke_ml: false,
            auto_approve_requires_small_amount: true,
            small_amount_ceiling: DEFAULT_RULES_ONLY_SMALL_AMOUNT_CEILING,
            ..FULL_PLAN
        },
        DegradationLevel::ManualOnly => {
            ExecutorPlan { invoke_ml: false, force_manual_review: true, ..FULL_PLAN }
        }
        DegradationLevel::Emergency => ExecutorPlan {
            invoke_ml: false,
            force_manual_review: true,
            suppress_publish: true,
            ..FULL_PLAN
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_plan_invokes_ml_without_restriction() {
        let plan = select_executor(DegradationLevel::Full);
        assert!(plan.invoke_ml);
        assert!(!plan.force_manual_review);
    }

    #[test]
    fn high_load_tightens_auto_approve_threshold() {
        let plan = select_executor(DegradationLevel::HighLoad);
        assert_eq!(plan.auto_approve_ml_threshold_multiplier, 0.5);
    }

    #[test]
    fn rules_only_skips_ml_and_caps_auto_approve_amount() {
        let plan = select_executor(DegradationLevel::RulesOnly);
        assert!(!plan.invoke_ml);
        assert!(plan.auto_approve_requires_small_amount);
    }

    #[test]
    fn emergency_suppresses_publish_and_forces_manual_review() {
        let plan = select_executor(DegradationLevel::Emergency);
        assert!(plan.force_manual_review);
        assert!(plan.suppress_publish);
    }
}
