// crates/dcal-core/src/runtime/queue_router.rs
// ============================================================================
// Module: Queue Router & SLA
// Description: Maps a MANUAL_REVIEW outcome to a review queue and deadline
//              (C6).
// Purpose: Apply the queue mapping rules and capacity fallback, then look
//          up the SLA hours for the resolved `(priority, queue)` pair.
// Dependencies: crate::core::{report, rule}
// ============================================================================

use std::collections::BTreeMap;

use crate::core::report::Priority;
use crate::core::report::ReviewQueue;
use crate::core::rule::RuleCategory;
use crate::core::rule::RuleResult;

/// Per-queue capacity snapshot consulted by the capacity fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueCapacity {
    /// Claims currently assigned to the queue.
    pub in_flight: u32,
    /// Configured maximum capacity.
    pub capacity: u32,
}

impl QueueCapacity {
    fn at_or_above_90_percent(self) -> bool {
        self.capacity > 0 && self.in_flight * 10 >= self.capacity * 9
    }
}

/// Resolves the review queue for a `MANUAL_REVIEW` outcome per the
/// mapping rules in §4.6, in order: fraud signal → `FRAUD_INVESTIGATION`;
/// medical-necessity/coding + high amount → `MEDICAL_DIRECTOR`;
/// policy/compliance → `COMPLIANCE_REVIEW`; high amount or many triggered
/// rules → `SENIOR_REVIEW`; else `STANDARD_REVIEW`. Then applies the
/// capacity fallback (`STANDARD_REVIEW` at ≥90% capacity escalates to
/// `SENIOR_REVIEW`).
#[must_use]
pub fn resolve_queue(
    triggered: &[RuleResult],
    combined_risk_score: f64,
    billed_amount: f64,
    senior_review_amount_threshold: f64,
    medical_director_amount_threshold: f64,
    capacities: &BTreeMap<ReviewQueue, QueueCapacity>,
) -> ReviewQueue {
    let has_fraud_tag = triggered.iter().any(|r| r.category == RuleCategory::DuplicateDetection)
        || triggered.iter().any(|r| r.details.get("fraud_signal").map(String::as_str) == Some("true"));

    let queue = if has_fraud_tag || combined_risk_score >= 0.70 {
        ReviewQueue::FraudInvestigation
    } else if triggered.iter().any(|r| r.category == RuleCategory::CodingValidation) && billed_amount > medical_director_amount_threshold {
        ReviewQueue::MedicalDirector
    } else if triggered.iter().any(|r| matches!(r.category, RuleCategory::PolicyCoverage)) {
        ReviewQueue::ComplianceReview
    } else if billed_amount > senior_review_amount_threshold || triggered.len() >= 3 {
        ReviewQueue::SeniorReview
    } else {
        ReviewQueue::StandardReview
    };

    if queue == ReviewQueue::StandardReview {
        if let Some(capacity) = capacities.get(&queue) {
            if capacity.at_or_above_90_percent() {
                return ReviewQueue::SeniorReview;
            }
        }
    }
    queue
}

/// Looks up SLA hours for a `(priority, queue)` pair. Default table ranges
/// from 4h (CRITICAL/fraud) to 120h (LOW/standard); callers may supply an
/// override table (from configuration) via `overrides`.
#[must_use]
pub fn sla_hours(priority: Priority, queue: ReviewQueue, overrides: &BTreeMap<(Priority, ReviewQueue), u32>) -> u32 {
    if let Some(hours) = overrides.get(&(priority, queue)) {
        return *hours;
    }
    match (priority, queue) {
        (Priority::Critical, ReviewQueue::FraudInvestigation) => 4,
        (Priority::Critical, _) => 8,
        (Priority::High, ReviewQueue::FraudInvestigation) => 8,
        (Priority::High, _) => 24,
        (Priority::Medium, _) => 48,
        (Priority::Low, ReviewQueue::StandardReview) => 120,
        (Priority::Low, _) => 72,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identifiers::RuleId;
    use crate::core::rule::RuleOutcome;
    use crate::core::rule::Severity;
    use std::time::Duration;

    fn triggered_rule(category: RuleCategory) -> RuleResult {
        RuleResult {
            rule_id: RuleId::from("R-1"),
            rule_version: "1.0.0".to_string(),
            category,
            outcome: RuleOutcome::Flag,
            severity: Severity::Major,
            message: String::new(),
            details: BTreeMap::new(),
            execution_time: Duration::ZERO,
            input_snapshot: BTreeMap::new(),
            expression_evaluated: String::new(),
            parameter_values: BTreeMap::new(),
            skip_reason: None,
        }
    }

    #[test]
    fn duplicate_detection_routes_to_fraud_investigation() {
        let triggered = vec![triggered_rule(RuleCategory::DuplicateDetection)];
        let queue = resolve_queue(&triggered, 0.1, 100.0, 50_000.0, 50_000.0, &BTreeMap::new());
        assert_eq!(queue, ReviewQueue::FraudInvestigation);
    }

    #[test]
    fn capacity_fallback_escalates_standard_to_senior() {
        let mut capacities = BTreeMap::new();
        capacities.insert(ReviewQueue::StandardReview, QueueCapacity { in_flight: 95, capacity: 100 });
        let queue = resolve_queue(&[], 0.1, 100.0, 50_000.0, 50_000.0, &capacities);
        assert_eq!(queue, ReviewQueue::SeniorReview);
    }

    #[test]
    fn sla_table_covers_critical_fraud_and_low_standard() {
        let overrides = BTreeMap::new();
        assert_eq!(sla_hours(Priority::Critical, ReviewQueue::FraudInvestigation, &overrides), 4);
        assert_eq!(sla_hours(Priority::Low, ReviewQueue::StandardReview, &overrides), 120);
    }
}
