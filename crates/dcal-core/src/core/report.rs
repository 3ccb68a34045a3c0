// crates/dcal-core/src/core/report.rs
// ============================================================================
// Module: Intelligence Report
// Description: The pipeline's final, sealed output for one claim.
// Purpose: Carry the recommendation, routing, explanations, and trace the
//          Decision Synthesizer produces, with the invariants that tie
//          `recommendation` to the rule and ML outcomes.
// Dependencies: serde, std::time::Duration, crate::core::{identifiers,
//               rule, ml, trace}
// ============================================================================

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::AnalysisId;
use crate::core::ml::MLEngineResult;
use crate::core::rule::AggregateOutcome;
use crate::core::trace::DecisionTrace;

/// The pipeline's final recommendation for a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    /// Auto-approved without human review.
    AutoApprove,
    /// Routed to a human review queue.
    ManualReview,
    /// Auto-declined without human review.
    AutoDecline,
}

impl Recommendation {
    /// The `SCREAMING_SNAKE_CASE` label used in serialized form and audit
    /// snapshots.
    #[must_use]
    pub const fn as_label(self) -> &'static str {
        match self {
            Self::AutoApprove => "AUTO_APPROVE",
            Self::ManualReview => "MANUAL_REVIEW",
            Self::AutoDecline => "AUTO_DECLINE",
        }
    }
}

/// Review priority, descending severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    /// Lowest priority.
    Low,
    /// Medium priority.
    Medium,
    /// High priority.
    High,
    /// Highest priority.
    Critical,
}

/// Review queue assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewQueue {
    /// Auto-approved claims route here for record-keeping only.
    AutoProcess,
    /// Default human review queue.
    StandardReview,
    /// Escalated review for high-value or high-count-trigger claims.
    SeniorReview,
    /// Suspected fraud.
    FraudInvestigation,
    /// Requires clinical judgment.
    MedicalDirector,
    /// Requires compliance judgment.
    ComplianceReview,
}

impl ReviewQueue {
    /// The `SCREAMING_SNAKE_CASE` label used in serialized form and audit
    /// snapshots.
    #[must_use]
    pub const fn as_label(self) -> &'static str {
        match self {
            Self::AutoProcess => "AUTO_PROCESS",
            Self::StandardReview => "STANDARD_REVIEW",
            Self::SeniorReview => "SENIOR_REVIEW",
            Self::FraudInvestigation => "FRAUD_INVESTIGATION",
            Self::MedicalDirector => "MEDICAL_DIRECTOR",
            Self::ComplianceReview => "COMPLIANCE_REVIEW",
        }
    }
}

/// A risk indicator unifying rule-triggered and ML-derived signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskIndicator {
    /// Indicator source, e.g. `"RULE"` or `"ML"`.
    pub source: String,
    /// Indicator label.
    pub label: String,
    /// Indicator severity, used for descending sort.
    pub severity: Priority,
}

/// A related-claim reference surfaced for reviewer context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedClaim {
    /// The related claim's identifier.
    pub claim_id: String,
    /// Why it was surfaced (e.g. `"same member, same procedure, 1 day apart"`).
    pub reason: String,
}

/// The pipeline's final, sealed output for one claim.
///
/// # Invariants
/// - `AUTO_APPROVE` implies `rule_engine_outcome = PASS`,
///   `risk_score < auto_approve_ml_threshold`,
///   `confidence_score >= min_confidence_for_auto`, and
///   `billed_amount <= auto_approve_max_amount`.
/// - `AUTO_DECLINE` implies `rule_engine_outcome = FAIL`.
/// - Any other combination is `MANUAL_REVIEW`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntelligenceReport {
    /// UUIDv4 analysis identifier.
    pub analysis_id: AnalysisId,
    /// The claim this report analyzes.
    pub claim_id: String,
    /// RFC3339 completion timestamp.
    pub timestamp: String,
    /// Final recommendation.
    pub recommendation: Recommendation,
    /// Joint rule/ML confidence, `sqrt(rule_confidence * ml_confidence)`.
    pub confidence_score: f64,
    /// Combined risk score in `[0, 1]`.
    pub risk_score: f64,
    /// Assigned review queue, present for `MANUAL_REVIEW` and
    /// `AUTO_DECLINE` (routed to `FRAUD_INVESTIGATION` or
    /// `STANDARD_REVIEW`).
    pub assigned_queue: Option<ReviewQueue>,
    /// Review priority.
    pub priority: Priority,
    /// SLA hours for the assigned queue/priority pair.
    pub sla_hours: u32,
    /// The Rule Engine's aggregate outcome.
    pub rule_engine_outcome: AggregateOutcome,
    /// The ML Engine's full result.
    pub ml_engine_outcome: MLEngineResult,
    /// Primary reasons, prefixed by source and rule id.
    pub primary_reasons: Vec<String>,
    /// Secondary factors (PASSed non-INFO rules, ML anomaly summaries).
    pub secondary_factors: Vec<String>,
    /// Unified, severity-sorted risk indicators.
    pub risk_indicators: Vec<RiskIndicator>,
    /// Suggested reviewer actions.
    pub suggested_actions: Vec<String>,
    /// Related claims surfaced for reviewer context, top N by config.
    pub related_claims: Vec<RelatedClaim>,
    /// Free-form historical context summary.
    pub historical_context: String,
    /// The locked decision trace for this claim.
    pub decision_trace: DecisionTrace,
    /// Total processing time across all stages.
    pub processing_time: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_orders_descending_by_severity() {
        let mut priorities = [Priority::High, Priority::Low, Priority::Critical, Priority::Medium];
        priorities.sort();
        assert_eq!(priorities, [Priority::Low, Priority::Medium, Priority::High, Priority::Critical]);
    }
}
