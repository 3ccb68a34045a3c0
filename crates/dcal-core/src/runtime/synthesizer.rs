// crates/dcal-core/src/runtime/synthesizer.rs
// ============================================================================
// Module: Decision Synthesizer
// Description: Combines rule and ML results into the Intelligence Report
//              (C5): precedence, confidence gate, amount guardrail, risk
//              score, explanations, trace lock.
// Dependencies: crate::core::{claim, rule, ml, report, trace, identifiers},
//               crate::runtime::queue_router
// ============================================================================

use std::collections::BTreeMap;
use std::time::Duration;
use std::time::Instant;

use crate::core::claim::Claim;
use crate::core::identifiers::AnalysisId;
use crate::core::ml::MLEngineResult;
use crate::core::report::IntelligenceReport;
use crate::core::report::Priority;
use crate::core::report::Recommendation;
use crate::core::report::RelatedClaim;
use crate::core::report::ReviewQueue;
use crate::core::report::RiskIndicator;
use crate::core::rule::AggregateOutcome;
use crate::core::rule::RuleEngineResult;
use crate::core::rule::RuleOutcome;
use crate::core::rule::RuleResult;
use crate::core::rule::Severity;
use crate::core::trace::DecisionEntry;
use crate::core::trace::DecisionTrace;
use crate::core::trace::StageMarker;
use crate::runtime::queue_router::QueueCapacity;
use crate::runtime::queue_router::resolve_queue;
use crate::runtime::queue_router::sla_hours;

/// Threshold configuration consulted by synthesis (§9's "monkey-patched
/// thresholds" redesign flag: read-only, passed in at construction).
#[derive(Debug, Clone, Copy)]
pub struct SynthesisThresholds {
    /// ML risk score at/above which a MANUAL_REVIEW routes to
    /// `FRAUD_INVESTIGATION` (default 0.70).
    pub high_risk_threshold: f64,
    /// ML risk score at/above which a MANUAL_REVIEW routes to
    /// `SENIOR_REVIEW` (default 0.50).
    pub medium_risk_threshold: f64,
    /// ML risk score below which auto-approval is considered (default
    /// 0.30).
    pub auto_approve_ml_threshold: f64,
    /// Minimum joint confidence required to keep an auto decision
    /// (default 0.85).
    pub min_confidence_for_auto: f64,
    /// Maximum billed amount eligible for auto-approval.
    pub auto_approve_max_amount: f64,
    /// Billed amount above which `SENIOR_REVIEW` is selected.
    pub senior_review_amount_threshold: f64,
    /// Billed amount above which `MEDICAL_DIRECTOR` is selected for
    /// coding-validation triggers.
    pub medical_director_amount_threshold: f64,
    /// Top-N related claims to retain (config, default 5 — resolved open
    /// question, see `DESIGN.md`).
    pub related_claims_top_n: usize,
}

impl Default for SynthesisThresholds {
    fn default() -> Self {
        Self {
            high_risk_threshold: 0.70,
            medium_risk_threshold: 0.50,
            auto_approve_ml_threshold: 0.30,
            min_confidence_for_auto: 0.85,
            auto_approve_max_amount: 10_000.0,
            senior_review_amount_threshold: 50_000.0,
            medical_director_amount_threshold: 50_000.0,
            related_claims_top_n: 5,
        }
    }
}

const SEVERITY_WEIGHT_CRITICAL: f64 = 1.0;
const SEVERITY_WEIGHT_MAJOR: f64 = 0.7;
const SEVERITY_WEIGHT_MINOR: f64 = 0.4;
const SEVERITY_WEIGHT_INFO: f64 = 0.1;

/// Synthesizes an [`IntelligenceReport`] from a claim plus its rule and ML
/// results, per the seven stages of §4.5. `related_claims` is supplied
/// pre-ranked by the caller (the correlation lookup is outside this
/// crate's scope); only the configured top-N is retained.
#[must_use]
#[allow(clippy::too_many_arguments, reason = "mirrors the seven independently-configurable synthesis stages")]
pub fn synthesize(
    claim: &Claim,
    rule_result: &RuleEngineResult,
    ml_result: &MLEngineResult,
    thresholds: &SynthesisThresholds,
    queue_capacities: &BTreeMap<ReviewQueue, QueueCapacity>,
    sla_overrides: &BTreeMap<(Priority, ReviewQueue), u32>,
    related_claims: &[RelatedClaim],
    historical_context: String,
    timestamp: &str,
    mut trace: DecisionTrace,
) -> IntelligenceReport {
    let overall_started = Instant::now();

    // Stage 1: rule precedence.
    let stage1_started = Instant::now();
    let (mut recommendation, mut queue, mut priority) = match rule_result.aggregate_outcome {
        AggregateOutcome::Fail => {
            let fraud = any_fraud_triggered(&rule_result.triggered);
            if fraud {
                (Recommendation::AutoDecline, Some(ReviewQueue::FraudInvestigation), Priority::Critical)
            } else {
                (Recommendation::AutoDecline, Some(ReviewQueue::StandardReview), Priority::High)
            }
        }
        AggregateOutcome::Flag => {
            let queue = resolve_queue(
                &rule_result.triggered,
                ml_result.combined_risk_score,
                claim.billed_amount(),
                thresholds.senior_review_amount_threshold,
                thresholds.medical_director_amount_threshold,
                queue_capacities,
            );
            (Recommendation::ManualReview, Some(queue), priority_for_queue(queue))
        }
        AggregateOutcome::Pass => (Recommendation::AutoApprove, None, Priority::Low),
    };
    record_stage(&mut trace, "RULE_PRECEDENCE", stage1_started, timestamp);

    // Stage 2: ML decision (only reached when rules PASSed).
    let stage2_started = Instant::now();
    if rule_result.aggregate_outcome == AggregateOutcome::Pass {
        let r = ml_result.combined_risk_score;
        (recommendation, queue, priority) = if r >= thresholds.high_risk_threshold {
            (Recommendation::ManualReview, Some(ReviewQueue::FraudInvestigation), Priority::High)
        } else if r >= thresholds.medium_risk_threshold {
            (Recommendation::ManualReview, Some(ReviewQueue::SeniorReview), Priority::Medium)
        } else if r >= thresholds.auto_approve_ml_threshold || ml_result.requires_review {
            (Recommendation::ManualReview, Some(ReviewQueue::StandardReview), Priority::Low)
        } else {
            (Recommendation::AutoApprove, Some(ReviewQueue::AutoProcess), Priority::Low)
        };
    }
    record_stage(&mut trace, "ML_DECISION", stage2_started, timestamp);

    // Stage 3: confidence gate.
    let stage3_started = Instant::now();
    let rule_confidence = if rule_result.any_skipped() { 0.9 } else { 1.0 };
    let combined_confidence = (rule_confidence * ml_result.combined_confidence).sqrt().clamp(0.0, 1.0);
    if matches!(recommendation, Recommendation::AutoApprove | Recommendation::AutoDecline)
        && combined_confidence < thresholds.min_confidence_for_auto
    {
        let mut details = BTreeMap::new();
        details.insert("combined_confidence".to_string(), format!("{combined_confidence:.4}"));
        details.insert("threshold".to_string(), format!("{:.4}", thresholds.min_confidence_for_auto));
        let _ = trace.record_decision(DecisionEntry {
            decision_type: "CONFIDENCE_OVERRIDE".to_string(),
            reason: "combined confidence below minimum for an automatic decision".to_string(),
            details,
            timestamp: timestamp.to_string(),
        });
        match recommendation {
            Recommendation::AutoApprove => {
                recommendation = Recommendation::ManualReview;
                queue = Some(ReviewQueue::StandardReview);
            }
            Recommendation::AutoDecline => {
                recommendation = Recommendation::ManualReview;
                queue = Some(ReviewQueue::SeniorReview);
            }
            Recommendation::ManualReview => {}
        }
    }
    record_stage(&mut trace, "CONFIDENCE_GATE", stage3_started, timestamp);

    // Stage 4: amount guardrail.
    let stage4_started = Instant::now();
    if recommendation == Recommendation::AutoApprove && claim.billed_amount() > thresholds.auto_approve_max_amount {
        let mut details = BTreeMap::new();
        details.insert("billed_amount".to_string(), claim.billed_amount().to_string());
        details.insert("auto_approve_max_amount".to_string(), thresholds.auto_approve_max_amount.to_string());
        let _ = trace.record_decision(DecisionEntry {
            decision_type: "AMOUNT_GUARDRAIL".to_string(),
            reason: "billed amount exceeds the auto-approve cap".to_string(),
            details,
            timestamp: timestamp.to_string(),
        });
        recommendation = Recommendation::ManualReview;
        queue = Some(ReviewQueue::SeniorReview);
        priority = Priority::Medium;
    }
    record_stage(&mut trace, "AMOUNT_GUARDRAIL", stage4_started, timestamp);

    // Stage 5: risk score.
    let stage5_started = Instant::now();
    let rule_risk = match rule_result.aggregate_outcome {
        AggregateOutcome::Fail => 1.0,
        AggregateOutcome::Flag => rule_result
            .triggered
            .iter()
            .map(|r| severity_weight(r.severity))
            .fold(0.0_f64, f64::max),
        AggregateOutcome::Pass => 0.0,
    };
    let risk_score = if rule_risk > 0.0 {
        (rule_risk * 0.6).max(ml_result.combined_risk_score).clamp(0.0, 1.0)
    } else {
        ml_result.combined_risk_score.clamp(0.0, 1.0)
    };
    record_stage(&mut trace, "RISK_SCORE", stage5_started, timestamp);

    // Stage 6: explanations.
    let stage6_started = Instant::now();
    let primary_reasons = build_primary_reasons(&rule_result.triggered, rule_result.aggregate_outcome);
    let secondary_factors = build_secondary_factors(&rule_result.all_results, &ml_result.anomaly_summary);
    let risk_indicators = build_risk_indicators(&rule_result.triggered, &ml_result.anomaly_summary);
    let suggested_actions = build_suggested_actions(recommendation, queue);
    record_stage(&mut trace, "EXPLANATIONS", stage6_started, timestamp);

    let sla = queue.map_or(0, |q| sla_hours(priority, q, sla_overrides));

    // Stage 7: trace lock + integrity hash.
    let stage7_started = Instant::now();
    trace.lock();
    record_stage(&mut trace, "TRACE_LOCK", stage7_started, timestamp);

    let mut related = related_claims.to_vec();
    related.truncate(thresholds.related_claims_top_n);

    IntelligenceReport {
        analysis_id: AnalysisId::new(),
        claim_id: claim.claim_id().to_string(),
        timestamp: timestamp.to_string(),
        recommendation,
        confidence_score: combined_confidence,
        risk_score,
        assigned_queue: queue,
        priority,
        sla_hours: sla,
        rule_engine_outcome: rule_result.aggregate_outcome,
        ml_engine_outcome: ml_result.clone(),
        primary_reasons,
        secondary_factors,
        risk_indicators,
        suggested_actions,
        related_claims: related,
        historical_context,
        decision_trace: trace,
        processing_time: overall_started.elapsed(),
    }
}

fn record_stage(trace: &mut DecisionTrace, name: &str, started: Instant, timestamp: &str) {
    let _ = trace.record_stage(StageMarker {
        stage_name: name.to_string(),
        timestamp: timestamp.to_string(),
        duration: started.elapsed(),
        details: BTreeMap::new(),
    });
}

fn any_fraud_triggered(triggered: &[RuleResult]) -> bool {
    triggered.iter().any(|r| {
        r.category == crate::core::rule::RuleCategory::DuplicateDetection
            || r.details.get("fraud_signal").map(String::as_str) == Some("true")
    })
}

const fn priority_for_queue(queue: ReviewQueue) -> Priority {
    match queue {
        ReviewQueue::FraudInvestigation => Priority::High,
        ReviewQueue::MedicalDirector | ReviewQueue::ComplianceReview | ReviewQueue::SeniorReview => Priority::Medium,
        ReviewQueue::StandardReview | ReviewQueue::AutoProcess => Priority::Low,
    }
}

const fn severity_weight(severity: Severity) -> f64 {
    match severity {
        Severity::Critical => SEVERITY_WEIGHT_CRITICAL,
        Severity::Major => SEVERITY_WEIGHT_MAJOR,
        Severity::Minor => SEVERITY_WEIGHT_MINOR,
        Severity::Info => SEVERITY_WEIGHT_INFO,
    }
}

fn build_primary_reasons(triggered: &[RuleResult], aggregate: AggregateOutcome) -> Vec<String> {
    if aggregate == AggregateOutcome::Pass {
        return Vec::new();
    }
    triggered
        .iter()
        .filter(|r| r.outcome != RuleOutcome::Pass)
        .map(|r| format!("[{}] {}", r.rule_id, r.message))
        .collect()
}

fn build_secondary_factors(all_results: &[RuleResult], anomaly_summary: &[String]) -> Vec<String> {
    let mut factors: Vec<String> = all_results
        .iter()
        .filter(|r| r.outcome == RuleOutcome::Pass && r.severity != Severity::Info)
        .map(|r| format!("[{}] passed", r.rule_id))
        .collect();
    factors.extend(anomaly_summary.iter().cloned());
    factors
}

fn build_risk_indicators(triggered: &[RuleResult], anomaly_summary: &[String]) -> Vec<RiskIndicator> {
    let mut indicators: Vec<RiskIndicator> = triggered
        .iter()
        .filter(|r| r.outcome != RuleOutcome::Pass)
        .map(|r| RiskIndicator {
            source: "RULE".to_string(),
            label: format!("{} ({})", r.rule_id, r.message),
            severity: match r.severity {
                Severity::Critical => Priority::Critical,
                Severity::Major => Priority::High,
                Severity::Minor => Priority::Medium,
                Severity::Info => Priority::Low,
            },
        })
        .collect();
    indicators.extend(anomaly_summary.iter().map(|label| RiskIndicator {
        source: "ML".to_string(),
        label: label.clone(),
        severity: Priority::Medium,
    }));
    indicators.sort_by(|a, b| b.severity.cmp(&a.severity));
    indicators
}

fn build_suggested_actions(recommendation: Recommendation, queue: Option<ReviewQueue>) -> Vec<String> {
    match recommendation {
        Recommendation::AutoApprove => vec!["No action required; claim auto-approved.".to_string()],
        Recommendation::AutoDecline => vec!["Notify provider of automatic decline; retain for appeal review.".to_string()],
        Recommendation::ManualReview => match queue {
            Some(ReviewQueue::FraudInvestigation) => vec!["Escalate to fraud investigation unit.".to_string()],
            Some(ReviewQueue::MedicalDirector) => vec!["Route to medical director for necessity review.".to_string()],
            Some(ReviewQueue::ComplianceReview) => vec!["Route to compliance for coverage determination.".to_string()],
            _ => vec!["Assign to next available reviewer.".to_string()],
        },
    }
}

/// Default engine version stamped on synthesized reports' rule outcome
/// until a real deployment supplies one via configuration.
pub const DEFAULT_ENGINE_VERSION: &str = "1.0.0";

/// Default budget for the synthesis stage (§5: ≤ 100 ms).
pub const DEFAULT_SYNTHESIS_BUDGET: Duration = Duration::from_millis(100);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::claim::ClaimFields;
    use crate::core::claim::ClaimType;
    use crate::core::claim::CodeType;
    use crate::core::claim::ProcedureCode;
    use crate::core::identifiers::PolicyId;
    use crate::core::identifiers::ProviderId;
    use crate::core::ml::aggregate_model_results;
    use crate::core::ml::ModelResult;
    use crate::core::identifiers::ModelId;
    use time::Date;
    use time::Month;

    fn claim(billed_amount: f64) -> Claim {
        let today = Date::from_calendar_date(2026, Month::July, 28).expect("valid");
        Claim::new(
            ClaimFields {
                claim_id: "CLM-2026-000001".to_string(),
                policy_id: PolicyId::from("POL-1"),
                provider_id: ProviderId::from("PRV-1"),
                member_id_hash: "a".repeat(64),
                procedure_codes: vec![ProcedureCode {
                    code: "99213".to_string(),
                    code_type: CodeType::Cpt,
                    quantity: 1,
                    modifiers: vec![],
                    line_amount: billed_amount,
                }],
                diagnosis_codes: vec![],
                billed_amount,
                service_date: today.previous_day().expect("valid"),
                service_date_end: None,
                claim_type: ClaimType::Professional,
                admission_date: None,
                discharge_date: None,
            },
            today,
        )
        .expect("valid claim")
    }

    fn passing_rule_result() -> RuleEngineResult {
        RuleEngineResult {
            aggregate_outcome: AggregateOutcome::Pass,
            counts: crate::core::rule::RuleCounts::default(),
            triggered: Vec::new(),
            all_results: Vec::new(),
            engine_version: "1.0.0".to_string(),
            ruleset_version: "1.0.0".to_string(),
            execution_time: Duration::from_millis(1),
            timestamp: "2026-07-28T00:00:00Z".to_string(),
        }
    }

    fn ml_result(risk: f64, confidence: f64) -> MLEngineResult {
        let results = vec![ModelResult { risk_score: risk, confidence, ..ModelResult::degraded(ModelId::from("m1")) }];
        aggregate_model_results(&results, &BTreeMap::new(), 10)
    }

    #[test]
    fn clean_low_risk_claim_auto_approves() {
        let report = synthesize(
            &claim(120.0),
            &passing_rule_result(),
            &ml_result(0.12, 0.95),
            &SynthesisThresholds::default(),
            &BTreeMap::new(),
            &BTreeMap::new(),
            &[],
            String::new(),
            "2026-07-28T00:00:00Z",
            DecisionTrace::new(),
        );
        assert_eq!(report.recommendation, Recommendation::AutoApprove);
        assert_eq!(report.assigned_queue, Some(ReviewQueue::AutoProcess));
        assert_eq!(report.priority, Priority::Low);
    }

    #[test]
    fn low_confidence_demotes_auto_approve_to_manual_review() {
        let report = synthesize(
            &claim(120.0),
            &passing_rule_result(),
            &ml_result(0.15, 0.5),
            &SynthesisThresholds::default(),
            &BTreeMap::new(),
            &BTreeMap::new(),
            &[],
            String::new(),
            "2026-07-28T00:00:00Z",
            DecisionTrace::new(),
        );
        assert_eq!(report.recommendation, Recommendation::ManualReview);
        assert_eq!(report.assigned_queue, Some(ReviewQueue::StandardReview));
        assert!(report.decision_trace.decisions().iter().any(|d| d.decision_type == "CONFIDENCE_OVERRIDE"));
    }

    #[test]
    fn amount_over_cap_demotes_auto_approve() {
        let mut thresholds = SynthesisThresholds::default();
        thresholds.auto_approve_max_amount = 100.0;
        let report = synthesize(
            &claim(120.0),
            &passing_rule_result(),
            &ml_result(0.05, 0.99),
            &thresholds,
            &BTreeMap::new(),
            &BTreeMap::new(),
            &[],
            String::new(),
            "2026-07-28T00:00:00Z",
            DecisionTrace::new(),
        );
        assert_eq!(report.recommendation, Recommendation::ManualReview);
        assert_eq!(report.assigned_queue, Some(ReviewQueue::SeniorReview));
    }
}
