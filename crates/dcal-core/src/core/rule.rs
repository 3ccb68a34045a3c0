// crates/dcal-core/src/core/rule.rs
// ============================================================================
// Module: Rule Model
// Description: Immutable rule definitions, rulesets, and per-rule/aggregate
//              evaluation results.
// Purpose: Carry the rule data model and its aggregation invariants
//          verbatim from the claim-analysis contract.
// Dependencies: serde, serde_json, dcal_expr, crate::core::hashing,
//               crate::core::identifiers
// ============================================================================

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::core::hashing::sha256_hex_of_canonical_json;
use crate::core::identifiers::RuleId;

/// Rule severity; governs PASS/FAIL/FLAG mapping in [`RuleResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Informational only.
    Info,
    /// Minor issue.
    Minor,
    /// Major issue.
    Major,
    /// Critical issue; a false evaluation hard-fails the claim.
    Critical,
}

/// Ordered rule categories. Rules are evaluated in this order; within a
/// category, order is stable by `rule_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleCategory {
    /// Evaluated first; any CRITICAL failure here skips non-critical rules.
    Critical,
    /// Policy coverage checks.
    PolicyCoverage,
    /// Provider eligibility checks.
    ProviderEligibility,
    /// Tariff/fee-schedule compliance checks.
    TariffCompliance,
    /// Coding validation checks.
    CodingValidation,
    /// Temporal validation checks.
    TemporalValidation,
    /// Duplicate claim detection.
    DuplicateDetection,
    /// Benefit-limit checks.
    BenefitLimits,
    /// Deployment-specific custom rules, evaluated last.
    Custom,
}

impl RuleCategory {
    /// Categories in their mandated evaluation order.
    pub const ORDER: [Self; 9] = [
        Self::Critical,
        Self::PolicyCoverage,
        Self::ProviderEligibility,
        Self::TariffCompliance,
        Self::CodingValidation,
        Self::TemporalValidation,
        Self::DuplicateDetection,
        Self::BenefitLimits,
        Self::Custom,
    ];
}

/// The jurisdictions and claim types a rule applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Applicability {
    /// Claim types this rule applies to; empty means "all".
    pub claim_types: Vec<String>,
    /// Jurisdictions this rule applies to; empty means "all".
    pub jurisdictions: Vec<String>,
}

impl Applicability {
    /// Returns whether this rule applies to the given claim type and
    /// jurisdiction (empty lists match everything).
    #[must_use]
    pub fn matches(&self, claim_type: &str, jurisdiction: &str) -> bool {
        let type_match = self.claim_types.is_empty() || self.claim_types.iter().any(|t| t == claim_type);
        let jurisdiction_match =
            self.jurisdictions.is_empty() || self.jurisdictions.iter().any(|j| j == jurisdiction);
        type_match && jurisdiction_match
    }
}

/// An immutable rule definition. New logic always produces a new version;
/// a `RuleDefinition` value never mutates after construction.
///
/// # Invariants
/// - `checksum` is SHA-256 over the canonical JSON of
///   `{rule_id, version, condition_expression, parameters}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    /// Rule identifier, stable across versions.
    pub rule_id: RuleId,
    /// Semantic version of this rule definition.
    pub version: String,
    /// Human-readable name.
    pub name: String,
    /// Evaluation category / ordering bucket.
    pub category: RuleCategory,
    /// Severity, governing outcome mapping.
    pub severity: Severity,
    /// Whether the rule is currently enabled.
    pub enabled: bool,
    /// The condition expression source, evaluated by `dcal-expr`.
    pub condition_expression: String,
    /// Rule parameters, addressable as `params.*` in the expression.
    pub parameters: BTreeMap<String, serde_json::Value>,
    /// Claim types and jurisdictions this rule applies to.
    pub applies_to: Applicability,
    /// Date from which the rule is effective (RFC3339).
    pub effective_date: String,
    /// Optional expiration date (RFC3339).
    pub expiration_date: Option<String>,
    /// Stored checksum, recomputed and compared on every load.
    pub checksum: String,
    /// Fraud-relevant tags (e.g. `"FRAUD"`), consulted by queue routing.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// The fields a checksum is computed over, kept separate so the checksum
/// computation never accidentally includes non-canonical fields.
#[derive(Serialize)]
struct ChecksumInput<'a> {
    rule_id: &'a str,
    version: &'a str,
    condition_expression: &'a str,
    parameters: &'a BTreeMap<String, serde_json::Value>,
}

impl RuleDefinition {
    /// Recomputes the checksum this definition *should* carry.
    ///
    /// # Panics
    /// Never: canonicalization of an already-constructed, serializable
    /// value cannot fail for the types involved here.
    #[must_use]
    pub fn expected_checksum(&self) -> String {
        let input = ChecksumInput {
            rule_id: self.rule_id.as_str(),
            version: self.version.as_str(),
            condition_expression: self.condition_expression.as_str(),
            parameters: &self.parameters,
        };
        sha256_hex_of_canonical_json(&input).unwrap_or_default()
    }

    /// Returns whether the stored checksum matches the recomputed one.
    #[must_use]
    pub fn checksum_is_valid(&self) -> bool {
        self.expected_checksum() == self.checksum
    }

    /// Returns whether this rule carries the `FRAUD` tag or sits in the
    /// `DUPLICATE_DETECTION` category — the routing condition used by both
    /// decision synthesis and queue routing.
    #[must_use]
    pub fn is_fraud_signal(&self) -> bool {
        self.category == RuleCategory::DuplicateDetection || self.tags.iter().any(|t| t == "FRAUD")
    }
}

/// Ruleset lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RulesetStatus {
    /// Being authored, not yet evaluated against traffic.
    Draft,
    /// Under test.
    Testing,
    /// Canary rollout.
    Canary,
    /// Currently serving all traffic; exactly one per environment.
    Active,
    /// Superseded.
    Deprecated,
}

/// An immutable, versioned bundle of rule identifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ruleset {
    /// Ruleset version.
    pub version: String,
    /// Lifecycle status.
    pub status: RulesetStatus,
    /// The rule identifiers included in this ruleset.
    pub rule_ids: Vec<RuleId>,
    /// Activation timestamp (RFC3339), set when status becomes `Active`.
    pub activated_at: Option<String>,
}

/// Per-rule evaluation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleOutcome {
    /// Condition evaluated true.
    Pass,
    /// A CRITICAL rule's condition evaluated false.
    Fail,
    /// A non-critical rule's condition evaluated false, or evaluation
    /// raised an error.
    Flag,
    /// Skipped — either a prior CRITICAL failure or an engine timeout.
    Skip,
}

/// Why a rule was skipped, recorded for explanation and the confidence
/// discount in decision synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkipReason {
    /// A prior CRITICAL rule already failed.
    PriorCriticalFailure,
    /// The per-claim engine timeout was exceeded.
    EngineTimeout,
}

impl SkipReason {
    /// A short human-readable label, used in [`RuleResult::message`].
    #[must_use]
    pub const fn as_label(self) -> &'static str {
        match self {
            Self::PriorCriticalFailure => "prior critical failure",
            Self::EngineTimeout => "engine timeout",
        }
    }
}

/// The result of evaluating one rule against one claim context.
///
/// # Invariants
/// - If `severity = CRITICAL` and the condition evaluated false,
///   `outcome = FAIL`.
/// - If non-critical and false, `outcome = FLAG`.
/// - If evaluation raised an error, `outcome = FLAG` with the error
///   recorded in `message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleResult {
    /// The rule identifier.
    pub rule_id: RuleId,
    /// The rule version evaluated.
    pub rule_version: String,
    /// The rule's category.
    pub category: RuleCategory,
    /// The evaluation outcome.
    pub outcome: RuleOutcome,
    /// The rule's configured severity.
    pub severity: Severity,
    /// A human-readable summary of the result.
    pub message: String,
    /// Additional structured detail (error text, matched values, etc).
    pub details: BTreeMap<String, String>,
    /// Wall-clock execution time for this rule.
    pub execution_time: Duration,
    /// A snapshot of the input subset the rule observed, for audit replay.
    pub input_snapshot: BTreeMap<String, String>,
    /// The condition expression text that was evaluated.
    pub expression_evaluated: String,
    /// The resolved parameter values at evaluation time.
    pub parameter_values: BTreeMap<String, serde_json::Value>,
    /// Set when `outcome = SKIP`.
    pub skip_reason: Option<SkipReason>,
}

/// The engine's aggregate outcome across all rules for one claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggregateOutcome {
    /// No rule FAILed or FLAGged (SKIPped rules never affect this).
    Pass,
    /// At least one rule FAILed.
    Fail,
    /// No rule FAILed, but at least one FLAGged.
    Flag,
}

impl AggregateOutcome {
    /// The `SCREAMING_SNAKE_CASE` label used in serialized form and audit
    /// snapshots.
    #[must_use]
    pub const fn as_label(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Flag => "FLAG",
        }
    }
}

/// Aggregate counts across all evaluated rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RuleCounts {
    /// Total rules considered.
    pub evaluated: usize,
    /// Rules that passed.
    pub passed: usize,
    /// Rules that failed.
    pub failed: usize,
    /// Rules that flagged.
    pub flagged: usize,
    /// Rules that were skipped.
    pub skipped: usize,
}

/// The Rule Engine's full result for one claim.
///
/// # Invariants
/// - `aggregate_outcome = FAIL` iff any rule FAILed; else `FLAG` iff any
///   rule FLAGged; else `PASS`. SKIPped rules never change the aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleEngineResult {
    /// The derived aggregate outcome.
    pub aggregate_outcome: AggregateOutcome,
    /// Aggregate counts.
    pub counts: RuleCounts,
    /// Non-PASS results (FAIL, FLAG, SKIP), in evaluation order.
    pub triggered: Vec<RuleResult>,
    /// Every per-rule result, in evaluation order.
    pub all_results: Vec<RuleResult>,
    /// The rule engine implementation version.
    pub engine_version: String,
    /// The ruleset version evaluated.
    pub ruleset_version: String,
    /// Total wall-clock execution time.
    pub execution_time: Duration,
    /// RFC3339 timestamp when evaluation completed.
    pub timestamp: String,
}

impl RuleEngineResult {
    /// Derives [`AggregateOutcome`] and [`RuleCounts`] from a completed
    /// sequence of per-rule results, enforcing the invariants in the data
    /// model: FAIL dominates, then FLAG, else PASS; SKIP never changes the
    /// aggregate.
    #[must_use]
    pub fn aggregate(results: &[RuleResult]) -> (AggregateOutcome, RuleCounts) {
        let mut counts = RuleCounts::default();
        let mut any_fail = false;
        let mut any_flag = false;

        for result in results {
            counts.evaluated += 1;
            match result.outcome {
                RuleOutcome::Pass => counts.passed += 1,
                RuleOutcome::Fail => {
                    counts.failed += 1;
                    any_fail = true;
                }
                RuleOutcome::Flag => {
                    counts.flagged += 1;
                    any_flag = true;
                }
                RuleOutcome::Skip => counts.skipped += 1,
            }
        }

        let aggregate = if any_fail {
            AggregateOutcome::Fail
        } else if any_flag {
            AggregateOutcome::Flag
        } else {
            AggregateOutcome::Pass
        };

        (aggregate, counts)
    }

    /// Returns whether any SKIPped rule is present, used to compute the
    /// `rule_confidence` discount in decision synthesis.
    #[must_use]
    pub fn any_skipped(&self) -> bool {
        self.counts.skipped > 0
    }

    /// Returns whether any triggered (non-PASS) rule carries a fraud signal
    /// (DUPLICATE_DETECTION category or FRAUD tag), identified by the
    /// caller attaching that information to `details["fraud_signal"]`
    /// during rule evaluation.
    #[must_use]
    pub fn any_fraud_signal(&self) -> bool {
        self.triggered.iter().any(|r| r.details.get("fraud_signal").map(String::as_str) == Some("true"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule_result(outcome: RuleOutcome) -> RuleResult {
        RuleResult {
            rule_id: RuleId::from("R-1"),
            rule_version: "1.0.0".to_string(),
            category: RuleCategory::Custom,
            outcome,
            severity: Severity::Minor,
            message: String::new(),
            details: BTreeMap::new(),
            execution_time: Duration::from_millis(1),
            input_snapshot: BTreeMap::new(),
            expression_evaluated: String::new(),
            parameter_values: BTreeMap::new(),
            skip_reason: None,
        }
    }

    #[test]
    fn fail_dominates_aggregate() {
        let results = vec![rule_result(RuleOutcome::Pass), rule_result(RuleOutcome::Fail), rule_result(RuleOutcome::Flag)];
        let (aggregate, counts) = RuleEngineResult::aggregate(&results);
        assert_eq!(aggregate, AggregateOutcome::Fail);
        assert_eq!(counts.evaluated, 3);
    }

    #[test]
    fn flag_dominates_when_no_fail() {
        let results = vec![rule_result(RuleOutcome::Pass), rule_result(RuleOutcome::Flag)];
        let (aggregate, _) = RuleEngineResult::aggregate(&results);
        assert_eq!(aggregate, AggregateOutcome::Flag);
    }

    #[test]
    fn skip_never_changes_aggregate() {
        let results = vec![rule_result(RuleOutcome::Pass), rule_result(RuleOutcome::Skip)];
        let (aggregate, counts) = RuleEngineResult::aggregate(&results);
        assert_eq!(aggregate, AggregateOutcome::Pass);
        assert_eq!(counts.skipped, 1);
    }
}
