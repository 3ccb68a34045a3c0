// crates/dcal-core/src/runtime/rule_engine.rs
// ============================================================================
// Module: Rule Engine
// Description: Ordered rule evaluation and outcome aggregation (C3).
// Purpose: Drive the Expression Evaluator over every applicable rule in
//          mandated category order, enforcing the CRITICAL-fail-skip rule
//          and the per-claim engine timeout.
// Dependencies: dcal_expr, crate::core::{claim, rule}, crate::runtime::rule_store
// ============================================================================

use std::collections::BTreeMap;
use std::time::Duration;
use std::time::Instant;

use dcal_expr::Addressable;
use dcal_expr::EvalContext;
use dcal_expr::Value;

use crate::core::claim::Claim;
use crate::core::identifiers::RuleId;
use crate::core::rule::RuleCategory;
use crate::core::rule::RuleDefinition;
use crate::core::rule::RuleEngineResult;
use crate::core::rule::RuleOutcome;
use crate::core::rule::RuleResult;
use crate::core::rule::Severity;
use crate::core::rule::SkipReason;
use crate::runtime::rule_store::RuleSnapshot;

/// Default per-claim rule engine time budget (§4.3: 50 ms).
pub const DEFAULT_ENGINE_BUDGET: Duration = Duration::from_millis(50);

/// Evaluates every applicable rule in `snapshot` against `claim_context`
/// in mandated category order, enforcing the CRITICAL-fail-skip rule and
/// `budget`.
///
/// `engine_version` and `now` are stamped onto the returned result
/// verbatim; `eval_ctx` supplies the evaluation date to `dcal-expr` for
/// deterministic `today()` handling.
#[must_use]
pub fn evaluate_rules(
    snapshot: &RuleSnapshot,
    claim: &Claim,
    context: &dyn Addressable,
    eval_ctx: &EvalContext,
    claim_type: &str,
    jurisdiction: &str,
    budget: Duration,
    engine_version: &str,
    now: &str,
) -> RuleEngineResult {
    let started = Instant::now();
    let applicable = snapshot.get_applicable(claim_type, jurisdiction, eval_ctx.today.midnight().assume_utc());
    let mut results = Vec::with_capacity(applicable.len());
    let mut critical_failed = false;
    let mut budget_exceeded = false;

    for rule in applicable {
        if budget_exceeded {
            results.push(skipped(rule, SkipReason::EngineTimeout));
            continue;
        }
        if started.elapsed() > budget {
            budget_exceeded = true;
            results.push(skipped(rule, SkipReason::EngineTimeout));
            continue;
        }
        if critical_failed && rule.category != RuleCategory::Critical {
            results.push(skipped(rule, SkipReason::PriorCriticalFailure));
            continue;
        }

        let result = evaluate_one(rule, claim, context, eval_ctx);
        if result.outcome == RuleOutcome::Fail {
            critical_failed = true;
        }
        results.push(result);
    }

    let (mut aggregate_outcome, counts) = RuleEngineResult::aggregate(&results);
    if budget_exceeded && aggregate_outcome == crate::core::rule::AggregateOutcome::Pass {
        aggregate_outcome = crate::core::rule::AggregateOutcome::Flag;
    }

    let triggered = results.iter().filter(|r| r.outcome != RuleOutcome::Pass).cloned().collect();

    RuleEngineResult {
        aggregate_outcome,
        counts,
        triggered,
        all_results: results,
        engine_version: engine_version.to_string(),
        ruleset_version: snapshot.version().to_string(),
        execution_time: started.elapsed(),
        timestamp: now.to_string(),
    }
}

fn evaluate_one(rule: &RuleDefinition, claim: &Claim, context: &dyn Addressable, eval_ctx: &EvalContext) -> RuleResult {
    let started = Instant::now();
    let parameters: BTreeMap<String, Value> =
        rule.parameters.iter().map(|(k, v)| (k.clone(), json_to_expr_value(v))).collect();

    let mut details = BTreeMap::new();
    if rule.is_fraud_signal() {
        details.insert("fraud_signal".to_string(), "true".to_string());
    }

    let mut input_snapshot = BTreeMap::new();
    input_snapshot.insert("claim_id".to_string(), claim.claim_id().to_string());
    input_snapshot.insert("billed_amount".to_string(), claim.billed_amount().to_string());

    let (outcome, message) = match dcal_expr::evaluate_source(&rule.condition_expression, context, &parameters, eval_ctx)
    {
        Ok(true) => (RuleOutcome::Pass, "condition evaluated true".to_string()),
        Ok(false) => {
            if rule.severity == Severity::Critical {
                (RuleOutcome::Fail, "CRITICAL condition evaluated false".to_string())
            } else {
                (RuleOutcome::Flag, "condition evaluated false".to_string())
            }
        }
        Err(err) => {
            details.insert("error".to_string(), err.to_string());
            (RuleOutcome::Flag, format!("evaluation error: {err}"))
        }
    };

    RuleResult {
        rule_id: rule.rule_id.clone(),
        rule_version: rule.version.clone(),
        category: rule.category,
        outcome,
        severity: rule.severity,
        message,
        details,
        execution_time: started.elapsed(),
        input_snapshot,
        expression_evaluated: rule.condition_expression.clone(),
        parameter_values: rule.parameters.clone(),
        skip_reason: None,
    }
}

fn skipped(rule: &RuleDefinition, reason: SkipReason) -> RuleResult {
    RuleResult {
        rule_id: rule.rule_id.clone(),
        rule_version: rule.version.clone(),
        category: rule.category,
        outcome: RuleOutcome::Skip,
        severity: rule.severity,
        message: format!("skipped: {}", reason.as_label()),
        details: BTreeMap::new(),
        execution_time: Duration::ZERO,
        input_snapshot: BTreeMap::new(),
        expression_evaluated: rule.condition_expression.clone(),
        parameter_values: rule.parameters.clone(),
        skip_reason: Some(reason),
    }
}

fn json_to_expr_value(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => Value::Str(s.clone()),
        serde_json::Value::Array(items) => Value::List(items.iter().map(json_to_expr_value).collect()),
        serde_json::Value::Object(_) => Value::Null,
    }
}

/// Returns the identifier of the fraud/duplicate rule-category signal,
/// used by decision synthesis to decide `FRAUD_INVESTIGATION` routing.
#[must_use]
pub fn any_triggered_fraud_signal<'a>(results: impl Iterator<Item = &'a RuleResult>) -> bool {
    results.filter(|r| r.outcome != RuleOutcome::Pass).any(|r| r.category == RuleCategory::DuplicateDetection)
}

/// Returns the rule ids of triggered rules matching `categories`, used by
/// queue routing (§4.6).
#[must_use]
pub fn triggered_in_categories<'a>(
    results: impl Iterator<Item = &'a RuleResult>,
    categories: &[RuleCategory],
) -> Vec<RuleId> {
    results
        .filter(|r| r.outcome != RuleOutcome::Pass && categories.contains(&r.category))
        .map(|r| r.rule_id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identifiers::PolicyId;
    use crate::core::identifiers::ProviderId;
    use crate::core::identifiers::RuleId;
    use crate::core::rule::Applicability;
    use crate::core::rule::Ruleset;
    use crate::core::rule::RulesetStatus;
    use crate::runtime::rule_store::RuleSnapshot;
    use time::Date;
    use time::Month;

    struct EmptyContext;
    impl Addressable for EmptyContext {
        fn resolve(&self, _root: &str, _path: &[&str]) -> Option<Value> {
            None
        }
        fn has_root(&self, root: &str) -> bool {
            root == "params"
        }
    }

    fn make_rule(id: &str, severity: Severity, expr: &str) -> RuleDefinition {
        let mut def = RuleDefinition {
            rule_id: RuleId::from(id),
            version: "1.0.0".to_string(),
            name: id.to_string(),
            category: RuleCategory::Custom,
            severity,
            enabled: true,
            condition_expression: expr.to_string(),
            parameters: BTreeMap::new(),
            applies_to: Applicability::default(),
            effective_date: "2020-01-01T00:00:00Z".to_string(),
            expiration_date: None,
            checksum: String::new(),
            tags: Vec::new(),
        };
        def.checksum = def.expected_checksum();
        def
    }

    fn claim() -> Claim {
        use crate::core::claim::ClaimFields;
        use crate::core::claim::ClaimType;
        use crate::core::claim::CodeType;
        use crate::core::claim::ProcedureCode;
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
                    line_amount: 100.0,
                }],
                diagnosis_codes: vec![],
                billed_amount: 100.0,
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

    #[test]
    fn a_critical_unparseable_expression_flags_not_fails() {
        let rule = make_rule("R-1", Severity::Critical, "this is not valid !!!");
        let ruleset = Ruleset {
            version: "1.0.0".to_string(),
            status: RulesetStatus::Active,
            rule_ids: vec![rule.rule_id.clone()],
            activated_at: None,
        };
        let snapshot = RuleSnapshot::build(&[ruleset], &[rule]).expect("builds");
        let eval_ctx = EvalContext::new(Date::from_calendar_date(2026, Month::July, 28).expect("valid"));
        let result = evaluate_rules(
            &snapshot,
            &claim(),
            &EmptyContext,
            &eval_ctx,
            "PROFESSIONAL",
            "US",
            DEFAULT_ENGINE_BUDGET,
            "1.0.0",
            "2026-07-28T00:00:00Z",
        );
        assert_eq!(result.all_results[0].outcome, RuleOutcome::Flag);
        assert_ne!(result.aggregate_outcome, crate::core::rule::AggregateOutcome::Pass);
    }

    #[test]
    fn critical_failure_skips_remaining_non_critical_rules() {
        let critical = make_rule("R-1", Severity::Critical, "false");
        let minor = make_rule("R-2", Severity::Minor, "true");
        let ruleset = Ruleset {
            version: "1.0.0".to_string(),
            status: RulesetStatus::Active,
            rule_ids: vec![critical.rule_id.clone(), minor.rule_id.clone()],
            activated_at: None,
        };
        let snapshot = RuleSnapshot::build(&[ruleset], &[critical, minor]).expect("builds");
        let eval_ctx = EvalContext::new(Date::from_calendar_date(2026, Month::July, 28).expect("valid"));
        let result = evaluate_rules(
            &snapshot,
            &claim(),
            &EmptyContext,
            &eval_ctx,
            "PROFESSIONAL",
            "US",
            DEFAULT_ENGINE_BUDGET,
            "1.0.0",
            "2026-07-28T00:00:00Z",
        );
        assert_eq!(result.aggregate_outcome, crate::core::rule::AggregateOutcome::Fail);
        assert!(result.all_results.iter().any(|r| r.outcome == RuleOutcome::Skip));
    }
}
