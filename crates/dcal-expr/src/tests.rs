// crates/dcal-expr/src/tests.rs
// ============================================================================
// Module: Expression Evaluator Tests
// Description: Unit tests for the lexer/parser/evaluator pipeline.
// ============================================================================

use std::collections::BTreeMap;

use time::Date;
use time::Month;

use crate::Addressable;
use crate::EvalContext;
use crate::Value;
use crate::evaluate_source;
use crate::parse;

struct StubContext;

impl Addressable for StubContext {
    fn resolve(&self, root: &str, path: &[&str]) -> Option<Value> {
        match (root, path) {
            ("claim", ["billed_amount"]) => Some(Value::Float(120.00)),
            ("claim", ["claim_type"]) => Some(Value::Str("PROFESSIONAL".to_string())),
            ("claim", ["service_date"]) => {
                Some(Value::Date(Date::from_calendar_date(2026, Month::July, 26).expect("valid date")))
            }
            ("claim", ["procedure_codes"]) => Some(Value::List(vec![Value::Str("99213".to_string())])),
            ("member", ["age"]) => Some(Value::Int(42)),
            _ => None,
        }
    }

    fn has_root(&self, root: &str) -> bool {
        matches!(root, "claim" | "member" | "policy" | "provider" | "history" | "tariff")
    }
}

fn ctx() -> EvalContext {
    EvalContext::new(Date::from_calendar_date(2026, Month::July, 28).expect("valid date"))
}

#[test]
fn evaluates_simple_comparison() {
    let params = BTreeMap::new();
    let result = evaluate_source("claim.billed_amount <= 120.00", &StubContext, &params, &ctx()).expect("evaluates");
    assert!(result);
}

#[test]
fn evaluates_boolean_composition() {
    let params = BTreeMap::new();
    let result = evaluate_source(
        "claim.claim_type == \"PROFESSIONAL\" and not (claim.billed_amount > 1000)",
        &StubContext,
        &params,
        &ctx(),
    )
    .expect("evaluates");
    assert!(result);
}

#[test]
fn evaluates_membership() {
    let params = BTreeMap::new();
    let result =
        evaluate_source("\"99213\" in claim.procedure_codes", &StubContext, &params, &ctx()).expect("evaluates");
    assert!(result);
}

#[test]
fn evaluates_days_since() {
    let params = BTreeMap::new();
    let result = evaluate_source("days_since(claim.service_date) == 2", &StubContext, &params, &ctx()).expect("evaluates");
    assert!(result);
}

#[test]
fn unknown_root_is_evaluation_error_not_panic() {
    let params = BTreeMap::new();
    let err = evaluate_source("nonexistent.field == 1", &StubContext, &params, &ctx()).unwrap_err();
    assert!(matches!(err, crate::EvaluationFailure::Eval(crate::ExprEvalError::UnknownRoot { .. })));
}

#[test]
fn unparseable_expression_is_syntax_error_not_panic() {
    let err = parse("claim.billed_amount ===").unwrap_err();
    assert!(matches!(err, crate::ExprSyntaxError::UnexpectedToken { .. }));
}

#[test]
fn empty_input_is_syntax_error() {
    let err = parse("   ").unwrap_err();
    assert_eq!(err, crate::ExprSyntaxError::EmptyInput);
}

#[test]
fn deeply_nested_parens_hit_nesting_limit() {
    let mut source = String::new();
    for _ in 0 .. 40 {
        source.push('(');
    }
    source.push_str("true");
    for _ in 0 .. 40 {
        source.push(')');
    }
    let err = parse(&source).unwrap_err();
    assert!(matches!(err, crate::ExprSyntaxError::NestingTooDeep { .. }));
}

#[test]
fn function_registry_rejects_unknown_function() {
    let params = BTreeMap::new();
    let err = evaluate_source("nope(1, 2)", &StubContext, &params, &ctx()).unwrap_err();
    assert!(matches!(err, crate::EvaluationFailure::Eval(crate::ExprEvalError::UnknownFunction { .. })));
}

#[test]
fn between_function_is_inclusive() {
    let params = BTreeMap::new();
    assert!(evaluate_source("between(120.00, 100, 120)", &StubContext, &params, &ctx()).expect("evaluates"));
    assert!(!evaluate_source("between(121.0, 100, 120)", &StubContext, &params, &ctx()).expect("evaluates"));
}

#[test]
fn params_are_addressable() {
    let mut params = BTreeMap::new();
    params.insert("threshold".to_string(), Value::Float(0.5));
    let result = evaluate_source("params.threshold == 0.5", &StubContext, &params, &ctx()).expect("evaluates");
    assert!(result);
}
