// crates/dcal-expr/src/lib.rs
// ============================================================================
// Module: Expression Evaluator
// Description: Sandboxed boolean expression language for claim rule conditions.
// Purpose: Evaluate rule condition expressions against a read-only claim
//          context without exposing host state or arbitrary callables.
// Dependencies: crate::lexer, crate::parser, crate::ast, crate::value, crate::eval
// ============================================================================

//! ## Overview
//! A restricted expression language for deterministic, sandboxed rule
//! conditions. The same expression, context, and parameters always produce
//! the same result, independent of wall clock except where `today()` is
//! used — callers pass the evaluation date in via [`EvalContext::today`] so
//! tests stay deterministic.
//!
//! Allowed surface: literals, comparisons, boolean `and`/`or`/`not`,
//! membership `in`/`not in`, arithmetic, attribute access and subscript on
//! context objects, and a fixed function registry. Nothing else resolves —
//! there is no way to reach host state, define functions, import code, or
//! loop.
//!
//! The evaluator never panics: parse failures produce [`ExprSyntaxError`],
//! evaluation failures produce [`ExprEvalError`]; callers map both to a
//! `FLAG` outcome.

mod ast;
mod context;
mod error;
mod eval;
mod functions;
mod lexer;
mod parser;
mod value;

pub use ast::Expr;
pub use context::Addressable;
pub use context::EvalContext;
pub use error::ExprEvalError;
pub use error::ExprSyntaxError;
pub use value::Value;

use std::collections::BTreeMap;

/// Maximum allowed expression source size in bytes.
pub const MAX_EXPRESSION_BYTES: usize = 64 * 1024;
/// Maximum supported nesting depth for parenthesized/function expressions.
pub const MAX_EXPRESSION_NESTING: usize = 32;

/// Parses a condition expression into an evaluable tree.
///
/// # Errors
/// Returns [`ExprSyntaxError`] when the expression cannot be parsed, is
/// empty, exceeds the size or nesting limits, or has trailing input.
pub fn parse(source: &str) -> Result<Expr, ExprSyntaxError> {
    if source.len() > MAX_EXPRESSION_BYTES {
        return Err(ExprSyntaxError::InputTooLarge {
            max_bytes: MAX_EXPRESSION_BYTES,
            actual_bytes: source.len(),
        });
    }
    let tokens = lexer::Lexer::new(source).lex()?;
    let mut parser = parser::Parser::new(tokens);
    let expr = parser.parse_expression()?;
    parser.expect_eof()?;
    Ok(expr)
}

/// Evaluates a previously parsed expression to a boolean outcome.
///
/// `parameters` supplies the rule's configured parameter map, addressable as
/// the `params` root in the expression.
///
/// # Errors
/// Returns [`ExprEvalError`] on unknown names, unsupported nodes, type
/// mismatches, or division by zero. Never panics.
pub fn evaluate(
    expr: &Expr,
    context: &dyn Addressable,
    parameters: &BTreeMap<String, Value>,
    eval_ctx: &EvalContext,
) -> Result<bool, ExprEvalError> {
    let value = eval::eval(expr, context, parameters, eval_ctx)?;
    value.as_bool().ok_or_else(|| ExprEvalError::TypeMismatch {
        expected: "bool",
        found: value.type_name(),
    })
}

/// Parses and evaluates an expression in one step.
///
/// # Errors
/// Returns [`ExprSyntaxError`] for parse failures or [`ExprEvalError`] for
/// evaluation failures, wrapped in [`EvaluationFailure`].
pub fn evaluate_source(
    source: &str,
    context: &dyn Addressable,
    parameters: &BTreeMap<String, Value>,
    eval_ctx: &EvalContext,
) -> Result<bool, EvaluationFailure> {
    let expr = parse(source).map_err(EvaluationFailure::Syntax)?;
    evaluate(&expr, context, parameters, eval_ctx).map_err(EvaluationFailure::Eval)
}

/// Unified failure mode for [`evaluate_source`] — either a syntax error or an
/// evaluation error, never a panic.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvaluationFailure {
    /// The expression failed to parse.
    #[error(transparent)]
    Syntax(#[from] ExprSyntaxError),
    /// The expression parsed but failed to evaluate.
    #[error(transparent)]
    Eval(#[from] ExprEvalError),
}

#[cfg(test)]
mod tests;
