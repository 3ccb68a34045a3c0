// crates/dcal-expr/src/error.rs
// ============================================================================
// Module: Expression Errors
// Description: Structured syntax and evaluation failure types.
// Purpose: Give the rule engine typed, position-aware failure information
//          instead of exceptions or panics.
// Dependencies: thiserror
// ============================================================================

use thiserror::Error;

/// Errors raised while lexing or parsing an expression.
///
/// # Invariants
/// - Every variant carries enough context to report a precise diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExprSyntaxError {
    /// Input was empty or contained only whitespace.
    #[error("expression is empty")]
    EmptyInput,
    /// Input exceeded the configured size limit.
    #[error("expression exceeds size limit: {actual_bytes} bytes (max {max_bytes})")]
    InputTooLarge {
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual input length in bytes.
        actual_bytes: usize,
    },
    /// Input exceeded the configured nesting depth.
    #[error("expression nesting exceeds limit: depth {actual_depth} (max {max_depth}) at {position}")]
    NestingTooDeep {
        /// Maximum allowed nesting depth.
        max_depth: usize,
        /// Actual nesting depth at the point of failure.
        actual_depth: usize,
        /// Byte offset in the original input.
        position: usize,
    },
    /// An unexpected token was encountered.
    #[error("unexpected token `{found}` at {position}, expected {expected}")]
    UnexpectedToken {
        /// Human-readable description of what was expected.
        expected: &'static str,
        /// The token actually seen.
        found: String,
        /// Byte offset in the original input.
        position: usize,
    },
    /// A numeric literal failed to parse.
    #[error("invalid number `{raw}` at {position}")]
    InvalidNumber {
        /// The raw numeric text.
        raw: String,
        /// Byte offset in the original input.
        position: usize,
    },
    /// A string literal was not terminated.
    #[error("unterminated string literal starting at {position}")]
    UnterminatedString {
        /// Byte offset where the string literal began.
        position: usize,
    },
    /// Unexpected trailing input after a complete expression.
    #[error("unexpected trailing input at {position}")]
    TrailingInput {
        /// Byte offset where the unexpected input begins.
        position: usize,
    },
}

/// Errors raised while evaluating a parsed expression against a context.
///
/// # Invariants
/// - Evaluation never panics; every failure mode is represented here.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprEvalError {
    /// A referenced root name is not one of the closed set of addressable
    /// entities (`claim, policy, provider, member, history, tariff, params`).
    #[error("unknown root name `{name}`")]
    UnknownRoot {
        /// The unresolved root identifier.
        name: String,
    },
    /// An attribute path could not be resolved on the addressed object.
    #[error("unknown attribute `{name}`")]
    UnknownAttribute {
        /// The unresolved attribute name.
        name: String,
    },
    /// A function name is not in the fixed registry.
    #[error("unknown function `{name}`")]
    UnknownFunction {
        /// The unrecognized function identifier.
        name: String,
    },
    /// A function was called with the wrong number of arguments.
    #[error("function `{name}` expects {expected} argument(s), got {actual}")]
    ArityMismatch {
        /// Function name.
        name: &'static str,
        /// Expected argument count.
        expected: &'static str,
        /// Actual argument count supplied.
        actual: usize,
    },
    /// A value had an unexpected type for the operation attempted.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// The expected type name.
        expected: &'static str,
        /// The actual type name encountered.
        found: &'static str,
    },
    /// Arithmetic division or modulo by zero.
    #[error("division by zero")]
    DivisionByZero,
    /// Arithmetic overflow.
    #[error("arithmetic overflow")]
    ArithmeticOverflow,
    /// Indexing a list out of bounds.
    #[error("index {index} out of bounds (length {length})")]
    IndexOutOfBounds {
        /// Requested index.
        index: i64,
        /// Collection length.
        length: usize,
    },
    /// A regular-expression style pattern used by `matches` was invalid.
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),
    /// A date string could not be parsed.
    #[error("invalid date `{0}`")]
    InvalidDate(String),
}
