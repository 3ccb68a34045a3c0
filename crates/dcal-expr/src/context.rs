// crates/dcal-expr/src/context.rs
// ============================================================================
// Module: Expression Context
// Description: Closed addressable-entity contract for expression evaluation.
// Purpose: Enumerate the exact set of root objects and attribute paths an
//          expression may read, per the closed-set sandbox requirement.
// Dependencies: crate::value, time
// ============================================================================

//! ## Overview
//! Expressions may only address a fixed, closed set of root entities —
//! `claim`, `policy`, `provider`, `member`, `history`, `tariff` — plus the
//! rule's own `params` map, which the evaluator supplies directly. Anything
//! else is a hard error at evaluation time ([`crate::ExprEvalError::UnknownRoot`]).

use time::Date;

use crate::value::Value;

/// Implemented by the read-only context objects the rule engine builds for a
/// claim evaluation: the claim itself, policy/provider/member lookups,
/// history window, and tariff references.
///
/// Implementations must be pure reads with no side effects and no I/O.
pub trait Addressable {
    /// Resolves an attribute path under a given root name (`claim`, `policy`,
    /// `provider`, `member`, `history`, `tariff`) to a value.
    ///
    /// `path` is the dotted attribute path after the root, e.g. for
    /// `claim.billed_amount` the root is `"claim"` and `path` is
    /// `["billed_amount"]`.
    ///
    /// Returns `None` when the root or the path segment is not part of the
    /// closed attribute surface this implementation exposes.
    fn resolve(&self, root: &str, path: &[&str]) -> Option<Value>;

    /// Returns whether `root` names one of this context's addressable
    /// entities at all (used to distinguish "unknown root" from "unknown
    /// attribute" for error reporting).
    fn has_root(&self, root: &str) -> bool;
}

/// Ambient, deterministic evaluation inputs that are not part of the claim
/// context itself: the "current" date, passed explicitly so that `today()`
/// and the `days_since`/`days_until`/`within_days` functions stay
/// reproducible in tests instead of reading the wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalContext {
    /// The evaluation date substituted for `today()`.
    pub today: Date,
}

impl EvalContext {
    /// Builds an evaluation context pinned to a specific date.
    #[must_use]
    pub const fn new(today: Date) -> Self {
        Self { today }
    }
}
