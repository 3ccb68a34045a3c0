// crates/dcal-expr/src/ast.rs
// ============================================================================
// Module: Expression AST
// Description: Parsed tree representation of a condition expression.
// Purpose: Give the parser and evaluator a shared, closed node vocabulary —
//          anything not representable here cannot be expressed.
// Dependencies: time
// ============================================================================

use time::Date;

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

/// Arithmetic binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
}

/// A node in the parsed expression tree.
///
/// # Invariants
/// - Closed vocabulary: no variant for arbitrary calls, loops, or imports.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Null literal.
    Null,
    /// Boolean literal.
    Bool(bool),
    /// Integer literal.
    Int(i64),
    /// Floating point literal.
    Float(f64),
    /// String literal.
    Str(String),
    /// Date literal, written as a quoted `YYYY-MM-DD` string recognized at
    /// parse time via the `date(...)` function form.
    Date(Date),
    /// List literal, e.g. `[1, 2, 3]`.
    List(Vec<Expr>),
    /// Root attribute access, e.g. `claim.billed_amount` becomes
    /// `Attribute { root: "claim", path: ["billed_amount"] }`.
    Attribute {
        /// The root entity name.
        root: String,
        /// The dotted attribute path after the root.
        path: Vec<String>,
    },
    /// Subscript access, e.g. `claim.procedure_codes[0]`.
    Index {
        /// The base expression being indexed.
        base: Box<Expr>,
        /// The index expression.
        index: Box<Expr>,
    },
    /// Logical NOT.
    Not(Box<Expr>),
    /// Arithmetic negation.
    Neg(Box<Expr>),
    /// Logical AND over two or more operands.
    And(Vec<Expr>),
    /// Logical OR over two or more operands.
    Or(Vec<Expr>),
    /// Comparison between two expressions.
    Compare {
        /// Comparison operator.
        op: CompareOp,
        /// Left-hand operand.
        lhs: Box<Expr>,
        /// Right-hand operand.
        rhs: Box<Expr>,
    },
    /// Arithmetic binary operation.
    Arith {
        /// Arithmetic operator.
        op: ArithOp,
        /// Left-hand operand.
        lhs: Box<Expr>,
        /// Right-hand operand.
        rhs: Box<Expr>,
    },
    /// Membership test: `needle in haystack`.
    In {
        /// The value being tested for membership.
        needle: Box<Expr>,
        /// The collection expression.
        haystack: Box<Expr>,
        /// Whether this is a negated `not in` test.
        negated: bool,
    },
    /// Call of a fixed registry function.
    Call {
        /// Function name.
        name: String,
        /// Argument expressions.
        args: Vec<Expr>,
    },
}
