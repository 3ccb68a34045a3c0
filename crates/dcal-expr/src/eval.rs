// crates/dcal-expr/src/eval.rs
// ============================================================================
// Module: Expression Evaluator
// Description: Tree-walking evaluator for the closed expression AST.
// Purpose: Evaluate an Expr against a context and parameter map, never
//          panicking, never resolving anything outside the closed surface.
// Dependencies: crate::ast, crate::context, crate::error, crate::functions,
//               crate::value
// ============================================================================

use std::collections::BTreeMap;

use crate::ast::ArithOp;
use crate::ast::CompareOp;
use crate::ast::Expr;
use crate::context::Addressable;
use crate::context::EvalContext;
use crate::error::ExprEvalError;
use crate::functions;
use crate::value::Value;

/// Evaluates an expression tree to a [`Value`].
pub(crate) fn eval(
    expr: &Expr,
    context: &dyn Addressable,
    parameters: &BTreeMap<String, Value>,
    eval_ctx: &EvalContext,
) -> Result<Value, ExprEvalError> {
    match expr {
        Expr::Null => Ok(Value::Null),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Int(i) => Ok(Value::Int(*i)),
        Expr::Float(f) => Ok(Value::Float(*f)),
        Expr::Str(s) => Ok(Value::Str(s.clone())),
        Expr::Date(d) => Ok(Value::Date(*d)),
        Expr::List(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(eval(item, context, parameters, eval_ctx)?);
            }
            Ok(Value::List(values))
        }
        Expr::Attribute { root, path } => eval_attribute(root, path, context, parameters),
        Expr::Index { base, index } => {
            let base_val = eval(base, context, parameters, eval_ctx)?;
            let index_val = eval(index, context, parameters, eval_ctx)?;
            eval_index(&base_val, &index_val)
        }
        Expr::Not(inner) => {
            let value = eval(inner, context, parameters, eval_ctx)?;
            let b = value.as_bool().ok_or_else(|| ExprEvalError::TypeMismatch {
                expected: "bool",
                found: value.type_name(),
            })?;
            Ok(Value::Bool(!b))
        }
        Expr::Neg(inner) => {
            let value = eval(inner, context, parameters, eval_ctx)?;
            eval_neg(&value)
        }
        Expr::And(parts) => {
            for part in parts {
                let value = eval(part, context, parameters, eval_ctx)?;
                let b = value.as_bool().ok_or_else(|| ExprEvalError::TypeMismatch {
                    expected: "bool",
                    found: value.type_name(),
                })?;
                if !b {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }
        Expr::Or(parts) => {
            for part in parts {
                let value = eval(part, context, parameters, eval_ctx)?;
                let b = value.as_bool().ok_or_else(|| ExprEvalError::TypeMismatch {
                    expected: "bool",
                    found: value.type_name(),
                })?;
                if b {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        Expr::Compare { op, lhs, rhs } => {
            let lv = eval(lhs, context, parameters, eval_ctx)?;
            let rv = eval(rhs, context, parameters, eval_ctx)?;
            eval_compare(*op, &lv, &rv)
        }
        Expr::Arith { op, lhs, rhs } => {
            let lv = eval(lhs, context, parameters, eval_ctx)?;
            let rv = eval(rhs, context, parameters, eval_ctx)?;
            eval_arith(*op, &lv, &rv)
        }
        Expr::In { needle, haystack, negated } => {
            let needle_val = eval(needle, context, parameters, eval_ctx)?;
            let haystack_val = eval(haystack, context, parameters, eval_ctx)?;
            let items = haystack_val
                .as_list()
                .ok_or_else(|| ExprEvalError::TypeMismatch { expected: "list", found: haystack_val.type_name() })?;
            let found = items.contains(&needle_val);
            Ok(Value::Bool(if *negated { !found } else { found }))
        }
        Expr::Call { name, args } => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval(arg, context, parameters, eval_ctx)?);
            }
            functions::call(name, &values, eval_ctx.today)
        }
    }
}

fn eval_attribute(
    root: &str,
    path: &[String],
    context: &dyn Addressable,
    parameters: &BTreeMap<String, Value>,
) -> Result<Value, ExprEvalError> {
    if root == "params" {
        if path.is_empty() {
            return Err(ExprEvalError::UnknownAttribute { name: "params".to_string() });
        }
        let key = path.join(".");
        return parameters
            .get(path[0].as_str())
            .cloned()
            .ok_or(ExprEvalError::UnknownAttribute { name: key });
    }

    if !context.has_root(root) {
        return Err(ExprEvalError::UnknownRoot { name: root.to_string() });
    }

    let path_refs: Vec<&str> = path.iter().map(String::as_str).collect();
    context
        .resolve(root, &path_refs)
        .ok_or_else(|| ExprEvalError::UnknownAttribute { name: format!("{root}.{}", path.join(".")) })
}

fn eval_index(base: &Value, index: &Value) -> Result<Value, ExprEvalError> {
    let items = base.as_list().ok_or_else(|| ExprEvalError::TypeMismatch {
        expected: "list",
        found: base.type_name(),
    })?;
    let idx = match index {
        Value::Int(i) => *i,
        other => return Err(ExprEvalError::TypeMismatch { expected: "int", found: other.type_name() }),
    };
    if idx < 0 {
        return Err(ExprEvalError::IndexOutOfBounds { index: idx, length: items.len() });
    }
    let idx_usize = usize::try_from(idx).map_err(|_| ExprEvalError::IndexOutOfBounds { index: idx, length: items.len() })?;
    items
        .get(idx_usize)
        .cloned()
        .ok_or(ExprEvalError::IndexOutOfBounds { index: idx, length: items.len() })
}

fn eval_neg(value: &Value) -> Result<Value, ExprEvalError> {
    match value {
        Value::Int(i) => i.checked_neg().map(Value::Int).ok_or(ExprEvalError::ArithmeticOverflow),
        Value::Float(f) => Ok(Value::Float(-f)),
        other => Err(ExprEvalError::TypeMismatch { expected: "number", found: other.type_name() }),
    }
}

fn eval_compare(op: CompareOp, lhs: &Value, rhs: &Value) -> Result<Value, ExprEvalError> {
    let ordering = compare_values(lhs, rhs)?;
    Ok(Value::Bool(match op {
        CompareOp::Eq => ordering == Some(std::cmp::Ordering::Equal),
        CompareOp::Ne => ordering != Some(std::cmp::Ordering::Equal),
        CompareOp::Lt => ordering == Some(std::cmp::Ordering::Less),
        CompareOp::Le => matches!(ordering, Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)),
        CompareOp::Gt => ordering == Some(std::cmp::Ordering::Greater),
        CompareOp::Ge => matches!(ordering, Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)),
    }))
}

fn compare_values(lhs: &Value, rhs: &Value) -> Result<Option<std::cmp::Ordering>, ExprEvalError> {
    match (lhs, rhs) {
        (Value::Null, Value::Null) => Ok(Some(std::cmp::Ordering::Equal)),
        (Value::Bool(a), Value::Bool(b)) => Ok(Some(a.cmp(b))),
        (Value::Str(a), Value::Str(b)) => Ok(Some(a.cmp(b))),
        (Value::Date(a), Value::Date(b)) => Ok(Some(a.cmp(b))),
        (Value::Int(a), Value::Int(b)) => Ok(Some(a.cmp(b))),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            let a = lhs.as_f64().ok_or_else(|| ExprEvalError::TypeMismatch { expected: "number", found: lhs.type_name() })?;
            let b = rhs.as_f64().ok_or_else(|| ExprEvalError::TypeMismatch { expected: "number", found: rhs.type_name() })?;
            Ok(a.partial_cmp(&b))
        }
        _ => Err(ExprEvalError::TypeMismatch { expected: lhs.type_name(), found: rhs.type_name() }),
    }
}

fn eval_arith(op: ArithOp, lhs: &Value, rhs: &Value) -> Result<Value, ExprEvalError> {
    if let (Value::Int(a), Value::Int(b)) = (lhs, rhs) {
        return eval_arith_int(op, *a, *b);
    }
    let a = lhs.as_f64().ok_or_else(|| ExprEvalError::TypeMismatch { expected: "number", found: lhs.type_name() })?;
    let b = rhs.as_f64().ok_or_else(|| ExprEvalError::TypeMismatch { expected: "number", found: rhs.type_name() })?;
    let result = match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div => {
            if b == 0.0 {
                return Err(ExprEvalError::DivisionByZero);
            }
            a / b
        }
        ArithOp::Rem => {
            if b == 0.0 {
                return Err(ExprEvalError::DivisionByZero);
            }
            a % b
        }
    };
    Ok(Value::Float(result))
}

fn eval_arith_int(op: ArithOp, a: i64, b: i64) -> Result<Value, ExprEvalError> {
    let result = match op {
        ArithOp::Add => a.checked_add(b),
        ArithOp::Sub => a.checked_sub(b),
        ArithOp::Mul => a.checked_mul(b),
        ArithOp::Div => {
            if b == 0 {
                return Err(ExprEvalError::DivisionByZero);
            }
            a.checked_div(b)
        }
        ArithOp::Rem => {
            if b == 0 {
                return Err(ExprEvalError::DivisionByZero);
            }
            a.checked_rem(b)
        }
    };
    result.map(Value::Int).ok_or(ExprEvalError::ArithmeticOverflow)
}
