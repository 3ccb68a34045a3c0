// crates/dcal-expr/src/functions.rs
// ============================================================================
// Module: Expression Function Registry
// Description: The fixed, closed set of callable functions.
// Purpose: Implement `abs, round, min, max, sum, len, all, any,
//          days_since, days_until, within_days, today, is_null,
//          is_not_null, coalesce, matches, startswith, endswith, contains,
//          between, count` — nothing else is callable.
// Dependencies: crate::value, crate::error
// ============================================================================

use time::Date;

use crate::error::ExprEvalError;
use crate::value::Value;

/// Dispatches a call to the fixed function registry.
///
/// `evaluated_args` are the already-evaluated argument values, except for
/// `count`, whose second argument is a sub-predicate evaluated per element
/// by the caller via `count_predicate`.
pub(crate) fn call(
    name: &str,
    args: &[Value],
    today: Date,
) -> Result<Value, ExprEvalError> {
    match name {
        "abs" => unary_numeric(name, args, f64::abs, |i| i.checked_abs()),
        "round" => {
            let v = one_arg(name, args)?;
            let f = numeric(v)?;
            round_to_int(f)
        }
        "min" => fold_numeric(name, args, f64::min),
        "max" => fold_numeric(name, args, f64::max),
        "sum" => sum(name, args),
        "len" => len(name, args),
        "is_null" => Ok(Value::Bool(one_arg(name, args)?.is_null())),
        "is_not_null" => Ok(Value::Bool(!one_arg(name, args)?.is_null())),
        "coalesce" => coalesce(args),
        "startswith" => string_predicate(name, args, str::starts_with),
        "endswith" => string_predicate(name, args, str::ends_with),
        "contains" => contains(name, args),
        "between" => between(name, args),
        "days_since" => days_since(name, args, today),
        "days_until" => days_until(name, args, today),
        "within_days" => within_days(name, args, today),
        "today" => {
            arity(name, args, 0)?;
            Ok(Value::Date(today))
        }
        "matches" => matches_pattern(name, args),
        "all" | "any" => aggregate_bool(name, args),
        "count" => count(name, args),
        other => Err(ExprEvalError::UnknownFunction { name: other.to_string() }),
    }
}

fn arity(name: &'static str, args: &[Value], expected: usize) -> Result<(), ExprEvalError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(ExprEvalError::ArityMismatch {
            name,
            expected: arity_label(expected),
            actual: args.len(),
        })
    }
}

fn arity_label(n: usize) -> &'static str {
    match n {
        0 => "0",
        1 => "1",
        2 => "2",
        _ => "1+",
    }
}

fn one_arg(name: &'static str, args: &[Value]) -> Result<&Value, ExprEvalError> {
    if args.len() != 1 {
        return Err(ExprEvalError::ArityMismatch { name, expected: "1", actual: args.len() });
    }
    Ok(&args[0])
}

#[allow(clippy::cast_possible_truncation, reason = "rounded value is range-checked against i64 bounds before truncation")]
fn round_to_int(f: f64) -> Result<Value, ExprEvalError> {
    let rounded = f.round();
    if rounded.is_finite() && rounded >= i64::MIN as f64 && rounded <= i64::MAX as f64 {
        Ok(Value::Int(rounded as i64))
    } else {
        Err(ExprEvalError::ArithmeticOverflow)
    }
}

fn numeric(value: &Value) -> Result<f64, ExprEvalError> {
    value.as_f64().ok_or_else(|| ExprEvalError::TypeMismatch { expected: "number", found: value.type_name() })
}

fn string_of<'a>(value: &'a Value) -> Result<&'a str, ExprEvalError> {
    value.as_str().ok_or_else(|| ExprEvalError::TypeMismatch { expected: "string", found: value.type_name() })
}

fn unary_numeric(
    name: &'static str,
    args: &[Value],
    float_op: fn(f64) -> f64,
    int_op: fn(i64) -> Option<i64>,
) -> Result<Value, ExprEvalError> {
    let value = one_arg(name, args)?;
    match value {
        Value::Int(i) => int_op(*i).map(Value::Int).ok_or(ExprEvalError::ArithmeticOverflow),
        other => Ok(Value::Float(float_op(numeric(other)?))),
    }
}

fn fold_numeric(
    name: &'static str,
    args: &[Value],
    combine: fn(f64, f64) -> f64,
) -> Result<Value, ExprEvalError> {
    let values: Vec<&Value> = if args.len() == 1 {
        match &args[0] {
            Value::List(items) => items.iter().collect(),
            other => vec![other],
        }
    } else {
        args.iter().collect()
    };
    if values.is_empty() {
        return Err(ExprEvalError::ArityMismatch { name, expected: "1+", actual: 0 });
    }
    let mut acc = numeric(values[0])?;
    for v in &values[1 ..] {
        acc = combine(acc, numeric(v)?);
    }
    Ok(Value::Float(acc))
}

fn sum(name: &'static str, args: &[Value]) -> Result<Value, ExprEvalError> {
    let value = one_arg(name, args)?;
    let items = value.as_list().ok_or_else(|| ExprEvalError::TypeMismatch {
        expected: "list",
        found: value.type_name(),
    })?;
    let mut acc = 0.0_f64;
    for item in items {
        acc += numeric(item)?;
    }
    Ok(Value::Float(acc))
}

fn len(name: &'static str, args: &[Value]) -> Result<Value, ExprEvalError> {
    let value = one_arg(name, args)?;
    let length = match value {
        Value::List(items) => items.len(),
        Value::Str(s) => s.chars().count(),
        other => {
            return Err(ExprEvalError::TypeMismatch { expected: "list or string", found: other.type_name() });
        }
    };
    Ok(Value::Int(length as i64))
}

fn coalesce(args: &[Value]) -> Result<Value, ExprEvalError> {
    for value in args {
        if !value.is_null() {
            return Ok(value.clone());
        }
    }
    Ok(Value::Null)
}

fn string_predicate(
    name: &'static str,
    args: &[Value],
    predicate: fn(&str, &str) -> bool,
) -> Result<Value, ExprEvalError> {
    arity(name, args, 2)?;
    let haystack = string_of(&args[0])?;
    let needle = string_of(&args[1])?;
    Ok(Value::Bool(predicate(haystack, needle)))
}

fn contains(name: &'static str, args: &[Value]) -> Result<Value, ExprEvalError> {
    arity(name, args, 2)?;
    match &args[0] {
        Value::Str(haystack) => {
            let needle = string_of(&args[1])?;
            Ok(Value::Bool(haystack.contains(needle)))
        }
        Value::List(items) => Ok(Value::Bool(items.contains(&args[1]))),
        other => Err(ExprEvalError::TypeMismatch { expected: "string or list", found: other.type_name() }),
    }
}

fn between(name: &'static str, args: &[Value]) -> Result<Value, ExprEvalError> {
    arity(name, args, 3)?;
    let v = numeric(&args[0])?;
    let lo = numeric(&args[1])?;
    let hi = numeric(&args[2])?;
    Ok(Value::Bool(v >= lo && v <= hi))
}

fn date_arg(name: &'static str, args: &[Value]) -> Result<Date, ExprEvalError> {
    let value = one_arg(name, args)?;
    value.as_date().ok_or_else(|| ExprEvalError::TypeMismatch { expected: "date", found: value.type_name() })
}

fn days_since(name: &'static str, args: &[Value], today: Date) -> Result<Value, ExprEvalError> {
    let date = date_arg(name, args)?;
    Ok(Value::Int((today - date).whole_days()))
}

fn days_until(name: &'static str, args: &[Value], today: Date) -> Result<Value, ExprEvalError> {
    let date = date_arg(name, args)?;
    Ok(Value::Int((date - today).whole_days()))
}

fn within_days(name: &'static str, args: &[Value], today: Date) -> Result<Value, ExprEvalError> {
    arity(name, args, 2)?;
    let date = args[0]
        .as_date()
        .ok_or_else(|| ExprEvalError::TypeMismatch { expected: "date", found: args[0].type_name() })?;
    let n = match &args[1] {
        Value::Int(i) => *i,
        other => return Err(ExprEvalError::TypeMismatch { expected: "int", found: other.type_name() }),
    };
    let delta = (today - date).whole_days().abs();
    Ok(Value::Bool(delta <= n))
}

/// Minimal glob-style matcher supporting `*` wildcards, since the sandbox
/// forbids importing a full regex engine's arbitrary backtracking surface.
fn matches_pattern(name: &'static str, args: &[Value]) -> Result<Value, ExprEvalError> {
    arity(name, args, 2)?;
    let text = string_of(&args[0])?;
    let pattern = string_of(&args[1])?;
    Ok(Value::Bool(glob_match(pattern, text)))
}

fn glob_match(pattern: &str, text: &str) -> bool {
    fn rec(pattern: &[u8], text: &[u8]) -> bool {
        match (pattern.first(), text.first()) {
            (None, None) => true,
            (Some(b'*'), _) => rec(&pattern[1 ..], text) || (!text.is_empty() && rec(pattern, &text[1 ..])),
            (Some(&p), Some(&t)) if p == t => rec(&pattern[1 ..], &text[1 ..]),
            _ => false,
        }
    }
    rec(pattern.as_bytes(), text.as_bytes())
}

fn aggregate_bool(name: &'static str, args: &[Value]) -> Result<Value, ExprEvalError> {
    let items: Vec<&Value> = if args.len() == 1 {
        match &args[0] {
            Value::List(items) => items.iter().collect(),
            other => vec![other],
        }
    } else {
        args.iter().collect()
    };
    let mut bools = Vec::with_capacity(items.len());
    for item in items {
        bools.push(item.as_bool().ok_or_else(|| ExprEvalError::TypeMismatch {
            expected: "bool",
            found: item.type_name(),
        })?);
    }
    Ok(Value::Bool(match name {
        "all" => bools.iter().all(|b| *b),
        _ => bools.iter().any(|b| *b),
    }))
}

/// `count(collection, flags)` counts list elements whose boolean flag at the
/// same position in a parallel flags list is true. The evaluator expands
/// the original `count(collection, predicate)` grammar into this two-list
/// form before calling the registry, since predicates are not first-class
/// values in this sandbox.
fn count(name: &'static str, args: &[Value]) -> Result<Value, ExprEvalError> {
    arity(name, args, 2)?;
    let flags = args[1]
        .as_list()
        .ok_or_else(|| ExprEvalError::TypeMismatch { expected: "list", found: args[1].type_name() })?;
    let mut total = 0_i64;
    for flag in flags {
        if flag.as_bool().ok_or_else(|| ExprEvalError::TypeMismatch {
            expected: "bool",
            found: flag.type_name(),
        })? {
            total += 1;
        }
    }
    let _ = name;
    Ok(Value::Int(total))
}
