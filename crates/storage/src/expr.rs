//! Aggregation expressions
//!
//! Used by `$addFields`/`$set`/`$project` stages in reads and update
//! pipelines. An expression is one of:
//!
//! - a field reference `"$path.to.field"` (or `"$$ROOT"`)
//! - an operator object `{"$add": [..]}`, `{"$subtract": [a, b]}`,
//!   `{"$multiply": [..]}`, `{"$concat": [..]}`, `{"$ifNull": [a, b]}`,
//!   `{"$literal": v}`
//! - an object or array of expressions
//! - any other literal
//!
//! Evaluation yields `None` for a missing field, which callers treat as
//! "do not write".

use crate::compare::{add_numbers, multiply_numbers, subtract_numbers};
use crate::fields::{get_field, parse_path};
use foldline_core::{Document, Error, Result};
use serde_json::{Number, Value};

/// Evaluate an expression against a document
///
/// # Errors
///
/// Returns `InvalidQuery` for unknown operators, bad arity or non-numeric
/// arithmetic operands.
pub fn evaluate(expr: &Value, root: &Document) -> Result<Option<Value>> {
    match expr {
        Value::String(s) if s == "$$ROOT" => Ok(Some(Value::Object(root.clone()))),
        Value::String(s) if s.starts_with("$$") => {
            Err(Error::invalid_query(format!("unsupported variable {}", s)))
        }
        Value::String(s) if s.starts_with('$') => field_reference(&s[1..], root),
        Value::Object(map) if map.len() == 1 && map.keys().all(|k| k.starts_with('$')) => {
            let Some((op, args)) = map.iter().next() else {
                return Ok(None);
            };
            evaluate_operator(op, args, root).map(Some)
        }
        Value::Object(map) => {
            let mut out = Document::new();
            for (key, sub) in map {
                if let Some(value) = evaluate(sub, root)? {
                    out.insert(key.clone(), value);
                }
            }
            Ok(Some(Value::Object(out)))
        }
        Value::Array(items) => {
            let values = items
                .iter()
                .map(|item| Ok(evaluate(item, root)?.unwrap_or(Value::Null)))
                .collect::<Result<Vec<_>>>()?;
            Ok(Some(Value::Array(values)))
        }
        literal => Ok(Some(literal.clone())),
    }
}

fn field_reference(path: &str, root: &Document) -> Result<Option<Value>> {
    Ok(get_field(root, &parse_path(path)?).cloned())
}

fn arguments(args: &Value, root: &Document) -> Result<Vec<Value>> {
    match args {
        Value::Array(items) => items
            .iter()
            .map(|item| Ok(evaluate(item, root)?.unwrap_or(Value::Null)))
            .collect(),
        single => Ok(vec![evaluate(single, root)?.unwrap_or(Value::Null)]),
    }
}

fn evaluate_operator(op: &str, args: &Value, root: &Document) -> Result<Value> {
    match op {
        "$literal" => Ok(args.clone()),
        "$add" => fold_numbers(op, arguments(args, root)?, add_numbers),
        "$multiply" => fold_numbers(op, arguments(args, root)?, multiply_numbers),
        "$subtract" => {
            let values = arguments(args, root)?;
            if values.len() != 2 {
                return Err(Error::invalid_query("$subtract expects exactly two arguments"));
            }
            fold_numbers(op, values, subtract_numbers)
        }
        "$concat" => {
            let mut out = String::new();
            for value in arguments(args, root)? {
                match value {
                    Value::Null => return Ok(Value::Null),
                    Value::String(s) => out.push_str(&s),
                    other => {
                        return Err(Error::invalid_query(format!(
                            "$concat only supports strings, got {}",
                            foldline_core::path::value_type_name(&other)
                        )))
                    }
                }
            }
            Ok(Value::String(out))
        }
        "$ifNull" => {
            let values = arguments(args, root)?;
            if values.len() < 2 {
                return Err(Error::invalid_query("$ifNull expects at least two arguments"));
            }
            let fallback = values.last().cloned().unwrap_or(Value::Null);
            Ok(values
                .into_iter()
                .find(|v| !v.is_null())
                .unwrap_or(fallback))
        }
        other => Err(Error::invalid_query(format!("unsupported expression operator {}", other))),
    }
}

/// Left fold over numeric arguments; any null argument makes the result null
fn fold_numbers(
    op: &str,
    values: Vec<Value>,
    combine: fn(&Number, &Number) -> Option<Value>,
) -> Result<Value> {
    let mut iter = values.into_iter();
    let Some(mut acc) = iter.next() else {
        return Ok(Value::from(0));
    };
    for value in iter {
        acc = match (&acc, &value) {
            (Value::Null, _) | (_, Value::Null) => return Ok(Value::Null),
            (Value::Number(a), Value::Number(b)) => combine(a, b)
                .ok_or_else(|| Error::invalid_query(format!("{} produced a non-finite number", op)))?,
            _ => {
                return Err(Error::invalid_query(format!(
                    "{} only supports numeric types",
                    op
                )))
            }
        };
    }
    match acc {
        Value::Number(_) | Value::Null => Ok(acc),
        _ => Err(Error::invalid_query(format!("{} only supports numeric types", op))),
    }
}
