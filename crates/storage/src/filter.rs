//! Query filter evaluation
//!
//! Supported filter syntax:
//!
//! | Form | Meaning |
//! |------|---------|
//! | `{"f": v}` | equality (an array field matches if any element equals `v`) |
//! | `{"f": {"$eq" / "$ne": v}}` | equality / inequality |
//! | `{"f": {"$gt" / "$gte" / "$lt" / "$lte": v}}` | range, same-type only |
//! | `{"f": {"$in" / "$nin": [..]}}` | membership |
//! | `{"f": {"$exists": bool}}` | presence |
//! | `{"$and" / "$or" / "$nor": [filter, ..]}` | logical composition |
//!
//! Several conditions in one document are implicitly ANDed. `f` may be a
//! dotted path; paths descend into arrays of subdocuments.

use crate::compare::{compare_values, values_equal};
use crate::fields::{lookup, parse_path};
use foldline_core::{Document, Error, Result};
use serde_json::Value;
use std::cmp::Ordering;

/// True if the document satisfies the filter
///
/// # Errors
///
/// Returns `InvalidQuery` for unknown operators or malformed operands.
pub fn matches(doc: &Document, filter: &Document) -> Result<bool> {
    for (key, condition) in filter {
        let satisfied = match key.as_str() {
            "$and" => {
                let mut all = true;
                for f in clauses(key, condition)? {
                    if !matches(doc, f)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let mut any = false;
                for f in clauses(key, condition)? {
                    if matches(doc, f)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$nor" => {
                let mut none = true;
                for f in clauses(key, condition)? {
                    if matches(doc, f)? {
                        none = false;
                        break;
                    }
                }
                none
            }
            op if op.starts_with('$') => {
                return Err(Error::invalid_query(format!("unsupported top-level operator {}", op)))
            }
            field => {
                let path = parse_path(field)?;
                let values = lookup(doc, &path);
                matches_condition(&values, condition)?
            }
        };
        if !satisfied {
            return Ok(false);
        }
    }
    Ok(true)
}

/// True if a single value (an array element) satisfies an array filter
///
/// The filter's paths start with `identifier`, e.g. `{"element": {"$gte": 100}}`
/// or `{"element.score": 3}`.
///
/// # Errors
///
/// Same as [`matches`].
pub fn matches_element(identifier: &str, element: &Value, filter: &Document) -> Result<bool> {
    let mut wrapper = Document::new();
    wrapper.insert(identifier.to_string(), element.clone());
    matches(&wrapper, filter)
}

fn clauses<'a>(operator: &str, value: &'a Value) -> Result<Vec<&'a Document>> {
    let items = value
        .as_array()
        .filter(|items| !items.is_empty())
        .ok_or_else(|| Error::invalid_query(format!("{} expects a non-empty array", operator)))?;
    items
        .iter()
        .map(|item| {
            item.as_object()
                .ok_or_else(|| Error::invalid_query(format!("{} clauses must be objects", operator)))
        })
        .collect()
}

fn is_operator_object(condition: &Value) -> Option<&Document> {
    match condition {
        Value::Object(map) if !map.is_empty() && map.keys().all(|k| k.starts_with('$')) => Some(map),
        _ => None,
    }
}

fn matches_condition(values: &[&Value], condition: &Value) -> Result<bool> {
    let Some(operators) = is_operator_object(condition) else {
        return Ok(equals_any(values, condition));
    };

    for (op, operand) in operators {
        let satisfied = match op.as_str() {
            "$eq" => equals_any(values, operand),
            "$ne" => !equals_any(values, operand),
            "$gt" => compares_any(values, operand, |o| o == Ordering::Greater),
            "$gte" => compares_any(values, operand, |o| o != Ordering::Less),
            "$lt" => compares_any(values, operand, |o| o == Ordering::Less),
            "$lte" => compares_any(values, operand, |o| o != Ordering::Greater),
            "$in" => in_list(values, op, operand)?,
            "$nin" => !in_list(values, op, operand)?,
            "$exists" => {
                let wanted = operand
                    .as_bool()
                    .ok_or_else(|| Error::invalid_query("$exists expects a boolean"))?;
                values.is_empty() != wanted
            }
            other => return Err(Error::invalid_query(format!("unsupported operator {}", other))),
        };
        if !satisfied {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Equality against a set of reached values, with array-contains semantics
fn equals_any(values: &[&Value], target: &Value) -> bool {
    if target.is_null() && values.is_empty() {
        return true;
    }
    values.iter().any(|&v| {
        values_equal(v, target)
            || matches!(v, Value::Array(items) if items.iter().any(|i| values_equal(i, target)))
    })
}

fn compares_any(values: &[&Value], target: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    let check = |v: &Value| compare_values(v, target).map(&accept).unwrap_or(false);
    values.iter().any(|&v| {
        check(v) || matches!(v, Value::Array(items) if items.iter().any(|i| check(i)))
    })
}

fn in_list(values: &[&Value], op: &str, operand: &Value) -> Result<bool> {
    let candidates = operand
        .as_array()
        .ok_or_else(|| Error::invalid_query(format!("{} expects an array", op)))?;
    Ok(candidates.iter().any(|c| equals_any(values, c)))
}
