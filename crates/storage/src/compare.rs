//! Value comparison and arithmetic
//!
//! JSON numbers arrive as `i64`, `u64` or `f64` depending on how they were
//! produced. Query semantics treat them as one numeric type: `1` equals
//! `1.0`, and `$inc` on an integer stays an integer while it can.

use serde_json::{Number, Value};
use std::cmp::Ordering;

/// Numeric comparison across integer and float representations
pub fn compare_numbers(a: &Number, b: &Number) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return Some(x.cmp(&y));
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return Some(x.cmp(&y));
    }
    a.as_f64()?.partial_cmp(&b.as_f64()?)
}

/// Equality with numeric normalization, recursing into arrays and objects
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y) == Some(Ordering::Equal),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .zip(ys)
                    .all(|((kx, vx), (ky, vy))| kx == ky && values_equal(vx, vy))
        }
        _ => a == b,
    }
}

/// Comparison for range operators (`$gt`, `$lt`, ...)
///
/// Only values of the same kind compare; anything else yields `None`, so a
/// string never satisfies `{"$gt": 3}`.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Number(_)) => 1,
        Some(Value::String(_)) => 2,
        Some(Value::Object(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Bool(_)) => 5,
    }
}

/// Total order used by `$sort`, `$min` and `$max`
///
/// Missing and null sort first, then numbers, strings, objects, arrays and
/// booleans.
pub fn sort_order(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }
    match (a, b) {
        (Some(Value::Array(xs)), Some(Value::Array(ys))) => xs
            .iter()
            .zip(ys)
            .map(|(x, y)| sort_order(Some(x), Some(y)))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or_else(|| xs.len().cmp(&ys.len())),
        (Some(Value::Object(xs)), Some(Value::Object(ys))) => xs
            .iter()
            .zip(ys)
            .map(|((kx, vx), (ky, vy))| kx.cmp(ky).then_with(|| sort_order(Some(vx), Some(vy))))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or_else(|| xs.len().cmp(&ys.len())),
        (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    }
}

/// Numeric binary operation keeping integers exact
fn combine(
    a: &Number,
    b: &Number,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Option<Value> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        if let Some(r) = int_op(x, y) {
            return Some(Value::from(r));
        }
    }
    let r = float_op(a.as_f64()?, b.as_f64()?);
    Number::from_f64(r).map(Value::Number)
}

/// `a + b`
pub fn add_numbers(a: &Number, b: &Number) -> Option<Value> {
    combine(a, b, i64::checked_add, |x, y| x + y)
}

/// `a - b`
pub fn subtract_numbers(a: &Number, b: &Number) -> Option<Value> {
    combine(a, b, i64::checked_sub, |x, y| x - y)
}

/// `a * b`
pub fn multiply_numbers(a: &Number, b: &Number) -> Option<Value> {
    combine(a, b, i64::checked_mul, |x, y| x * y)
}
