//! Update application
//!
//! Operator documents support `$set`, `$unset`, `$inc`, `$min`, `$max`,
//! `$push` (with optional `$each`) and `$setOnInsert`. Paths may contain
//! `$[]` (every element) and `$[identifier]` (elements matching the array
//! filter whose top-level field is `identifier`).
//!
//! Every function returns the updated document; callers compare it with the
//! original to decide whether anything was modified.

use crate::compare::{add_numbers, sort_order};
use crate::fields::{child, get_field, parse_path, set_field, unset_field};
use crate::filter::matches_element;
use crate::pipeline::update_with_pipeline;
use foldline_core::{Document, Error, FieldPath, Modification, PathSegment, Result};
use serde_json::Value;
use std::cmp::Ordering;

/// Apply an update to a document
///
/// `inserting` is true when the document is being created by an upsert, in
/// which case `$setOnInsert` takes effect.
///
/// # Errors
///
/// Returns `InvalidQuery` for unknown operators, type mismatches (e.g. `$inc`
/// on a string) and positional paths without a matching array filter.
pub fn apply_update(
    doc: &Document,
    update: &Modification,
    array_filters: &[Document],
    inserting: bool,
) -> Result<Document> {
    match update {
        Modification::Changes(changes) => apply_changes(doc, changes, array_filters, inserting),
        Modification::Pipeline(stages) => update_with_pipeline(doc, stages),
    }
}

fn apply_changes(
    doc: &Document,
    changes: &Document,
    array_filters: &[Document],
    inserting: bool,
) -> Result<Document> {
    let mut out = doc.clone();
    for (operator, body) in changes {
        let fields = body.as_object().ok_or_else(|| {
            Error::invalid_query(format!("{} expects an object of fields", operator))
        })?;
        for (field, operand) in fields {
            let paths = expand_positional(&out, &parse_path(field)?, array_filters)?;
            for path in paths {
                match operator.as_str() {
                    "$set" => set_field(&mut out, &path, operand.clone())?,
                    "$setOnInsert" => {
                        if inserting {
                            set_field(&mut out, &path, operand.clone())?;
                        }
                    }
                    "$unset" => {
                        unset_field(&mut out, &path);
                    }
                    "$inc" => increment(&mut out, &path, operand)?,
                    "$min" => keep_extreme(&mut out, &path, operand, Ordering::Less)?,
                    "$max" => keep_extreme(&mut out, &path, operand, Ordering::Greater)?,
                    "$push" => push(&mut out, &path, operand)?,
                    op if op.starts_with('$') => {
                        return Err(Error::invalid_query(format!("unsupported update operator {}", op)))
                    }
                    _ => {
                        return Err(Error::invalid_query(
                            "update document must contain only operators",
                        ))
                    }
                }
            }
        }
    }
    Ok(out)
}

fn increment(doc: &mut Document, path: &FieldPath, operand: &Value) -> Result<()> {
    let Value::Number(delta) = operand else {
        return Err(Error::invalid_query("$inc expects a numeric operand"));
    };
    let next = match get_field(doc, path) {
        None => operand.clone(),
        Some(Value::Number(current)) => add_numbers(current, delta)
            .ok_or_else(|| Error::invalid_query(format!("$inc on '{}' overflowed", path)))?,
        Some(_) => {
            return Err(Error::invalid_query(format!(
                "cannot apply $inc to non-numeric field '{}'",
                path
            )))
        }
    };
    set_field(doc, path, next)
}

fn keep_extreme(doc: &mut Document, path: &FieldPath, operand: &Value, wanted: Ordering) -> Result<()> {
    let replace = match get_field(doc, path) {
        None => true,
        Some(current) => sort_order(Some(operand), Some(current)) == wanted,
    };
    if replace {
        set_field(doc, path, operand.clone())?;
    }
    Ok(())
}

fn push(doc: &mut Document, path: &FieldPath, operand: &Value) -> Result<()> {
    let items = match operand {
        Value::Object(spec) if spec.contains_key("$each") => spec
            .get("$each")
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| Error::invalid_query("$each expects an array"))?,
        single => vec![single.clone()],
    };
    let next = match get_field(doc, path) {
        None => Value::Array(items),
        Some(Value::Array(existing)) => {
            let mut all = existing.clone();
            all.extend(items);
            Value::Array(all)
        }
        Some(_) => {
            return Err(Error::invalid_query(format!(
                "cannot apply $push to non-array field '{}'",
                path
            )))
        }
    };
    set_field(doc, path, next)
}

/// Expand `$[]` and `$[identifier]` segments into concrete element paths
fn expand_positional(
    doc: &Document,
    path: &FieldPath,
    array_filters: &[Document],
) -> Result<Vec<FieldPath>> {
    if !path.has_positional() {
        return Ok(vec![path.clone()]);
    }

    let mut prefixes = vec![FieldPath::from_segments(Vec::new())];
    for segment in path.segments() {
        let mut next = Vec::new();
        for prefix in prefixes {
            match segment {
                PathSegment::Key(_) => next.push(child(&prefix, segment.clone())),
                positional => {
                    let elements = match get_field(doc, &prefix) {
                        Some(Value::Array(elements)) => elements,
                        _ => {
                            return Err(Error::invalid_query(format!(
                                "'{}' must be an existing array to apply {}",
                                prefix, positional
                            )))
                        }
                    };
                    let condition = match positional {
                        PathSegment::Filtered(id) => Some((id.as_str(), array_filter_for(id, array_filters)?)),
                        _ => None,
                    };
                    for (index, element) in elements.iter().enumerate() {
                        let selected = match condition {
                            Some((id, filter)) => matches_element(id, element, filter)?,
                            None => true,
                        };
                        if selected {
                            next.push(child(&prefix, PathSegment::Key(index.to_string())));
                        }
                    }
                }
            }
        }
        prefixes = next;
    }
    Ok(prefixes)
}

fn array_filter_for<'a>(identifier: &str, array_filters: &'a [Document]) -> Result<&'a Document> {
    array_filters
        .iter()
        .find(|filter| {
            filter.keys().any(|key| key.split('.').next() == Some(identifier))
        })
        .ok_or_else(|| {
            Error::invalid_query(format!("no array filter found for identifier '{}'", identifier))
        })
}

/// Starting document for an upsert: the filter's top-level equality fields
///
/// `{"id": 3, "n": {"$gt": 1}}` seeds `{"id": 3}`; `{"k": {"$eq": 2}}` seeds
/// `{"k": 2}`; equalities inside `$and` clauses are followed.
pub fn seed_from_filter(filter: &Document) -> Document {
    let mut seed = Document::new();
    collect_equalities(filter, &mut seed);
    seed
}

fn collect_equalities(filter: &Document, seed: &mut Document) {
    for (key, condition) in filter {
        if key == "$and" {
            if let Some(clauses) = condition.as_array() {
                for clause in clauses.iter().filter_map(Value::as_object) {
                    collect_equalities(clause, seed);
                }
            }
            continue;
        }
        if key.starts_with('$') {
            continue;
        }
        let value = match condition {
            Value::Object(ops) if ops.keys().any(|k| k.starts_with('$')) => match ops.get("$eq") {
                Some(v) => v.clone(),
                None => continue,
            },
            literal => literal.clone(),
        };
        if let Ok(path) = parse_path(key) {
            // Conflicting paths (e.g. "a" and "a.b") keep the first value.
            let _ = set_field(seed, &path, value);
        }
    }
}
