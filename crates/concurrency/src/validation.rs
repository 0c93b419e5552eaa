//! Reserved-field validation
//!
//! The change compiler owns `__v` and `__op`. A transform that names either
//! field, anywhere it could read or write it, would corrupt the ordering of
//! writes, so compilation refuses such operations before anything is stamped.
//!
//! Checked locations:
//! - inserted documents (top-level keys, including dotted keys)
//! - filters, recursing through `$and`, `$or` and `$nor`
//! - update operator documents (the field paths under each operator)
//! - update pipelines (`$set`, `$addFields`, `$project`, `$unset`, `$match`)

use foldline_core::{is_reserved_field, Document, Error, Modification, Result};
use serde_json::Value;

fn reject(field: &str, context: &'static str) -> Error {
    Error::ReservedField {
        field: field.to_string(),
        context,
    }
}

/// Check that an inserted document names no reserved field
///
/// # Errors
///
/// Returns `ReservedField` with context `"document"`.
pub fn validate_document(doc: &Document) -> Result<()> {
    match doc.keys().find(|k| is_reserved_field(k)) {
        Some(field) => Err(reject(field, "document")),
        None => Ok(()),
    }
}

/// Check that a filter names no reserved field
///
/// # Errors
///
/// Returns `ReservedField` with context `"filter"`.
pub fn validate_filter(filter: &Document) -> Result<()> {
    for (key, value) in filter {
        match key.as_str() {
            "$and" | "$or" | "$nor" => {
                if let Value::Array(clauses) = value {
                    for clause in clauses {
                        if let Value::Object(sub) = clause {
                            validate_filter(sub)?;
                        }
                    }
                }
            }
            field if is_reserved_field(field) => return Err(reject(field, "filter")),
            _ => {}
        }
    }
    Ok(())
}

/// Check that an update (operator document or pipeline) names no reserved field
///
/// # Errors
///
/// Returns `ReservedField` with context `"update"` or `"pipeline"`.
pub fn validate_modification(modification: &Modification) -> Result<()> {
    match modification {
        Modification::Changes(changes) => validate_changes(changes),
        Modification::Pipeline(stages) => stages.iter().try_for_each(validate_stage),
    }
}

fn validate_changes(changes: &Document) -> Result<()> {
    for (operator, body) in changes {
        if !operator.starts_with('$') {
            if is_reserved_field(operator) {
                return Err(reject(operator, "update"));
            }
            continue;
        }
        if let Value::Object(fields) = body {
            if let Some(field) = fields.keys().find(|k| is_reserved_field(k)) {
                return Err(reject(field, "update"));
            }
        }
    }
    Ok(())
}

fn validate_stage(stage: &Document) -> Result<()> {
    for (name, body) in stage {
        match (name.as_str(), body) {
            ("$set" | "$addFields" | "$project", Value::Object(fields)) => {
                if let Some(field) = fields.keys().find(|k| is_reserved_field(k)) {
                    return Err(reject(field, "pipeline"));
                }
            }
            ("$unset", Value::String(field)) if is_reserved_field(field) => {
                return Err(reject(field, "pipeline"));
            }
            ("$unset", Value::Array(fields)) => {
                if let Some(field) = fields.iter().filter_map(Value::as_str).find(|f| is_reserved_field(f)) {
                    return Err(reject(field, "pipeline"));
                }
            }
            ("$match", Value::Object(filter)) => validate_filter(filter)?,
            _ => {}
        }
    }
    Ok(())
}
