//! Path access on top-level documents
//!
//! The path helpers in `foldline_core::path` work on a `Value` root. Stored
//! documents are bare maps, so these wrappers resolve the first segment
//! against the map and hand the remainder to the core helpers.

use foldline_core::path::{get_path, resolve_path, set_path, unset_path};
use foldline_core::{Document, Error, FieldPath, PathSegment, Result};
use serde_json::Value;

pub(crate) fn parse_path(field: &str) -> Result<FieldPath> {
    field
        .parse()
        .map_err(|e| Error::invalid_query(format!("invalid field path '{}': {}", field, e)))
}

fn split(path: &FieldPath) -> Option<(&str, FieldPath)> {
    let first = path.first_key()?;
    Some((first, FieldPath::from_segments(path.segments()[1..].to_vec())))
}

/// All values a query path reaches, descending into arrays of subdocuments
pub(crate) fn lookup<'a>(doc: &'a Document, path: &FieldPath) -> Vec<&'a Value> {
    let Some((first, rest)) = split(path) else {
        return Vec::new();
    };
    match doc.get(first) {
        Some(top) if rest.is_empty() => vec![top],
        Some(top) => resolve_path(top, &rest),
        None => Vec::new(),
    }
}

/// The single value at a path, if present
pub(crate) fn get_field<'a>(doc: &'a Document, path: &FieldPath) -> Option<&'a Value> {
    let (first, rest) = split(path)?;
    let top = doc.get(first)?;
    if rest.is_empty() {
        Some(top)
    } else {
        get_path(top, &rest)
    }
}

/// Write a value at a path, creating intermediate objects
pub(crate) fn set_field(doc: &mut Document, path: &FieldPath, value: Value) -> Result<()> {
    let (first, rest) =
        split(path).ok_or_else(|| Error::invalid_query(format!("cannot set '{}'", path)))?;
    if rest.is_empty() {
        doc.insert(first.to_string(), value);
        return Ok(());
    }
    let top = doc
        .entry(first.to_string())
        .or_insert_with(|| Value::Object(Document::new()));
    set_path(top, &rest, value)
        .map_err(|e| Error::invalid_query(format!("cannot set '{}': {}", path, e)))
}

/// Remove the value at a path, returning it
pub(crate) fn unset_field(doc: &mut Document, path: &FieldPath) -> Option<Value> {
    let (first, rest) = split(path)?;
    if rest.is_empty() {
        return doc.remove(first);
    }
    unset_path(doc.get_mut(first)?, &rest)
}

/// Append a key segment to a path
pub(crate) fn child(path: &FieldPath, segment: PathSegment) -> FieldPath {
    let mut segments = path.segments().to_vec();
    segments.push(segment);
    FieldPath::from_segments(segments)
}
