//! Stamp guards
//!
//! Two filter fragments decide whether a write has already happened:
//!
//! - [`newer_than`]: matches documents stamped at or after `(v, op)`. An insert
//!   stamped `(v, op)` is skipped (upserts nothing) when any document matches.
//! - [`older_than`]: matches documents stamped strictly before `(v, op)`. An
//!   update or delete stamped `(v, op)` only touches documents matching it.
//!
//! For any stored stamp exactly one of the two matches.

use foldline_core::{Document, Stamp, OP_FIELD, VERSION_FIELD};
use serde_json::{json, Value};

/// Filter matching documents stamped at or after `stamp`
pub fn newer_than(stamp: Stamp) -> Document {
    let mut filter = Document::new();
    filter.insert(
        "$or".to_string(),
        json!([
            { VERSION_FIELD: { "$gt": stamp.version } },
            { VERSION_FIELD: stamp.version, OP_FIELD: { "$gte": stamp.op } }
        ]),
    );
    filter
}

/// Filter matching documents stamped strictly before `stamp`
pub fn older_than(stamp: Stamp) -> Document {
    let mut filter = Document::new();
    filter.insert(
        "$or".to_string(),
        json!([
            { VERSION_FIELD: { "$lt": stamp.version } },
            { VERSION_FIELD: stamp.version, OP_FIELD: { "$lt": stamp.op } }
        ]),
    );
    filter
}

/// Combine a caller's filter with a guard
///
/// The guard is a single `$or`. When the caller's filter has no top-level
/// `$or` the guard is merged in as a sibling key; otherwise both are wrapped
/// in `$and` so neither disjunction overwrites the other.
pub fn with_guard(filter: Document, guard: Document) -> Document {
    if filter.is_empty() {
        return guard;
    }
    if !filter.contains_key("$or") {
        let mut merged = filter;
        merged.extend(guard);
        return merged;
    }

    let mut combined = Document::new();
    combined.insert(
        "$and".to_string(),
        Value::Array(vec![Value::Object(filter), Value::Object(guard)]),
    );
    combined
}
