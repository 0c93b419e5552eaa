//! Documents, filters and pipelines
//!
//! Everything the engine exchanges with the document store is plain JSON in
//! the familiar query-document shape: a filter is `{"field": value, "$or": [...]}`,
//! an update is `{"$set": {...}}`, a pipeline is a list of stage documents.
//!
//! Every stored document carries two reserved fields maintained by the
//! change compiler: [`VERSION_FIELD`] (`__v`, the applying event's id) and
//! [`OP_FIELD`] (`__op`, the operation's position within that event).
//! Application data may never name them.

use crate::error::{Error, Result};
use serde_json::{Map, Value};

/// A JSON object: stored document, filter, update or pipeline stage
pub type Document = Map<String, Value>;

/// A sequence of aggregation (or update) stages
pub type Pipeline = Vec<Document>;

/// Reserved field holding the last applying event's id
pub const VERSION_FIELD: &str = "__v";

/// Reserved field holding the op stamp within that event
pub const OP_FIELD: &str = "__op";

/// Both reserved concurrency fields
pub const RESERVED_FIELDS: [&str; 2] = [VERSION_FIELD, OP_FIELD];

/// Field name of the document identifier assigned by the store
pub const ID_FIELD: &str = "_id";

/// True if `field` is, or is nested under, a reserved concurrency field
pub fn is_reserved_field(field: &str) -> bool {
    RESERVED_FIELDS.iter().any(|reserved| {
        field == *reserved
            || field
                .strip_prefix(reserved)
                .map(|rest| rest.starts_with('.'))
                .unwrap_or(false)
    })
}

/// Convert a JSON value into a document
///
/// # Errors
///
/// Returns `InvalidDocument` if the value is not an object.
pub fn to_document(value: Value) -> Result<Document> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(Error::InvalidDocument(format!(
            "expected an object, got {}",
            crate::path::value_type_name(&other)
        ))),
    }
}

/// Convert a JSON array of stage objects into a pipeline
///
/// # Errors
///
/// Returns `InvalidDocument` if the value is not an array of objects.
pub fn to_pipeline(value: Value) -> Result<Pipeline> {
    match value {
        Value::Array(stages) => stages.into_iter().map(to_document).collect(),
        other => Err(Error::InvalidDocument(format!(
            "expected an array of stages, got {}",
            crate::path::value_type_name(&other)
        ))),
    }
}

/// Read an unsigned integer field, if present and numeric
pub fn get_u64(doc: &Document, field: &str) -> Option<u64> {
    doc.get(field).and_then(Value::as_u64)
}
