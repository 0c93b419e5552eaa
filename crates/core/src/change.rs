//! Logical change operations
//!
//! A transform answers each event with an ordered list of [`ChangeOp`]s. The
//! order matters: it decides the stamps, and therefore which of two writes
//! to the same document wins.
//!
//! Change operations also have a JSON form, which is what a transform
//! written against raw JSON produces:
//!
//! ```json
//! {"insertOne": {"id": 1}}
//! {"insertMany": [{"id": 1}, {"id": 2}]}
//! {"updateOne": {"where": {"id": 1}, "changes": {"$set": {"name": "x"}}}}
//! {"updateMany": {"where": {}, "pipeline": [{"$set": {"n": 1}}], "arrayFilters": [...]}}
//! {"deleteOne": {"where": {"id": 1}}}
//! {"deleteMany": {"where": {"id": {"$in": [1, 2]}}}}
//! ```

use crate::document::{Document, Pipeline};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How an update modifies matched documents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Modification {
    /// Update-operator document, e.g. `{"$set": {...}, "$inc": {...}}`
    Changes(Document),
    /// Aggregation-style update pipeline, e.g. `[{"$addFields": {...}}]`
    Pipeline(Pipeline),
}

/// Target and modification of an update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateSpec {
    /// Which documents to update
    #[serde(rename = "where", default)]
    pub filter: Document,
    /// What to do to them
    #[serde(flatten)]
    pub modification: Modification,
    /// Conditions for `$[identifier]` positional paths
    #[serde(rename = "arrayFilters", default, skip_serializing_if = "Option::is_none")]
    pub array_filters: Option<Vec<Document>>,
}

impl UpdateSpec {
    /// Attach array filters for `$[identifier]` paths (builder pattern)
    pub fn with_array_filters(mut self, filters: Vec<Document>) -> Self {
        self.array_filters = Some(filters);
        self
    }
}

/// Target of a delete
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteSpec {
    /// Which documents to delete
    #[serde(rename = "where", default)]
    pub filter: Document,
}

/// A logical change a transform wants applied to its model's collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeOp {
    /// Insert one document
    InsertOne(Document),
    /// Insert several documents; each gets its own stamp
    InsertMany(Vec<Document>),
    /// Update the first matching document
    UpdateOne(UpdateSpec),
    /// Update every matching document
    UpdateMany(UpdateSpec),
    /// Delete the first matching document
    DeleteOne(DeleteSpec),
    /// Delete every matching document
    DeleteMany(DeleteSpec),
}

impl ChangeOp {
    /// Parse a change operation from its JSON form
    ///
    /// # Errors
    ///
    /// Returns `UnknownChangeOp` if the value matches no variant.
    pub fn from_value(value: Value) -> Result<ChangeOp> {
        let shown = value.to_string();
        serde_json::from_value(value).map_err(|e| Error::UnknownChangeOp(format!("{} ({})", shown, e)))
    }

    /// Parse a list of change operations from a JSON array
    ///
    /// # Errors
    ///
    /// Returns `UnknownChangeOp` for the first unrecognized element, or if the
    /// value is not an array.
    pub fn from_values(value: Value) -> Result<Vec<ChangeOp>> {
        match value {
            Value::Array(items) => items.into_iter().map(ChangeOp::from_value).collect(),
            other => Err(Error::UnknownChangeOp(format!("expected a list of operations, got {}", other))),
        }
    }

    /// Insert one document
    pub fn insert_one(document: Document) -> Self {
        ChangeOp::InsertOne(document)
    }

    /// Insert several documents
    pub fn insert_many(documents: Vec<Document>) -> Self {
        ChangeOp::InsertMany(documents)
    }

    /// Update the first match with an update-operator document
    pub fn update_one(filter: Document, changes: Document) -> Self {
        ChangeOp::UpdateOne(UpdateSpec {
            filter,
            modification: Modification::Changes(changes),
            array_filters: None,
        })
    }

    /// Update every match with an update-operator document
    pub fn update_many(filter: Document, changes: Document) -> Self {
        ChangeOp::UpdateMany(UpdateSpec {
            filter,
            modification: Modification::Changes(changes),
            array_filters: None,
        })
    }

    /// Update the first match with an update pipeline
    pub fn update_one_pipeline(filter: Document, pipeline: Pipeline) -> Self {
        ChangeOp::UpdateOne(UpdateSpec {
            filter,
            modification: Modification::Pipeline(pipeline),
            array_filters: None,
        })
    }

    /// Update every match with an update pipeline
    pub fn update_many_pipeline(filter: Document, pipeline: Pipeline) -> Self {
        ChangeOp::UpdateMany(UpdateSpec {
            filter,
            modification: Modification::Pipeline(pipeline),
            array_filters: None,
        })
    }

    /// Delete the first match
    pub fn delete_one(filter: Document) -> Self {
        ChangeOp::DeleteOne(DeleteSpec { filter })
    }

    /// Delete every match
    pub fn delete_many(filter: Document) -> Self {
        ChangeOp::DeleteMany(DeleteSpec { filter })
    }

    /// Name of the variant, as used in the JSON form
    pub fn kind(&self) -> &'static str {
        match self {
            ChangeOp::InsertOne(_) => "insertOne",
            ChangeOp::InsertMany(_) => "insertMany",
            ChangeOp::UpdateOne(_) => "updateOne",
            ChangeOp::UpdateMany(_) => "updateMany",
            ChangeOp::DeleteOne(_) => "deleteOne",
            ChangeOp::DeleteMany(_) => "deleteMany",
        }
    }

    /// Number of stamps this operation consumes
    pub fn stamp_count(&self) -> usize {
        match self {
            ChangeOp::InsertMany(docs) => docs.len(),
            _ => 1,
        }
    }
}
