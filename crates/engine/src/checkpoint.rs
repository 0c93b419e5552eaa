//! Durable per-collection checkpoints
//!
//! Each model collection has one record in the checkpoint collection:
//!
//! ```json
//! {"collection": "model_1_v1", "last_applied_version": 42}
//! ```
//!
//! Records are created with 0 and only move forward: `advance` uses `$max`,
//! so a late or repeated call can never move a checkpoint back. The only
//! exception is the explicit `reset` used by `clean`.

use foldline_core::{get_u64, Document, DocumentStore, Modification, Result, WriteOp};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Field naming the model collection a record belongs to
pub const COLLECTION_FIELD: &str = "collection";

/// Field holding the last applied event id
pub const LAST_APPLIED_FIELD: &str = "last_applied_version";

/// Reads and writes checkpoint records through a document store
#[derive(Debug)]
pub struct CheckpointStore<S: DocumentStore + ?Sized> {
    store: Arc<S>,
    collection: String,
}

impl<S: DocumentStore + ?Sized> CheckpointStore<S> {
    /// Create a checkpoint store writing into `collection`
    pub fn new(store: Arc<S>, collection: impl Into<String>) -> Self {
        CheckpointStore {
            store,
            collection: collection.into(),
        }
    }

    /// Name of the checkpoint collection
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Create the record for `model_collection` with 0 if it does not exist
    ///
    /// # Errors
    ///
    /// Returns a store error if the upsert fails.
    pub fn ensure(&self, model_collection: &str) -> Result<()> {
        self.upsert(
            model_collection,
            json!({"$setOnInsert": {LAST_APPLIED_FIELD: 0}}),
        )
    }

    /// Move the checkpoint of `model_collection` forward to `version`
    ///
    /// Has no effect if the record is already at or past `version`.
    ///
    /// # Errors
    ///
    /// Returns a store error if the upsert fails.
    pub fn advance(&self, model_collection: &str, version: u64) -> Result<()> {
        debug!(
            target: "foldline::checkpoint",
            collection = model_collection,
            version,
            "Advancing checkpoint"
        );
        self.upsert(model_collection, json!({"$max": {LAST_APPLIED_FIELD: version}}))
    }

    /// Set the checkpoint of `model_collection` back to 0
    ///
    /// # Errors
    ///
    /// Returns a store error if the upsert fails.
    pub fn reset(&self, model_collection: &str) -> Result<()> {
        self.upsert(model_collection, json!({"$set": {LAST_APPLIED_FIELD: 0}}))
    }

    /// Last applied event id of `model_collection`, 0 if it has no record
    ///
    /// # Errors
    ///
    /// Returns a store error if the read fails.
    pub fn get(&self, model_collection: &str) -> Result<u64> {
        let found = self
            .store
            .find(&self.collection, &record_filter(model_collection))?;
        Ok(found
            .first()
            .and_then(|record| get_u64(record, LAST_APPLIED_FIELD))
            .unwrap_or(0))
    }

    /// Minimum checkpoint across `model_collections`
    ///
    /// A collection without a record counts as 0, as does an empty list.
    ///
    /// # Errors
    ///
    /// Returns a store error if the read fails.
    pub fn min_of(&self, model_collections: &[String]) -> Result<u64> {
        if model_collections.is_empty() {
            return Ok(0);
        }
        let filter = json!({COLLECTION_FIELD: {"$in": model_collections}});
        let records = self.store.find(&self.collection, &as_document(filter))?;

        let by_collection: BTreeMap<&str, u64> = records
            .iter()
            .filter_map(|record| {
                let name = record.get(COLLECTION_FIELD)?.as_str()?;
                Some((name, get_u64(record, LAST_APPLIED_FIELD).unwrap_or(0)))
            })
            .collect();

        Ok(model_collections
            .iter()
            .map(|c| by_collection.get(c.as_str()).copied().unwrap_or(0))
            .min()
            .unwrap_or(0))
    }

    fn upsert(&self, model_collection: &str, update: serde_json::Value) -> Result<()> {
        let op = WriteOp::UpdateOne {
            filter: record_filter(model_collection),
            update: Modification::Changes(as_document(update)),
            array_filters: None,
            upsert: true,
        };
        self.store.bulk_write(&self.collection, &[op])?;
        Ok(())
    }
}

fn record_filter(model_collection: &str) -> Document {
    as_document(json!({COLLECTION_FIELD: model_collection}))
}

fn as_document(value: serde_json::Value) -> Document {
    match value {
        serde_json::Value::Object(map) => map,
        _ => Document::new(),
    }
}
