//! Document store abstraction
//!
//! This module defines the [`DocumentStore`] trait that the projection engine
//! writes through, plus the physical write operations and result summaries
//! exchanged with it. Swapping the in-memory store for a real database
//! does not touch the engine.

use crate::change::Modification;
use crate::document::Document;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::ops::AddAssign;

// =============================================================================
// Physical write operations
// =============================================================================

/// A physical write, as submitted to the store in an ordered bulk write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WriteOp {
    /// Insert a document unconditionally
    InsertOne {
        /// Document to insert
        document: Document,
    },
    /// Update the first document matching `filter`
    UpdateOne {
        /// Selection filter
        filter: Document,
        /// Operator document or pipeline
        update: Modification,
        /// Conditions for `$[identifier]` positional paths
        #[serde(default, skip_serializing_if = "Option::is_none")]
        array_filters: Option<Vec<Document>>,
        /// Insert a new document when nothing matches
        #[serde(default)]
        upsert: bool,
    },
    /// Update every document matching `filter`
    UpdateMany {
        /// Selection filter
        filter: Document,
        /// Operator document or pipeline
        update: Modification,
        /// Conditions for `$[identifier]` positional paths
        #[serde(default, skip_serializing_if = "Option::is_none")]
        array_filters: Option<Vec<Document>>,
        /// Insert a new document when nothing matches
        #[serde(default)]
        upsert: bool,
    },
    /// Delete the first document matching `filter`
    DeleteOne {
        /// Selection filter
        filter: Document,
    },
    /// Delete every document matching `filter`
    DeleteMany {
        /// Selection filter
        filter: Document,
    },
}

impl WriteOp {
    /// Selection filter of the operation, if it has one
    pub fn filter(&self) -> Option<&Document> {
        match self {
            WriteOp::InsertOne { .. } => None,
            WriteOp::UpdateOne { filter, .. }
            | WriteOp::UpdateMany { filter, .. }
            | WriteOp::DeleteOne { filter }
            | WriteOp::DeleteMany { filter } => Some(filter),
        }
    }

    /// Short name of the operation for logs
    pub fn kind(&self) -> &'static str {
        match self {
            WriteOp::InsertOne { .. } => "insertOne",
            WriteOp::UpdateOne { .. } => "updateOne",
            WriteOp::UpdateMany { .. } => "updateMany",
            WriteOp::DeleteOne { .. } => "deleteOne",
            WriteOp::DeleteMany { .. } => "deleteMany",
        }
    }
}

// =============================================================================
// Results
// =============================================================================

/// Counts reported by the store for one bulk write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteSummary {
    /// Documents inserted by `InsertOne`
    pub inserted: u64,
    /// Documents inserted by an upsert
    pub upserted: u64,
    /// Documents selected by update filters
    pub matched: u64,
    /// Documents whose content actually changed
    pub modified: u64,
    /// Documents removed
    pub deleted: u64,
}

impl WriteSummary {
    /// Translate store counts into a change tally
    pub fn changes(&self) -> Changes {
        Changes {
            added: self.inserted + self.upserted,
            updated: self.modified,
            deleted: self.deleted,
        }
    }
}

impl AddAssign for WriteSummary {
    fn add_assign(&mut self, rhs: Self) {
        self.inserted += rhs.inserted;
        self.upserted += rhs.upserted;
        self.matched += rhs.matched;
        self.modified += rhs.modified;
        self.deleted += rhs.deleted;
    }
}

/// Per-model tally of effective changes during one `handle_events` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Changes {
    /// Documents added (inserted or upserted)
    pub added: u64,
    /// Documents modified
    pub updated: u64,
    /// Documents removed
    pub deleted: u64,
}

impl Changes {
    /// True if nothing was added, updated or deleted
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.updated == 0 && self.deleted == 0
    }
}

impl AddAssign for Changes {
    fn add_assign(&mut self, rhs: Self) {
        self.added += rhs.added;
        self.updated += rhs.updated;
        self.deleted += rhs.deleted;
    }
}

// =============================================================================
// DocumentStore
// =============================================================================

/// Storage abstraction for projected collections
///
/// Thread safety: all methods must be safe to call concurrently from
/// multiple threads (requires Send + Sync).
///
/// A collection that was never written is indistinguishable from an empty
/// one: reading it yields no documents.
pub trait DocumentStore: Send + Sync {
    /// Run an aggregation pipeline over a collection
    ///
    /// # Errors
    ///
    /// Returns `Read` (or `InvalidQuery`) if the pipeline cannot be evaluated.
    fn aggregate(&self, collection: &str, pipeline: &[Document]) -> Result<Vec<Document>>;

    /// Apply writes in order, stopping at the first failure
    ///
    /// Writes before the failing one stay applied.
    ///
    /// # Errors
    ///
    /// Returns `Write` naming the index of the failing operation.
    fn bulk_write(&self, collection: &str, ops: &[WriteOp]) -> Result<WriteSummary>;

    /// Remove a collection and all its documents
    ///
    /// # Returns
    /// `true` if the collection existed.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the store refuses the drop.
    fn drop_collection(&self, collection: &str) -> Result<bool>;

    /// Names of the collections currently holding documents
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the store cannot be enumerated.
    fn collection_names(&self) -> Result<Vec<String>>;

    /// Documents matching a filter, in storage order
    ///
    /// # Errors
    ///
    /// Same as [`DocumentStore::aggregate`].
    fn find(&self, collection: &str, filter: &Document) -> Result<Vec<Document>> {
        let mut stage = Document::new();
        stage.insert("$match".to_string(), Value::Object(filter.clone()));
        self.aggregate(collection, &[stage])
    }

    /// Release the store's resources
    ///
    /// # Errors
    ///
    /// Returns `Storage` if shutdown fails.
    fn close(&self) -> Result<()> {
        Ok(())
    }
}
