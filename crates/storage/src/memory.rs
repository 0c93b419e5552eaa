//! MemoryStore: in-process document store
//!
//! This module implements the DocumentStore trait using:
//! - `BTreeMap<String, Vec<Document>>` for collections in insertion order
//! - `parking_lot::RwLock` for thread-safe access
//! - `AtomicU64` counters for reads and bulk writes, used by tests to observe
//!   how often the engine reaches the store
//!
//! # Design Notes
//!
//! - **Ordered bulk writes**: operations apply in sequence under one write
//!   lock; the first failure stops the batch and earlier writes stay applied
//! - **Implicit collections**: a collection comes into existence on its
//!   first stored document; reading an unknown collection yields nothing
//! - **Identifiers**: documents without `_id` receive a random UUID string

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, trace};
use uuid::Uuid;

use foldline_core::{
    Document, DocumentStore, Error, Modification, Result, WriteOp, WriteSummary, ID_FIELD,
};

use crate::compare::values_equal;
use crate::filter::matches;
use crate::pipeline::aggregate;
use crate::update::{apply_update, seed_from_filter};

/// Snapshot of a store's call counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of `aggregate` calls served
    pub aggregates: u64,
    /// Number of `bulk_write` calls served
    pub bulk_writes: u64,
}

/// In-memory document store
///
/// Thread-safe through `parking_lot::RwLock`. Reads clone matching documents
/// out of the lock, so callers never hold references into the store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Collection name → documents in insertion order
    collections: RwLock<BTreeMap<String, Vec<Document>>>,
    aggregates: AtomicU64,
    bulk_writes: AtomicU64,
    closed: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Call counters since creation
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            aggregates: self.aggregates.load(Ordering::Relaxed),
            bulk_writes: self.bulk_writes.load(Ordering::Relaxed),
        }
    }

    /// Number of documents in a collection
    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// True once [`DocumentStore::close`] has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::storage("store is closed"));
        }
        Ok(())
    }

    /// Apply one write to a collection's documents
    fn apply_write(docs: &mut Vec<Document>, op: &WriteOp, summary: &mut WriteSummary) -> Result<()> {
        match op {
            WriteOp::InsertOne { document } => {
                let document = with_id(document.clone());
                ensure_unique_id(docs, &document)?;
                docs.push(document);
                summary.inserted += 1;
            }
            WriteOp::UpdateOne {
                filter,
                update,
                array_filters,
                upsert,
            } => Self::apply_update_op(docs, filter, update, array_filters.as_deref(), *upsert, false, summary)?,
            WriteOp::UpdateMany {
                filter,
                update,
                array_filters,
                upsert,
            } => Self::apply_update_op(docs, filter, update, array_filters.as_deref(), *upsert, true, summary)?,
            WriteOp::DeleteOne { filter } => {
                if let Some(index) = first_match(docs, filter)? {
                    docs.remove(index);
                    summary.deleted += 1;
                }
            }
            WriteOp::DeleteMany { filter } => {
                // Evaluate every filter before removing anything
                let mut keep = Vec::with_capacity(docs.len());
                for doc in docs.iter() {
                    keep.push(!matches(doc, filter)?);
                }
                let before = docs.len();
                let mut flags = keep.into_iter();
                docs.retain(|_| flags.next().unwrap_or(true));
                summary.deleted += (before - docs.len()) as u64;
            }
        }
        Ok(())
    }

    fn apply_update_op(
        docs: &mut Vec<Document>,
        filter: &Document,
        update: &Modification,
        array_filters: Option<&[Document]>,
        upsert: bool,
        many: bool,
        summary: &mut WriteSummary,
    ) -> Result<()> {
        let array_filters = array_filters.unwrap_or(&[]);

        let mut targets = Vec::new();
        for (index, doc) in docs.iter().enumerate() {
            if matches(doc, filter)? {
                targets.push(index);
                if !many {
                    break;
                }
            }
        }

        if targets.is_empty() {
            if upsert {
                let seeded = apply_update(&seed_from_filter(filter), update, array_filters, true)?;
                let document = with_id(seeded);
                ensure_unique_id(docs, &document)?;
                docs.push(document);
                summary.upserted += 1;
            }
            return Ok(());
        }

        for index in targets {
            summary.matched += 1;
            let updated = apply_update(&docs[index], update, array_filters, false)?;
            if updated != docs[index] {
                if !ids_equal(&updated, &docs[index]) {
                    return Err(Error::invalid_query("updates may not change _id"));
                }
                docs[index] = updated;
                summary.modified += 1;
            }
        }
        Ok(())
    }
}

fn with_id(mut document: Document) -> Document {
    if !document.contains_key(ID_FIELD) {
        document.insert(ID_FIELD.to_string(), Value::String(Uuid::new_v4().to_string()));
    }
    document
}

fn ids_equal(a: &Document, b: &Document) -> bool {
    match (a.get(ID_FIELD), b.get(ID_FIELD)) {
        (Some(x), Some(y)) => values_equal(x, y),
        (None, None) => true,
        _ => false,
    }
}

fn ensure_unique_id(docs: &[Document], document: &Document) -> Result<()> {
    if docs.iter().any(|existing| ids_equal(existing, document)) {
        return Err(Error::invalid_query(format!(
            "duplicate key {}",
            document.get(ID_FIELD).cloned().unwrap_or(Value::Null)
        )));
    }
    Ok(())
}

fn first_match(docs: &[Document], filter: &Document) -> Result<Option<usize>> {
    for (index, doc) in docs.iter().enumerate() {
        if matches(doc, filter)? {
            return Ok(Some(index));
        }
    }
    Ok(None)
}

impl DocumentStore for MemoryStore {
    fn aggregate(&self, collection: &str, pipeline: &[Document]) -> Result<Vec<Document>> {
        self.ensure_open()?;
        self.aggregates.fetch_add(1, Ordering::Relaxed);

        let docs = self
            .collections
            .read()
            .get(collection)
            .cloned()
            .unwrap_or_default();
        let out = aggregate(docs, pipeline)?;
        trace!(target: "foldline::store", collection, stages = pipeline.len(), results = out.len(), "Aggregate");
        Ok(out)
    }

    fn bulk_write(&self, collection: &str, ops: &[WriteOp]) -> Result<WriteSummary> {
        self.ensure_open()?;
        self.bulk_writes.fetch_add(1, Ordering::Relaxed);

        let mut summary = WriteSummary::default();
        if ops.is_empty() {
            return Ok(summary);
        }

        // Hold the write lock for the whole batch
        let mut collections = self.collections.write();
        let docs = collections.entry(collection.to_string()).or_default();

        let mut failure = None;
        for (index, op) in ops.iter().enumerate() {
            if let Err(e) = Self::apply_write(docs, op, &mut summary) {
                failure = Some(Error::Write {
                    collection: collection.to_string(),
                    index,
                    reason: e.to_string(),
                });
                break;
            }
        }

        if docs.is_empty() {
            collections.remove(collection);
        }

        if let Some(e) = failure {
            debug!(target: "foldline::store", collection, error = %e, "Bulk write stopped");
            return Err(e);
        }

        trace!(
            target: "foldline::store",
            collection,
            ops = ops.len(),
            inserted = summary.inserted,
            upserted = summary.upserted,
            modified = summary.modified,
            deleted = summary.deleted,
            "Bulk write"
        );
        Ok(summary)
    }

    fn drop_collection(&self, collection: &str) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.collections.write().remove(collection).is_some())
    }

    fn collection_names(&self) -> Result<Vec<String>> {
        self.ensure_open()?;
        Ok(self.collections.read().keys().cloned().collect())
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
