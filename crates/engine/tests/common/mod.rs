//! Shared helpers for engine integration tests

#![allow(dead_code)]

use foldline_core::{to_pipeline, Document, Event, ModelId};
use foldline_engine::{Model, ProjectionStore, StoreConfig};
use foldline_storage::MemoryStore;
use serde_json::{json, Value};
use std::sync::Arc;

/// Route engine logs to the test harness output
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Open a projection store over a fresh in-memory store
pub fn open(models: Vec<Model>) -> (Arc<MemoryStore>, ProjectionStore<MemoryStore>) {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let projections = ProjectionStore::open(StoreConfig::new("test"), Arc::clone(&store), models)
        .expect("open projection store");
    (store, projections)
}

/// Event with a JSON payload
pub fn event(id: u64, event_type: &str, payload: Value) -> Event {
    Event::new(id, event_type, payload)
}

/// Event with an empty payload
pub fn bare(id: u64, event_type: &str) -> Event {
    Event::bare(id, event_type)
}

/// Documents of a model sorted by `id` descending
pub fn sorted_desc(projections: &ProjectionStore<MemoryStore>, model: &ModelId) -> Vec<Document> {
    let pipeline = to_pipeline(json!([{"$sort": {"id": -1}}])).unwrap();
    projections.query(model, &pipeline).unwrap()
}

/// One field from each document
pub fn field(docs: &[Document], name: &str) -> Vec<Value> {
    docs.iter()
        .map(|d| d.get(name).cloned().unwrap_or(Value::Null))
        .collect()
}
