//! Shared test utilities for the workspace-level scenario suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]

use foldline::{to_pipeline, Document, MemoryStore, Model, ModelId, ProjectionStore, StoreConfig};
use serde_json::{json, Value};
use std::sync::{Arc, Once};

static INIT_TRACING: Once = Once::new();

/// Install a test-writer subscriber once per test binary.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing_subscriber::filter::LevelFilter::INFO)
            .with_test_writer()
            .try_init();
    });
}

/// Open a named projection store over a fresh `MemoryStore`.
pub fn open_store(name: &str, models: Vec<Model>) -> anyhow::Result<(Arc<MemoryStore>, ProjectionStore<MemoryStore>)> {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let projections = ProjectionStore::open(StoreConfig::new(name), Arc::clone(&store), models)?;
    Ok((store, projections))
}

/// All documents of a model ordered by `field` ascending, without store ids.
pub fn ordered_by(
    projections: &ProjectionStore<MemoryStore>,
    model: &ModelId,
    field: &str,
) -> anyhow::Result<Vec<Document>> {
    let pipeline = to_pipeline(json!([
        {"$sort": {field: 1}},
        {"$project": {"_id": 0}}
    ]))?;
    Ok(projections.query(model, &pipeline)?)
}

/// Field `name` of every document, `null` where missing.
pub fn column(docs: &[Document], name: &str) -> Vec<Value> {
    docs.iter()
        .map(|d| d.get(name).cloned().unwrap_or(Value::Null))
        .collect()
}
