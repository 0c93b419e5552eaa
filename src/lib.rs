//! Foldline - replay-safe event projections into document collections
//!
//! Foldline maintains materialized, queryable collections derived from an
//! ordered event log that may redeliver events. Each model transforms events
//! into logical inserts, updates and deletes; every one of them is stamped
//! with `(event id, position)` and written behind a guard, so it takes effect
//! at most once no matter how often the event is delivered.
//!
//! # Quick Start
//!
//! ```
//! use foldline::{to_document, ChangeOp, Event, MemoryStore, Model, ProjectionStore, StoreConfig};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let users = Model::new("users", "1", |event, _ctx| {
//!     Ok(vec![ChangeOp::insert_one(to_document(json!({"id": event.id}))?)])
//! });
//! let projections =
//!     ProjectionStore::open(StoreConfig::new("app"), Arc::new(MemoryStore::new()), vec![users])?;
//!
//! projections.handle_events(&[Event::bare(1, "user_created")])?;
//! // Redelivery changes nothing
//! let changes = projections.handle_events(&[Event::bare(1, "user_created")])?;
//! assert!(changes["users_v1"].is_empty());
//! assert_eq!(projections.last_seen_id()?, 1);
//! # Ok::<(), foldline::Error>(())
//! ```
//!
//! # Architecture
//!
//! - `foldline-core`: events, change operations, stamps, the `DocumentStore` trait
//! - `foldline-concurrency`: the change compiler and its write guards
//! - `foldline-storage`: `MemoryStore`, an in-memory document store
//! - `foldline-engine`: models, read suspension, replay coordination, checkpoints

pub use foldline_core::{
    to_document, to_pipeline, ChangeOp, Changes, DeleteSpec, Document, DocumentStore, Error,
    Event, Interests, ModelId, Modification, Pipeline, Result, Stamp, UpdateSpec, WriteOp,
    WriteSummary,
};
pub use foldline_engine::*;
pub use foldline_storage::{MemoryStore, StoreStats};

/// Change compilation, for stores that want to inspect guarded writes
pub mod compiler {
    pub use foldline_concurrency::{compile, compile_op, newer_than, older_than, with_guard};
}
