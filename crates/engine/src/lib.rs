//! Projection engine for foldline
//!
//! This crate ties the lower layers together:
//! - Models: name + version + a transform from events to change operations
//! - Read suspension: synchronous-looking reads inside transforms
//! - Batch replay coordination: running events, priming reads, replaying
//! - Checkpoints: durable "last applied event" per model collection
//! - ProjectionStore: the caller-facing API, its config and model registry
//!
//! Replay safety comes entirely from the guarded writes produced by
//! `foldline-concurrency`; the engine never needs to know whether an event
//! was applied before.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
pub mod coordinator;
pub mod model;
pub mod projection;
pub mod read;

pub use checkpoint::CheckpointStore;
pub use coordinator::{BatchReport, CoordinatorMetrics, MetricsSnapshot};
pub use model::{Model, TransformFn, TransformResult};
pub use projection::{
    aggregate_interests, ModelRegistry, ProjectionStore, StoreConfig, CONFIG_FILE_NAME,
};
pub use read::{Interrupt, ReadContext, ReadSlots, Suspension};
