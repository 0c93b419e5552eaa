//! Document storage for foldline
//!
//! This crate implements the in-process document store with:
//! - MemoryStore: collections of JSON documents behind a `parking_lot::RwLock`
//! - Query filters (`$eq`, `$gt`, `$in`, `$or`, ...)
//! - Update operators (`$set`, `$inc`, `$setOnInsert`, positional paths, ...)
//! - Aggregation and update pipelines (`$match`, `$project`, `$addFields`, ...)
//!
//! The query language is the familiar document-database dialect, restricted
//! to what projections need.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod compare;
pub mod expr;
mod fields;
pub mod filter;
pub mod memory;
pub mod pipeline;
pub mod update;

pub use filter::matches;
pub use memory::{MemoryStore, StoreStats};
pub use pipeline::aggregate;
