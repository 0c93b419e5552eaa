//! Core types and traits for foldline
//!
//! This crate defines the foundational types shared by the compiler, the
//! stores and the projection engine:
//! - Event, ModelId, Interests: what flows in and who consumes it
//! - Document, Pipeline: the JSON shapes exchanged with the store
//! - ChangeOp: the logical changes a transform returns
//! - Stamp, StampSequence: the `(version, op)` ordering of writes
//! - FieldPath: dotted paths into documents
//! - Error: error type hierarchy
//! - Traits: the DocumentStore abstraction, physical writes and summaries

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod change;
pub mod document;
pub mod error;
pub mod event;
pub mod path;
pub mod stamp;
pub mod traits;

pub use change::{ChangeOp, DeleteSpec, Modification, UpdateSpec};
pub use document::{
    get_u64, is_reserved_field, to_document, to_pipeline, Document, Pipeline, ID_FIELD, OP_FIELD,
    RESERVED_FIELDS, VERSION_FIELD,
};
pub use error::{Error, Result};
pub use event::{Event, Interests, ModelId};
pub use path::{FieldPath, PathError, PathParseError, PathSegment};
pub use stamp::{Stamp, StampSequence};
pub use traits::{Changes, DocumentStore, WriteOp, WriteSummary};
