//! Read-suspension channel
//!
//! A transform is a plain synchronous function, yet it may need to read data
//! that earlier events in the same batch have just written. It does so through
//! [`ReadContext`]:
//!
//! 1. The Nth read of an invocation looks up slot N of the model's slot cache.
//! 2. A filled slot is returned immediately.
//! 3. An empty slot ends the invocation with [`Interrupt::Suspend`], which the
//!    transform propagates with `?`.
//! 4. The coordinator executes the suspended query against the store, fills
//!    the slot, and re-runs the transform from the top. Slots 0..N are now
//!    cache hits and the transform proceeds one read further.
//!
//! Transforms must therefore be deterministic given the event and the results
//! of their reads.

use foldline_core::{Document, ModelId, Pipeline};
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

// =============================================================================
// Interrupt
// =============================================================================

/// A read the coordinator must perform before the transform can continue
#[derive(Debug, Clone, PartialEq)]
pub struct Suspension {
    /// Model whose slot the result belongs to
    pub model: ModelId,
    /// Collection to query
    pub collection: String,
    /// Aggregation pipeline to run
    pub pipeline: Pipeline,
    /// Position of the read within the transform invocation
    pub slot: usize,
}

/// Why a transform stopped without producing change operations
///
/// `Suspend` is control flow handled by the coordinator and never reaches
/// callers of `handle_events`. `Abort` is a genuine failure.
///
/// Any `std::error::Error` converts into `Abort`, so transforms can use `?`
/// on fallible calls (payload parsing, document conversion, ...).
pub enum Interrupt {
    /// A read is pending
    Suspend(Suspension),
    /// The transform failed
    Abort(anyhow::Error),
}

impl Interrupt {
    /// Abort with a message
    pub fn msg<M>(message: M) -> Self
    where
        M: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Interrupt::Abort(anyhow::Error::msg(message))
    }

    /// True for `Suspend`
    pub fn is_suspension(&self) -> bool {
        matches!(self, Interrupt::Suspend(_))
    }
}

impl fmt::Debug for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interrupt::Suspend(s) => f
                .debug_struct("Suspend")
                .field("model", &s.model)
                .field("collection", &s.collection)
                .field("slot", &s.slot)
                .finish(),
            Interrupt::Abort(e) => f.debug_tuple("Abort").field(e).finish(),
        }
    }
}

impl<E> From<E> for Interrupt
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Interrupt::Abort(anyhow::Error::new(error))
    }
}

// =============================================================================
// Slot cache
// =============================================================================

#[derive(Debug, Clone)]
struct Slot {
    collection: String,
    pipeline: Pipeline,
    documents: Vec<Document>,
}

/// Resolved read results, per model, in read-call order
///
/// Lives for one `handle_events` call. Cleared whenever an event completes
/// with no suspension, so cached reads never leak into the next event.
#[derive(Debug, Default)]
pub struct ReadSlots {
    slots: BTreeMap<ModelId, Vec<Option<Slot>>>,
}

impl ReadSlots {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the result of a primed suspension in its slot
    pub fn fill(&mut self, suspension: &Suspension, documents: Vec<Document>) {
        let model_slots = self.slots.entry(suspension.model.clone()).or_default();
        if model_slots.len() <= suspension.slot {
            model_slots.resize(suspension.slot + 1, None);
        }
        model_slots[suspension.slot] = Some(Slot {
            collection: suspension.collection.clone(),
            pipeline: suspension.pipeline.clone(),
            documents,
        });
    }

    /// Drop every cached result
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// True if no slot holds a result
    pub fn is_empty(&self) -> bool {
        self.slots.values().all(|s| s.iter().all(Option::is_none))
    }

    /// Number of filled slots for a model
    pub fn filled(&self, model: &ModelId) -> usize {
        self.slots
            .get(model)
            .map(|s| s.iter().filter(|slot| slot.is_some()).count())
            .unwrap_or(0)
    }

    fn get(&self, model: &ModelId, index: usize) -> Option<&Slot> {
        self.slots.get(model)?.get(index)?.as_ref()
    }
}

// =============================================================================
// ReadContext
// =============================================================================

/// Per-invocation read handle passed to a transform
///
/// Holds the executing model's identity, the slot cursor and a view of the
/// slot cache. A fresh context is created for every invocation, so the cursor
/// always starts at 0.
pub struct ReadContext<'a> {
    model: &'a ModelId,
    collection: String,
    cursor: usize,
    slots: &'a ReadSlots,
}

impl<'a> ReadContext<'a> {
    /// Create a context for one invocation of `model`'s transform
    pub fn new(model: &'a ModelId, slots: &'a ReadSlots) -> Self {
        ReadContext {
            model,
            collection: model.collection_name(),
            cursor: 0,
            slots,
        }
    }

    /// Identity of the executing model
    pub fn model(&self) -> &ModelId {
        self.model
    }

    /// Number of reads served so far in this invocation
    pub fn reads(&self) -> usize {
        self.cursor
    }

    /// Run a pipeline against the executing model's own collection
    ///
    /// # Errors
    ///
    /// Returns `Interrupt::Suspend` when the result is not cached yet.
    pub fn read(&mut self, pipeline: Pipeline) -> Result<Vec<Document>, Interrupt> {
        let collection = self.collection.clone();
        self.read_collection(&collection, pipeline)
    }

    /// Run a pipeline against another model's collection
    ///
    /// # Errors
    ///
    /// Returns `Interrupt::Suspend` when the result is not cached yet.
    pub fn read_from(&mut self, model: &ModelId, pipeline: Pipeline) -> Result<Vec<Document>, Interrupt> {
        self.read_collection(&model.collection_name(), pipeline)
    }

    /// Run a pipeline against a collection by name
    ///
    /// # Errors
    ///
    /// Returns `Interrupt::Suspend` when the result is not cached yet.
    pub fn read_collection(&mut self, collection: &str, pipeline: Pipeline) -> Result<Vec<Document>, Interrupt> {
        let Some(slot) = self.slots.get(self.model, self.cursor) else {
            return Err(Interrupt::Suspend(Suspension {
                model: self.model.clone(),
                collection: collection.to_string(),
                pipeline,
                slot: self.cursor,
            }));
        };

        if slot.collection != collection || slot.pipeline != pipeline {
            warn!(
                target: "foldline::read",
                model = %self.model,
                slot = self.cursor,
                cached_collection = %slot.collection,
                collection,
                "Read slot was primed by a different query; transform is not deterministic"
            );
        }

        self.cursor += 1;
        Ok(slot.documents.clone())
    }
}
