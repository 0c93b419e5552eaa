//! Projection models
//!
//! A model pairs an identity (name + version, which fixes its collection)
//! with a transform turning each event into change operations. Models are
//! registered with a [`ProjectionStore`](crate::ProjectionStore) at open time
//! and run in registration order.

use crate::read::{Interrupt, ReadContext};
use foldline_core::{ChangeOp, Event, Interests, ModelId};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Outcome of one transform invocation
pub type TransformResult = std::result::Result<Vec<ChangeOp>, Interrupt>;

/// Signature of a model transform
pub type TransformFn = dyn Fn(&Event, &mut ReadContext<'_>) -> TransformResult + Send + Sync;

/// A projection model
///
/// Cloning is cheap: the transform is shared.
#[derive(Clone)]
pub struct Model {
    id: ModelId,
    interests: Interests,
    transform: Arc<TransformFn>,
}

impl Model {
    /// Create a model interested in every event type
    ///
    /// # Arguments
    ///
    /// * `name` - Model name
    /// * `version` - Model version; bumping it projects into a fresh collection
    /// * `transform` - Maps an event to change operations. Must be deterministic
    ///   given the event and the results of its reads.
    pub fn new<F>(name: impl Into<String>, version: impl Into<String>, transform: F) -> Self
    where
        F: Fn(&Event, &mut ReadContext<'_>) -> TransformResult + Send + Sync + 'static,
    {
        Model {
            id: ModelId::new(name, version),
            interests: Interests::All,
            transform: Arc::new(transform),
        }
    }

    /// Create a model whose transform emits change operations in JSON form
    ///
    /// The returned value must be an array of `{"insertOne": ...}`-shaped
    /// objects. A shape matching no change operation fails the batch with
    /// `Error::UnknownChangeOp`.
    pub fn from_json<F>(name: impl Into<String>, version: impl Into<String>, transform: F) -> Self
    where
        F: Fn(&Event, &mut ReadContext<'_>) -> std::result::Result<Value, Interrupt>
            + Send
            + Sync
            + 'static,
    {
        Self::new(name, version, move |event, ctx| {
            let raw = transform(event, ctx)?;
            Ok(ChangeOp::from_values(raw)?)
        })
    }

    /// Restrict the event types this model declares interest in
    pub fn with_interests(mut self, interests: Interests) -> Self {
        self.interests = interests;
        self
    }

    /// Model identity
    pub fn id(&self) -> &ModelId {
        &self.id
    }

    /// Model name
    pub fn name(&self) -> &str {
        &self.id.name
    }

    /// Model version
    pub fn version(&self) -> &str {
        &self.id.version
    }

    /// Collection backing this model
    pub fn collection_name(&self) -> String {
        self.id.collection_name()
    }

    /// Declared event-type interest
    pub fn interests(&self) -> &Interests {
        &self.interests
    }

    /// Run the transform for one event
    pub fn transform(&self, event: &Event, ctx: &mut ReadContext<'_>) -> TransformResult {
        (self.transform)(event, ctx)
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("id", &self.id)
            .field("interests", &self.interests)
            .finish_non_exhaustive()
    }
}
