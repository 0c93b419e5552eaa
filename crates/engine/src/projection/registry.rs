//! Model registry
//!
//! Maps each model to the name of the projection store that owns it, so a
//! process running several stores can route reader queries for a model to
//! the right one. Registering is also when a store aggregates its models'
//! event-type interest.

use crate::model::Model;
use foldline_core::{Interests, ModelId};
use std::collections::BTreeMap;

/// Model → owning store name
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    owners: BTreeMap<ModelId, String>,
}

impl ModelRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `store` owns `model`
    ///
    /// # Returns
    /// The previous owner, if the model was already registered.
    pub fn register(&mut self, model: &ModelId, store: &str) -> Option<String> {
        self.owners.insert(model.clone(), store.to_string())
    }

    /// Name of the store owning `model`
    pub fn store_for(&self, model: &ModelId) -> Option<&str> {
        self.owners.get(model).map(String::as_str)
    }

    /// Models owned by `store`, in identity order
    pub fn models_of(&self, store: &str) -> Vec<&ModelId> {
        self.owners
            .iter()
            .filter(|(_, owner)| owner.as_str() == store)
            .map(|(model, _)| model)
            .collect()
    }

    /// Number of registered models
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    /// True if no model is registered
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

/// Combined interest of a set of models
///
/// `All` if any model (or none at all) declares `All`, otherwise the sorted
/// union of the declared event types.
pub fn aggregate_interests<'a, I>(models: I) -> Interests
where
    I: IntoIterator<Item = &'a Model>,
{
    models
        .into_iter()
        .fold(None, |acc: Option<Interests>, model| {
            Some(match acc {
                None => model.interests().clone(),
                Some(acc) => acc.union(model.interests()),
            })
        })
        .unwrap_or(Interests::All)
}
