//! Projection store
//!
//! The caller-facing entry point. A `ProjectionStore` owns a set of models,
//! a document store handle and the checkpoint records for the models'
//! collections:
//!
//! ```text
//! handle_events(events)
//!   → BatchCoordinator (transforms, suspensions, guarded bulk writes)
//!   → CheckpointStore::advance for every model
//! ```
//!
//! Checkpoints only advance after the whole batch succeeded. A failed batch
//! can be retried as is: writes it already made are no-ops on replay.

pub mod config;
pub mod registry;

pub use config::{StoreConfig, CONFIG_FILE_NAME};
pub use registry::{aggregate_interests, ModelRegistry};

use crate::checkpoint::CheckpointStore;
use crate::coordinator::{BatchCoordinator, CoordinatorMetrics, MetricsSnapshot};
use crate::model::Model;
use foldline_core::{Changes, Document, DocumentStore, Error, Event, Interests, ModelId, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{info, warn};

/// A set of projection models materialized into one document store
///
/// `ProjectionStore` is `Sync`: concurrent `handle_events` calls each run
/// with their own read cache. Replays rely on the write guards alone, so
/// overlapping batches for the same events converge on the same documents.
pub struct ProjectionStore<S: DocumentStore + ?Sized> {
    config: StoreConfig,
    store: Arc<S>,
    models: Vec<Model>,
    interests: Interests,
    checkpoints: CheckpointStore<S>,
    metrics: CoordinatorMetrics,
}

impl<S: DocumentStore + ?Sized> ProjectionStore<S> {
    /// Open a projection store over `store`
    ///
    /// Creates a checkpoint record (at 0) for every model collection that
    /// does not have one yet.
    ///
    /// # Errors
    ///
    /// - `Config` for invalid configuration, duplicate model identities, or
    ///   a model collection clashing with the checkpoint collection
    /// - Store errors from creating checkpoint records
    pub fn open(config: StoreConfig, store: Arc<S>, models: Vec<Model>) -> Result<Self> {
        config.validate()?;

        let mut seen = BTreeSet::new();
        for model in &models {
            if !seen.insert(model.id().clone()) {
                return Err(Error::Config(format!(
                    "model '{}' is registered twice in store '{}'",
                    model.id(),
                    config.name
                )));
            }
            if model.collection_name() == config.checkpoint_collection {
                return Err(Error::Config(format!(
                    "model '{}' collides with the checkpoint collection",
                    model.id()
                )));
            }
        }

        let checkpoints = CheckpointStore::new(Arc::clone(&store), config.checkpoint_collection.clone());
        for model in &models {
            checkpoints.ensure(&model.collection_name())?;
        }

        let interests = aggregate_interests(&models);
        info!(
            target: "foldline::store",
            store = %config.name,
            models = models.len(),
            interests = ?interests.event_types(),
            "Opened projection store"
        );

        Ok(ProjectionStore {
            config,
            store,
            models,
            interests,
            checkpoints,
            metrics: CoordinatorMetrics::default(),
        })
    }

    /// Store name
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Configuration the store was opened with
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Models in registration order
    pub fn models(&self) -> &[Model] {
        &self.models
    }

    /// Aggregated event-type interest of all models
    ///
    /// Informational: `handle_events` runs every model on every event it
    /// is given.
    pub fn interests(&self) -> &Interests {
        &self.interests
    }

    /// Underlying document store
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Cumulative batch counters
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Record this store as the owner of each of its models
    ///
    /// # Returns
    /// The aggregated interest, same as [`ProjectionStore::interests`].
    pub fn register_models(&self, registry: &mut ModelRegistry) -> Interests {
        for model in &self.models {
            if let Some(previous) = registry.register(model.id(), self.name()) {
                if previous != self.name() {
                    warn!(
                        target: "foldline::store",
                        model = %model.id(),
                        previous = %previous,
                        store = %self.name(),
                        "Model re-registered with a different store"
                    );
                }
            }
        }
        self.interests.clone()
    }

    /// Collection backing `model`
    pub fn collection_name(&self, model: &ModelId) -> String {
        model.collection_name()
    }

    /// Every document currently in `model`'s collection
    ///
    /// # Errors
    ///
    /// Returns a store error if the read fails.
    pub fn documents(&self, model: &ModelId) -> Result<Vec<Document>> {
        self.store.aggregate(&model.collection_name(), &[])
    }

    /// Run a read pipeline against `model`'s collection
    ///
    /// # Errors
    ///
    /// Returns a store error if the read fails.
    pub fn query(&self, model: &ModelId, pipeline: &[Document]) -> Result<Vec<Document>> {
        self.store.aggregate(&model.collection_name(), pipeline)
    }

    /// Apply a batch of events to every model
    ///
    /// Events are processed in the given order; ids may repeat (redelivery)
    /// or lag behind what was already applied, in which case the guarded
    /// writes leave newer state untouched.
    ///
    /// # Returns
    /// Effective changes per model collection. Every model appears, with a
    /// zero tally if it changed nothing.
    ///
    /// # Errors
    ///
    /// See the coordinator: store errors, contract errors, `Transform` and
    /// `ReplayLimit`. Checkpoints are not advanced when an error is returned.
    pub fn handle_events(&self, events: &[Event]) -> Result<BTreeMap<String, Changes>> {
        let coordinator = BatchCoordinator::new(&*self.store, &self.models, self.config.max_replay_passes);
        let report = coordinator.run(events, &self.metrics).map_err(|e| {
            warn!(
                target: "foldline::store",
                store = %self.config.name,
                events = events.len(),
                error = %e,
                "Batch failed; checkpoints not advanced"
            );
            e
        })?;

        if let Some(last) = events.last() {
            for model in &self.models {
                self.checkpoints.advance(&model.collection_name(), last.id)?;
            }
        }

        info!(
            target: "foldline::store",
            store = %self.config.name,
            events = events.len(),
            passes = report.passes,
            primed_reads = report.primed_reads,
            "Handled events"
        );
        Ok(report.changes)
    }

    /// Highest event id every model has applied
    ///
    /// # Errors
    ///
    /// Returns a store error if checkpoints cannot be read.
    pub fn last_seen_id(&self) -> Result<u64> {
        let collections: Vec<String> = self.models.iter().map(Model::collection_name).collect();
        self.checkpoints.min_of(&collections)
    }

    /// Checkpoint of a single model
    ///
    /// # Errors
    ///
    /// Returns a store error if the checkpoint cannot be read.
    pub fn checkpoint(&self, model: &ModelId) -> Result<u64> {
        self.checkpoints.get(&model.collection_name())
    }

    /// Drop every model collection and reset its checkpoint to 0
    ///
    /// A collection that cannot be dropped is logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns a store error if a checkpoint cannot be reset.
    pub fn clean(&self) -> Result<()> {
        for model in &self.models {
            let collection = model.collection_name();
            if let Err(e) = self.store.drop_collection(&collection) {
                warn!(
                    target: "foldline::store",
                    collection = %collection,
                    error = %e,
                    "Ignoring failed collection drop"
                );
            }
            self.checkpoints.reset(&collection)?;
        }
        info!(target: "foldline::store", store = %self.config.name, "Cleaned projection store");
        Ok(())
    }

    /// Close the underlying document store
    ///
    /// # Errors
    ///
    /// Returns the store's shutdown error.
    pub fn dispose(self) -> Result<()> {
        info!(target: "foldline::store", store = %self.config.name, "Disposing projection store");
        self.store.close()
    }
}

impl<S: DocumentStore + ?Sized> std::fmt::Debug for ProjectionStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectionStore")
            .field("name", &self.config.name)
            .field("models", &self.models)
            .field("interests", &self.interests)
            .finish_non_exhaustive()
    }
}
