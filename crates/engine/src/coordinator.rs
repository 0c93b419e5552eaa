//! Batch replay coordinator
//!
//! Drives one `handle_events` call:
//!
//! - Running: for each event, run every model's transform in registration
//!   order. A model that completes has its change operations compiled and
//!   written as one ordered bulk write.
//! - Interrupted: the first event where any model suspended ends the pass.
//!   Later events are not run.
//! - Priming: every suspended read is executed against the store and its
//!   result stored in the slot cache.
//! - Resuming: the next pass restarts at the interrupted event. Writes that
//!   event already made are no-ops the second time because their guards no
//!   longer match.
//!
//! The slot cache is cleared whenever an event completes with no
//! suspension, so a model never sees cached reads from an earlier event.

use crate::model::Model;
use crate::read::{Interrupt, ReadContext, ReadSlots, Suspension};
use foldline_concurrency::compile;
use foldline_core::{ChangeOp, Changes, DocumentStore, Error, Event, Result};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

// =============================================================================
// Metrics
// =============================================================================

/// Cumulative counters across every `handle_events` call of a store
///
/// Counters use Relaxed ordering; they are observational only.
#[derive(Debug, Default)]
pub struct CoordinatorMetrics {
    batches: AtomicU64,
    failed_batches: AtomicU64,
    events: AtomicU64,
    passes: AtomicU64,
    primed_reads: AtomicU64,
}

/// Point-in-time copy of [`CoordinatorMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Batches that completed successfully
    pub batches: u64,
    /// Batches that returned an error
    pub failed_batches: u64,
    /// Events in successful batches
    pub events: u64,
    /// Replay passes run, including the first pass of each batch
    pub passes: u64,
    /// Suspended reads executed against the store
    pub primed_reads: u64,
}

impl CoordinatorMetrics {
    /// Current counter values
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            batches: self.batches.load(Ordering::Relaxed),
            failed_batches: self.failed_batches.load(Ordering::Relaxed),
            events: self.events.load(Ordering::Relaxed),
            passes: self.passes.load(Ordering::Relaxed),
            primed_reads: self.primed_reads.load(Ordering::Relaxed),
        }
    }

    fn record(&self, report: &BatchReport, events: usize) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.events.fetch_add(events as u64, Ordering::Relaxed);
        self.passes.fetch_add(report.passes as u64, Ordering::Relaxed);
        self.primed_reads
            .fetch_add(report.primed_reads as u64, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.failed_batches.fetch_add(1, Ordering::Relaxed);
    }
}

// =============================================================================
// Coordinator
// =============================================================================

/// Result of a successful batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Effective changes per model collection
    pub changes: BTreeMap<String, Changes>,
    /// Passes run
    pub passes: usize,
    /// Suspended reads primed
    pub primed_reads: usize,
}

enum PassOutcome {
    Completed,
    Interrupted {
        offset: usize,
        suspensions: Vec<Suspension>,
    },
}

/// Runs one batch of events through a store's models
///
/// Owns the slot cache for the batch, so concurrent batches never share
/// cached reads.
pub(crate) struct BatchCoordinator<'a, S: DocumentStore + ?Sized> {
    store: &'a S,
    models: &'a [Model],
    max_passes_per_event: usize,
    slots: ReadSlots,
    report: BatchReport,
}

impl<'a, S: DocumentStore + ?Sized> BatchCoordinator<'a, S> {
    pub(crate) fn new(store: &'a S, models: &'a [Model], max_passes_per_event: usize) -> Self {
        let changes = models
            .iter()
            .map(|m| (m.collection_name(), Changes::default()))
            .collect();
        BatchCoordinator {
            store,
            models,
            max_passes_per_event,
            slots: ReadSlots::new(),
            report: BatchReport {
                changes,
                ..BatchReport::default()
            },
        }
    }

    /// Run every event through every model until no read is pending
    ///
    /// # Errors
    ///
    /// - Store errors from writes or primed reads propagate unchanged
    /// - Contract errors (from compiling ops, or raised inside a transform)
    ///   keep their category
    /// - Any other transform failure becomes `Error::Transform`
    /// - `Error::ReplayLimit` if one event keeps suspending
    pub(crate) fn run(mut self, events: &[Event], metrics: &CoordinatorMetrics) -> Result<BatchReport> {
        match self.replay(events) {
            Ok(()) => {
                metrics.record(&self.report, events.len());
                Ok(self.report)
            }
            Err(e) => {
                metrics.record_failure();
                Err(e)
            }
        }
    }

    fn replay(&mut self, events: &[Event]) -> Result<()> {
        let mut start = 0;
        let mut passes_at_start = 0;
        while start < events.len() {
            passes_at_start += 1;
            if passes_at_start > self.max_passes_per_event {
                return Err(Error::ReplayLimit {
                    passes: self.max_passes_per_event,
                    event_id: events[start].id,
                });
            }
            self.report.passes += 1;
            debug!(
                target: "foldline::replay",
                pass = self.report.passes,
                from_event = events[start].id,
                "Starting replay pass"
            );

            match self.run_pass(&events[start..])? {
                PassOutcome::Completed => break,
                PassOutcome::Interrupted { offset, suspensions } => {
                    if offset > 0 {
                        start += offset;
                        passes_at_start = 1;
                    }
                    self.prime(&suspensions)?;
                }
            }
        }
        Ok(())
    }

    fn run_pass(&mut self, events: &[Event]) -> Result<PassOutcome> {
        for (offset, event) in events.iter().enumerate() {
            let mut suspensions = Vec::new();
            for model in self.models {
                let outcome = {
                    let mut ctx = ReadContext::new(model.id(), &self.slots);
                    model.transform(event, &mut ctx)
                };
                match outcome {
                    Ok(ops) => self.apply(model, event, ops)?,
                    Err(Interrupt::Suspend(suspension)) => suspensions.push(suspension),
                    Err(Interrupt::Abort(source)) => {
                        return Err(transform_failure(model, event, source))
                    }
                }
            }

            if !suspensions.is_empty() {
                debug!(
                    target: "foldline::replay",
                    event_id = event.id,
                    suspended = suspensions.len(),
                    "Pass interrupted"
                );
                return Ok(PassOutcome::Interrupted { offset, suspensions });
            }
            self.slots.clear();
        }
        Ok(PassOutcome::Completed)
    }

    fn apply(&mut self, model: &Model, event: &Event, ops: Vec<ChangeOp>) -> Result<()> {
        let writes = compile(ops, event.id)?;
        if writes.is_empty() {
            return Ok(());
        }
        let collection = model.collection_name();
        let summary = self.store.bulk_write(&collection, &writes).map_err(|e| {
            warn!(
                target: "foldline::replay",
                collection = %collection,
                event_id = event.id,
                error = %e,
                "Bulk write failed"
            );
            e
        })?;
        *self.report.changes.entry(collection).or_default() += summary.changes();
        Ok(())
    }

    fn prime(&mut self, suspensions: &[Suspension]) -> Result<()> {
        for suspension in suspensions {
            let documents = self
                .store
                .aggregate(&suspension.collection, &suspension.pipeline)
                .map_err(|e| read_failure(suspension, e))?;
            debug!(
                target: "foldline::replay",
                model = %suspension.model,
                collection = %suspension.collection,
                slot = suspension.slot,
                documents = documents.len(),
                "Primed read"
            );
            self.slots.fill(suspension, documents);
            self.report.primed_reads += 1;
        }
        Ok(())
    }
}

/// Priming reads fail as `Error::Read`, whatever the store reported
fn read_failure(suspension: &Suspension, error: Error) -> Error {
    warn!(
        target: "foldline::replay",
        model = %suspension.model,
        collection = %suspension.collection,
        slot = suspension.slot,
        error = %error,
        "Primed read failed"
    );
    match error {
        Error::Read { .. } => error,
        other => Error::Read {
            collection: suspension.collection.clone(),
            reason: other.to_string(),
        },
    }
}

fn transform_failure(model: &Model, event: &Event, source: anyhow::Error) -> Error {
    match source.downcast::<Error>() {
        Ok(inner) => inner,
        Err(source) => {
            warn!(
                target: "foldline::replay",
                model = %model.id(),
                event_id = event.id,
                error = %source,
                "Transform failed"
            );
            Error::Transform {
                model: model.collection_name(),
                event_id: event.id,
                source,
            }
        }
    }
}
