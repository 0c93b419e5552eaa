//! ProjectionStore Integration Tests
//!
//! Covers the caller-facing contract of `handle_events`:
//! - every event reaches every model, and every model gets a tally
//! - checkpoints advance once per successful batch and never move back
//! - a failed batch leaves checkpoints alone and can be retried
//! - errors keep their category (store, contract, transform, replay limit)

mod common;

use common::{bare, open};
use foldline_core::{
    to_document, ChangeOp, Changes, Document, DocumentStore, Error, Interests, ModelId, Result,
    WriteOp, WriteSummary,
};
use foldline_engine::{Interrupt, Model, ModelRegistry, ProjectionStore, StoreConfig, CONFIG_FILE_NAME};
use foldline_storage::MemoryStore;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

fn insert_event_id(name: &str) -> Model {
    Model::new(name, "1", |e, _| {
        Ok(vec![ChangeOp::insert_one(to_document(json!({"id": e.id}))?)])
    })
}

// ============================================================================
// Fan-out and tallies
// ============================================================================

#[test]
fn every_event_reaches_every_model() {
    let calls = Arc::new(AtomicUsize::new(0));
    let models = ["model_1", "model_2"]
        .iter()
        .map(|name| {
            let calls = Arc::clone(&calls);
            Model::new(*name, "1", move |_, _| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Vec::new())
            })
        })
        .collect();
    let (_, projections) = open(models);

    let changes = projections
        .handle_events(&[bare(1, "event_1"), bare(2, "event_2"), bare(3, "event_1")])
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 6);
    assert_eq!(changes.len(), 2);
    assert!(changes.values().all(Changes::is_empty));
    assert_eq!(projections.last_seen_id().unwrap(), 3);
}

#[test]
fn bulk_writes_land_in_the_model_collection() {
    let model = Model::new("model_1", "1", |e, _| {
        Ok(vec![ChangeOp::insert_one(to_document(
            json!({"id": e.id, "name": format!("test_{}", e.event_type)}),
        )?)])
    });
    let id = model.id().clone();
    let (store, projections) = open(vec![model]);

    projections.handle_events(&[bare(1, "event_1"), bare(2, "event_2")]).unwrap();

    assert_eq!(projections.collection_name(&id), "model_1_v1");
    assert_eq!(store.count("model_1_v1"), 2);
}

#[test]
fn tally_counts_effective_changes() {
    let model = Model::new("tally", "1", |e, _| match e.event_type.as_str() {
        "created" => Ok(vec![ChangeOp::insert_many(vec![
            to_document(json!({"id": 1, "n": 0}))?,
            to_document(json!({"id": 2, "n": 0}))?,
        ])]),
        _ => Ok(vec![ChangeOp::update_many(
            to_document(json!({}))?,
            to_document(json!({"$inc": {"n": 1}}))?,
        )]),
    });
    let (_, projections) = open(vec![model]);

    let changes = projections
        .handle_events(&[bare(1, "created"), bare(2, "bumped"), bare(2, "bumped")])
        .unwrap();

    assert_eq!(
        changes["tally_v1"],
        Changes {
            added: 2,
            updated: 2,
            deleted: 0
        }
    );
}

#[test]
fn models_write_disjoint_events() {
    let odd = Model::new("model_1", "1", |e, _| {
        if e.id % 2 == 0 {
            return Ok(Vec::new());
        }
        Ok(vec![ChangeOp::insert_one(to_document(json!({"id": e.id}))?)])
    });
    let even = Model::new("model_2", "1", |e, _| {
        if e.id % 2 == 1 {
            return Ok(Vec::new());
        }
        Ok(vec![ChangeOp::insert_one(to_document(json!({"id": e.id}))?)])
    });
    let (odd_id, even_id) = (odd.id().clone(), even.id().clone());
    let (_, projections) = open(vec![odd, even]);

    projections
        .handle_events(&[bare(1, "event_1"), bare(2, "event_2"), bare(3, "event_1")])
        .unwrap();

    assert_eq!(projections.documents(&odd_id).unwrap().len(), 2);
    assert_eq!(projections.documents(&even_id).unwrap().len(), 1);
    projections.dispose().unwrap();
}

// ============================================================================
// Interests and registry
// ============================================================================

#[test]
fn interests_are_the_sorted_union() {
    let (_, projections) = open(vec![
        insert_event_id("model_1").with_interests(Interests::only(["event_3", "event_2"])),
        insert_event_id("model_2").with_interests(Interests::only(["event_1", "event_2"])),
    ]);
    let mut registry = ModelRegistry::new();
    let interests = projections.register_models(&mut registry);

    assert_eq!(interests.event_types(), vec!["event_1", "event_2", "event_3"]);
    assert_eq!(registry.models_of("test").len(), 2);
}

#[test]
fn one_unrestricted_model_means_all_events() {
    let (_, projections) = open(vec![
        insert_event_id("model_1").with_interests(Interests::only(["event_3", "event_2"])),
        insert_event_id("model_2"),
    ]);
    let mut registry = ModelRegistry::new();
    assert_eq!(projections.register_models(&mut registry), Interests::All);
    assert!(projections.interests().event_types().is_empty());
}

// ============================================================================
// Checkpoints
// ============================================================================

#[test]
fn checkpoints_never_move_back() {
    let (_, projections) = open(vec![insert_event_id("a"), insert_event_id("b")]);

    projections.handle_events(&[bare(1, "t"), bare(5, "t")]).unwrap();
    assert_eq!(projections.last_seen_id().unwrap(), 5);

    projections.handle_events(&[bare(3, "t")]).unwrap();
    assert_eq!(projections.last_seen_id().unwrap(), 5);
    assert_eq!(projections.checkpoint(&ModelId::new("a", "1")).unwrap(), 5);
}

#[test]
fn reopening_keeps_checkpoints() {
    let store = Arc::new(MemoryStore::new());
    {
        let projections =
            ProjectionStore::open(StoreConfig::new("x"), Arc::clone(&store), vec![insert_event_id("a")])
                .unwrap();
        projections.handle_events(&[bare(7, "t")]).unwrap();
    }
    let reopened =
        ProjectionStore::open(StoreConfig::new("x"), store, vec![insert_event_id("a"), insert_event_id("b")])
            .unwrap();

    // The new model has applied nothing yet
    assert_eq!(reopened.checkpoint(&ModelId::new("a", "1")).unwrap(), 7);
    assert_eq!(reopened.last_seen_id().unwrap(), 0);
}

// ============================================================================
// Failures
// ============================================================================

/// Delegates to a `MemoryStore` but can refuse writes or reads on one collection
struct FlakyStore {
    inner: MemoryStore,
    failing_collection: String,
    failing: AtomicBool,
    failing_reads: AtomicBool,
}

impl FlakyStore {
    fn new(failing_collection: &str, writes: bool, reads: bool) -> Self {
        FlakyStore {
            inner: MemoryStore::new(),
            failing_collection: failing_collection.to_string(),
            failing: AtomicBool::new(writes),
            failing_reads: AtomicBool::new(reads),
        }
    }
}

impl DocumentStore for FlakyStore {
    fn aggregate(&self, collection: &str, pipeline: &[Document]) -> Result<Vec<Document>> {
        if collection == self.failing_collection && self.failing_reads.load(Ordering::SeqCst) {
            return Err(Error::storage("connection reset"));
        }
        self.inner.aggregate(collection, pipeline)
    }

    fn bulk_write(&self, collection: &str, ops: &[WriteOp]) -> Result<WriteSummary> {
        if collection == self.failing_collection && self.failing.load(Ordering::SeqCst) {
            return Err(Error::Write {
                collection: collection.to_string(),
                index: 0,
                reason: "connection reset".to_string(),
            });
        }
        self.inner.bulk_write(collection, ops)
    }

    fn drop_collection(&self, collection: &str) -> Result<bool> {
        self.inner.drop_collection(collection)
    }

    fn collection_names(&self) -> Result<Vec<String>> {
        self.inner.collection_names()
    }
}

#[test]
fn failed_batch_leaves_checkpoints_and_can_be_retried() {
    common::init_tracing();
    let store = Arc::new(FlakyStore::new("b_v1", true, false));
    let projections = ProjectionStore::open(
        StoreConfig::default(),
        Arc::clone(&store),
        vec![insert_event_id("a"), insert_event_id("b")],
    )
    .unwrap();
    let events = [bare(1, "t"), bare(2, "t")];

    let err = projections.handle_events(&events).unwrap_err();
    assert!(err.is_store_error());
    assert_eq!(projections.last_seen_id().unwrap(), 0);
    // Model a was written before b failed
    assert_eq!(store.inner.count("a_v1"), 1);
    assert_eq!(projections.metrics().failed_batches, 1);

    store.failing.store(false, Ordering::SeqCst);
    let changes = projections.handle_events(&events).unwrap();

    assert_eq!(changes["a_v1"].added, 1);
    assert_eq!(changes["b_v1"].added, 2);
    assert_eq!(store.inner.count("a_v1"), 2);
    assert_eq!(store.inner.count("b_v1"), 2);
    assert_eq!(projections.last_seen_id().unwrap(), 2);
}

/// Reads its own collection, then records how many documents it saw
fn counting_reader(name: &str) -> Model {
    Model::new(name, "1", |e, ctx| {
        let seen = ctx.read(Vec::new())?.len();
        Ok(vec![ChangeOp::insert_one(to_document(json!({"id": e.id, "seen": seen}))?)])
    })
}

#[test]
fn failed_primed_read_leaves_checkpoints_and_can_be_retried() {
    common::init_tracing();
    let store = Arc::new(FlakyStore::new("b_v1", false, true));
    let projections = ProjectionStore::open(
        StoreConfig::default(),
        Arc::clone(&store),
        vec![insert_event_id("a"), counting_reader("b")],
    )
    .unwrap();
    let events = [bare(1, "t"), bare(2, "t")];

    let err = projections.handle_events(&events).unwrap_err();
    assert!(err.is_store_error());
    match &err {
        Error::Read { collection, reason } => {
            assert_eq!(collection, "b_v1");
            assert!(reason.contains("connection reset"));
        }
        other => panic!("Expected Read error, got {:?}", other),
    }
    assert_eq!(projections.last_seen_id().unwrap(), 0);
    assert_eq!(store.inner.count("b_v1"), 0);

    store.failing_reads.store(false, Ordering::SeqCst);
    let changes = projections.handle_events(&events).unwrap();

    assert_eq!(changes["a_v1"].added, 1);
    assert_eq!(changes["b_v1"].added, 2);
    let seen: Vec<_> = store
        .inner
        .aggregate("b_v1", &[])
        .unwrap()
        .iter()
        .map(|d| d["seen"].clone())
        .collect();
    assert_eq!(seen, vec![json!(0), json!(1)]);
    assert_eq!(projections.last_seen_id().unwrap(), 2);
}

#[test]
fn unsupported_read_pipeline_is_a_read_error_even_when_empty() {
    let model = Model::new("m", "1", |_, ctx| {
        ctx.read(foldline_core::to_pipeline(json!([{"$group": {"_id": null}}]))?)?;
        Ok(Vec::new())
    });
    let (_, projections) = open(vec![model]);

    let err = projections.handle_events(&[bare(1, "t")]).unwrap_err();

    assert!(err.is_store_error());
    assert!(!err.is_contract_error());
    match err {
        Error::Read { collection, reason } => {
            assert_eq!(collection, "m_v1");
            assert!(reason.contains("$group"));
        }
        other => panic!("Expected Read error, got {:?}", other),
    }
    assert_eq!(projections.last_seen_id().unwrap(), 0);
}

#[test]
fn unknown_change_op_from_a_transform_is_a_contract_error() {
    let model = Model::from_json("raw", "1", |_, _| Ok(json!([{"upsertOne": {"id": 1}}])));
    let (_, projections) = open(vec![model]);

    let err = projections.handle_events(&[bare(1, "t")]).unwrap_err();
    assert!(matches!(err, Error::UnknownChangeOp(_)));
    assert_eq!(projections.last_seen_id().unwrap(), 0);
}

#[test]
fn reserved_fields_are_rejected() {
    let model = Model::new("reserved", "1", |_, _| {
        Ok(vec![ChangeOp::update_one(
            to_document(json!({"__op": 0}))?,
            to_document(json!({"$set": {"x": 1}}))?,
        )])
    });
    let (_, projections) = open(vec![model]);

    let err = projections.handle_events(&[bare(1, "t")]).unwrap_err();
    assert!(matches!(err, Error::ReservedField { context: "filter", .. }));
}

#[test]
fn transform_failure_names_model_and_event() {
    let model = Model::new("fragile", "3", |e, _| {
        if e.id == 2 {
            return Err(Interrupt::msg("payload missing"));
        }
        Ok(Vec::new())
    });
    let (_, projections) = open(vec![model]);

    let err = projections
        .handle_events(&[bare(1, "t"), bare(2, "t")])
        .unwrap_err();
    match err {
        Error::Transform { model, event_id, .. } => {
            assert_eq!(model, "fragile_v3");
            assert_eq!(event_id, 2);
        }
        other => panic!("Expected Transform error, got {:?}", other),
    }
}

#[test]
fn runaway_suspension_is_bounded() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let model = Model::new("runaway", "1", move |_, ctx| {
        let reads = counter.fetch_add(1, Ordering::SeqCst) + 1;
        for _ in 0..reads {
            ctx.read(Vec::new())?;
        }
        Ok(Vec::new())
    });
    let store = Arc::new(MemoryStore::new());
    let projections = ProjectionStore::open(
        StoreConfig::default().with_max_replay_passes(5),
        store,
        vec![model],
    )
    .unwrap();

    let err = projections.handle_events(&[bare(9, "t")]).unwrap_err();
    assert!(matches!(err, Error::ReplayLimit { passes: 5, event_id: 9 }));
    assert_eq!(calls.load(Ordering::SeqCst), 5);
}

/// Reads twice on event 2 and nowhere else
fn two_reads_on_second_event() -> Model {
    Model::new("late_reader", "1", |e, ctx| {
        if e.id == 2 {
            ctx.read(Vec::new())?;
            ctx.read(Vec::new())?;
        }
        Ok(Vec::new())
    })
}

#[test]
fn pass_limit_counts_the_pass_that_reached_an_event() {
    let events = [bare(1, "t"), bare(2, "t")];

    // Event 2 needs three passes: two suspensions and the completing one
    let tight = ProjectionStore::open(
        StoreConfig::default().with_max_replay_passes(2),
        Arc::new(MemoryStore::new()),
        vec![two_reads_on_second_event()],
    )
    .unwrap();
    let err = tight.handle_events(&events).unwrap_err();
    assert!(matches!(err, Error::ReplayLimit { passes: 2, event_id: 2 }));

    let enough = ProjectionStore::open(
        StoreConfig::default().with_max_replay_passes(3),
        Arc::new(MemoryStore::new()),
        vec![two_reads_on_second_event()],
    )
    .unwrap();
    enough.handle_events(&events).unwrap();
    assert_eq!(enough.metrics().passes, 3);
    assert_eq!(enough.last_seen_id().unwrap(), 2);
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn open_from_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    std::fs::write(
        &path,
        "name = \"journeys\"\ncheckpoint_collection = \"journey_checkpoints\"\n",
    )
    .unwrap();

    let config = StoreConfig::from_file(&path).unwrap();
    let store = Arc::new(MemoryStore::new());
    let projections =
        ProjectionStore::open(config, Arc::clone(&store), vec![insert_event_id("a")]).unwrap();
    projections.handle_events(&[bare(4, "t")]).unwrap();

    assert_eq!(projections.name(), "journeys");
    assert_eq!(store.count("journey_checkpoints"), 1);
    assert_eq!(store.count("__checkpoints"), 0);
}

#[test]
fn clean_allows_projecting_from_scratch() {
    let (store, projections) = open(vec![insert_event_id("a")]);
    projections.handle_events(&[bare(1, "t"), bare(2, "t")]).unwrap();

    projections.clean().unwrap();
    assert_eq!(projections.last_seen_id().unwrap(), 0);

    let changes = projections.handle_events(&[bare(1, "t"), bare(2, "t")]).unwrap();
    assert_eq!(changes["a_v1"].added, 2);
    assert_eq!(store.count("a_v1"), 2);
}
