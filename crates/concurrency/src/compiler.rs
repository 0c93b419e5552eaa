//! Change compiler
//!
//! Turns one model's change operations for one event into guarded physical
//! writes. Each logical operation (each document, for `InsertMany`) takes the
//! next stamp `(event id, op)` and compiles as follows:
//!
//! | Change | Physical write |
//! |--------|----------------|
//! | insert | `UpdateOne { filter: newer_than(s), update: {$setOnInsert: doc + s}, upsert }` |
//! | update (changes) | same kind, `filter: where + older_than(s)`, `$set` extended with `s` |
//! | update (pipeline) | same kind, `filter: where + older_than(s)`, trailing `{$set: s}` stage |
//! | delete | same kind, `filter: where + older_than(s)` |
//!
//! Replaying an event recompiles to identical writes, and each write matches
//! nothing once it has been applied. That is what makes redelivery and
//! suspension replay safe.

use crate::guard::{newer_than, older_than, with_guard};
use crate::validation::{validate_document, validate_filter, validate_modification};
use foldline_core::{
    ChangeOp, DeleteSpec, Document, Error, Modification, Result, Stamp, StampSequence, UpdateSpec,
    WriteOp, OP_FIELD, VERSION_FIELD,
};
use serde_json::Value;
use tracing::trace;

/// Compile an ordered list of change operations produced for event `version`
///
/// Stamps start at op 0, so the same input always compiles to the same writes.
///
/// # Errors
///
/// Returns `ReservedField` if any operation names `__v` or `__op`, and
/// `InvalidDocument` if an update's `$set` is not an object. Nothing is
/// returned for a batch containing an invalid operation.
pub fn compile(ops: Vec<ChangeOp>, version: u64) -> Result<Vec<WriteOp>> {
    let mut sequence = StampSequence::new(version);
    let mut writes = Vec::with_capacity(ops.iter().map(ChangeOp::stamp_count).sum());
    for op in ops {
        writes.extend(compile_op(op, &mut sequence)?);
    }
    trace!(
        target: "foldline::compile",
        version,
        stamps = sequence.issued(),
        writes = writes.len(),
        "Compiled change operations"
    );
    Ok(writes)
}

/// Compile one change operation, drawing stamps from `sequence`
///
/// # Errors
///
/// Same as [`compile`].
pub fn compile_op(op: ChangeOp, sequence: &mut StampSequence) -> Result<Vec<WriteOp>> {
    match op {
        ChangeOp::InsertOne(doc) => Ok(vec![compile_insert(doc, sequence.next_stamp())?]),
        ChangeOp::InsertMany(docs) => docs
            .into_iter()
            .map(|doc| compile_insert(doc, sequence.next_stamp()))
            .collect(),
        ChangeOp::UpdateOne(spec) => {
            let (filter, update, array_filters) = compile_update(spec, sequence.next_stamp())?;
            Ok(vec![WriteOp::UpdateOne {
                filter,
                update,
                array_filters,
                upsert: false,
            }])
        }
        ChangeOp::UpdateMany(spec) => {
            let (filter, update, array_filters) = compile_update(spec, sequence.next_stamp())?;
            Ok(vec![WriteOp::UpdateMany {
                filter,
                update,
                array_filters,
                upsert: false,
            }])
        }
        ChangeOp::DeleteOne(spec) => Ok(vec![WriteOp::DeleteOne {
            filter: compile_delete(spec, sequence.next_stamp())?,
        }]),
        ChangeOp::DeleteMany(spec) => Ok(vec![WriteOp::DeleteMany {
            filter: compile_delete(spec, sequence.next_stamp())?,
        }]),
    }
}

fn stamp_fields(stamp: Stamp) -> [(String, Value); 2] {
    [
        (VERSION_FIELD.to_string(), Value::from(stamp.version)),
        (OP_FIELD.to_string(), Value::from(stamp.op)),
    ]
}

fn compile_insert(mut doc: Document, stamp: Stamp) -> Result<WriteOp> {
    validate_document(&doc)?;
    doc.extend(stamp_fields(stamp));

    let mut update = Document::new();
    update.insert("$setOnInsert".to_string(), Value::Object(doc));
    Ok(WriteOp::UpdateOne {
        filter: newer_than(stamp),
        update: Modification::Changes(update),
        array_filters: None,
        upsert: true,
    })
}

fn compile_update(
    spec: UpdateSpec,
    stamp: Stamp,
) -> Result<(Document, Modification, Option<Vec<Document>>)> {
    validate_filter(&spec.filter)?;
    validate_modification(&spec.modification)?;

    let update = match spec.modification {
        Modification::Changes(mut changes) => {
            let set = changes
                .entry("$set".to_string())
                .or_insert_with(|| Value::Object(Document::new()));
            match set {
                Value::Object(fields) => fields.extend(stamp_fields(stamp)),
                other => {
                    return Err(Error::InvalidDocument(format!(
                        "$set must be an object, got {}",
                        foldline_core::path::value_type_name(other)
                    )))
                }
            }
            Modification::Changes(changes)
        }
        Modification::Pipeline(mut stages) => {
            let mut set = Document::new();
            set.insert("$set".to_string(), Value::Object(stamp_fields(stamp).into_iter().collect()));
            stages.push(set);
            Modification::Pipeline(stages)
        }
    };

    Ok((with_guard(spec.filter, older_than(stamp)), update, spec.array_filters))
}

fn compile_delete(spec: DeleteSpec, stamp: Stamp) -> Result<Document> {
    validate_filter(&spec.filter)?;
    Ok(with_guard(spec.filter, older_than(stamp)))
}
