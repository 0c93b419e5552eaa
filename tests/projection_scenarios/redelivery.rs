//! Redelivery of the bank log
//!
//! The log source may resend events it already delivered, restart from an
//! older position, or cut batches differently. None of that may change the
//! projected state.

use crate::accounts::{all_models, assert_bank_state, bank_log};
use crate::common::*;

#[test]
fn full_redelivery_changes_nothing() -> anyhow::Result<()> {
    let (_, projections) = open_store("bank", all_models())?;
    projections.handle_events(&bank_log())?;

    let changes = projections.handle_events(&bank_log())?;

    assert!(changes.values().all(|c| c.is_empty()), "{:?}", changes);
    assert_bank_state(&projections)?;
    Ok(())
}

#[test]
fn restart_from_an_older_position_converges() -> anyhow::Result<()> {
    let log = bank_log();
    let (_, projections) = open_store("bank", all_models())?;

    projections.handle_events(&log[..5])?;
    assert_eq!(projections.last_seen_id()?, 5);

    // The source lost its position and resumes from event 3
    projections.handle_events(&log[2..])?;

    assert_bank_state(&projections)?;
    assert_eq!(projections.last_seen_id()?, 8);
    Ok(())
}

#[test]
fn batch_boundaries_do_not_matter() -> anyhow::Result<()> {
    for size in 1..=bank_log().len() {
        let (_, projections) = open_store("bank", all_models())?;
        for chunk in bank_log().chunks(size) {
            projections.handle_events(chunk)?;
        }
        assert_bank_state(&projections)?;
    }
    Ok(())
}

#[test]
fn duplicated_events_within_a_batch_are_applied_once() -> anyhow::Result<()> {
    let log = bank_log();
    let mut stuttering = Vec::new();
    for event in &log {
        stuttering.push(event.clone());
        if event.id % 2 == 0 {
            stuttering.push(event.clone());
        }
    }

    let (_, projections) = open_store("bank", all_models())?;
    let changes = projections.handle_events(&stuttering)?;

    assert_bank_state(&projections)?;
    assert_eq!(changes["accounts_v1"].added, 2);
    assert_eq!(changes["accounts_v1"].updated, 6);
    Ok(())
}

#[test]
fn clean_then_reproject_rebuilds_the_same_state() -> anyhow::Result<()> {
    let (_, projections) = open_store("bank", all_models())?;
    projections.handle_events(&bank_log())?;

    projections.clean()?;
    assert_eq!(projections.last_seen_id()?, 0);

    projections.handle_events(&bank_log())?;
    assert_bank_state(&projections)?;
    Ok(())
}
