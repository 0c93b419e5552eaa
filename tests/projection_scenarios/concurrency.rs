//! Several deliverers sharing one projection store
//!
//! Each `handle_events` call keeps its own read cache; the write guards alone
//! keep overlapping deliveries from applying anything twice.

use crate::accounts::{all_models, assert_bank_state, bank_log};
use crate::common::*;
use std::thread;

#[test]
fn overlapping_deliveries_converge() -> anyhow::Result<()> {
    let (_, projections) = open_store("bank", all_models())?;
    let log = bank_log();

    thread::scope(|scope| {
        let handles: Vec<_> = (1..=4)
            .map(|size| {
                let projections = &projections;
                let log = &log;
                scope.spawn(move || -> foldline::Result<()> {
                    for chunk in log.chunks(size) {
                        projections.handle_events(chunk)?;
                    }
                    Ok(())
                })
            })
            .collect();
        handles
            .into_iter()
            .try_for_each(|h| h.join().map_err(|_| anyhow::anyhow!("deliverer panicked"))?.map_err(anyhow::Error::from))
    })?;

    assert_bank_state(&projections)?;
    assert_eq!(projections.last_seen_id()?, 8);

    let metrics = projections.metrics();
    assert_eq!(metrics.failed_batches, 0);
    Ok(())
}

#[test]
fn late_deliverer_is_a_no_op() -> anyhow::Result<()> {
    let (_, projections) = open_store("bank", all_models())?;
    let log = bank_log();

    projections.handle_events(&log)?;

    let changes = thread::scope(|scope| scope.spawn(|| projections.handle_events(&log[3..])).join())
        .map_err(|_| anyhow::anyhow!("deliverer panicked"))??;

    assert!(changes.values().all(|c| c.is_empty()));
    assert_bank_state(&projections)?;
    Ok(())
}
