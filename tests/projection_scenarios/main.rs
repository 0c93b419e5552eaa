//! Projection Scenario Tests
//!
//! End-to-end scenarios through the `foldline` facade, organized by concern:
//! - Accounts: a multi-model projection with own and cross-model reads
//! - Redelivery: the same log delivered again, restarted, or re-batched
//! - Concurrency: several deliverers sharing one projection store

#[path = "../common/mod.rs"]
mod common;

mod accounts;
mod concurrency;
mod redelivery;
