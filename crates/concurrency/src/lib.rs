//! Optimistic change compilation for foldline
//!
//! This crate turns the logical change operations a transform returns into
//! physical writes guarded by `(version, op)` stamps:
//! - guard: the `newer_than` / `older_than` filter fragments
//! - validation: refusal of application data that names `__v` or `__op`
//! - compiler: stamping and rewriting of each operation
//!
//! A compiled write applied twice has the effect of applying it once, and a
//! write stamped earlier never overrides one stamped later.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod compiler;
pub mod guard;
pub mod validation;

pub use compiler::{compile, compile_op};
pub use guard::{newer_than, older_than, with_guard};
