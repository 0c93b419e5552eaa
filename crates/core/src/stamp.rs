//! Ordering stamps
//!
//! Every write attributed to a model carries a stamp `(version, op)`:
//! `version` is the id of the event that produced it and `op` is the write's
//! position among that event's operations for that model. Stamps compare
//! lexicographically, which gives each model a total order over its writes
//! that is recomputed identically whenever the same events are replayed.
//!
//! ## Invariants
//!
//! - For a fixed model, stamps never repeat for distinct operations
//! - A stored document's stamp only moves forward

use serde::{Deserialize, Serialize};
use std::fmt;

/// `(version, op)` ordering stamp
///
/// Field order matters: the derived `Ord` compares `version` first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Stamp {
    /// Id of the event that produced the write
    pub version: u64,
    /// Position of the write within that event
    pub op: u64,
}

impl Stamp {
    /// Create a stamp
    pub const fn new(version: u64, op: u64) -> Self {
        Stamp { version, op }
    }
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.version, self.op)
    }
}

/// Allocates consecutive stamps for one model within one event
///
/// A fresh sequence starts at op 0 for every (model, event) pair, so replaying
/// an event reproduces exactly the same stamps.
#[derive(Debug, Clone)]
pub struct StampSequence {
    version: u64,
    next_op: u64,
}

impl StampSequence {
    /// Start a sequence for the event with the given id
    pub fn new(version: u64) -> Self {
        StampSequence {
            version,
            next_op: 0,
        }
    }

    /// Take the next stamp
    pub fn next_stamp(&mut self) -> Stamp {
        let stamp = Stamp::new(self.version, self.next_op);
        self.next_op += 1;
        stamp
    }

    /// Event id this sequence stamps
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of stamps handed out so far
    pub fn issued(&self) -> u64 {
        self.next_op
    }
}
