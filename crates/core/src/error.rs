//! Error types for foldline
//!
//! This module defines all error types used throughout the workspace.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Errors fall into three layers:
//! - Contract errors: a transform produced something the compiler refuses
//!   (unknown change operation, reserved field, malformed document)
//! - Store errors: the document store failed a read or write
//! - Coordinator errors: a transform failed or replay could not converge

use std::io;
use thiserror::Error;

/// Result type alias for foldline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for foldline
#[derive(Debug, Error)]
pub enum Error {
    /// A change operation whose shape matches no known variant
    #[error("Unknown change operation: {0}")]
    UnknownChangeOp(String),

    /// Application data names one of the reserved concurrency fields
    #[error("Reserved field '{field}' used in {context}")]
    ReservedField {
        /// The offending field name
        field: String,
        /// Where the field appeared (document, filter, update, pipeline)
        context: &'static str,
    },

    /// A value that must be a document is not one
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// Unsupported or malformed filter, update or pipeline stage
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// A bulk write failed part way through
    #[error("Write failed on collection '{collection}' at operation {index}: {reason}")]
    Write {
        /// Target collection
        collection: String,
        /// Position of the failing operation in the ordered batch
        index: usize,
        /// Underlying failure
        reason: String,
    },

    /// A read (aggregation) failed
    ///
    /// Reads a transform asks for are reported this way whatever went wrong,
    /// including pipelines the store refuses, so a failed batch always names
    /// the store as the failing layer.
    #[error("Read failed on collection '{collection}': {reason}")]
    Read {
        /// Target collection
        collection: String,
        /// Underlying failure
        reason: String,
    },

    /// Store-level failure not tied to a single operation
    #[error("Storage error: {0}")]
    Storage(String),

    /// A transform failed with something other than a suspension
    #[error("Transform for model '{model}' failed on event {event_id}: {source}")]
    Transform {
        /// Collection name of the failing model
        model: String,
        /// Event being transformed
        event_id: u64,
        /// The transform's own error
        #[source]
        source: anyhow::Error,
    },

    /// Suspension replay did not converge within the configured pass budget
    #[error("Replay did not converge after {passes} passes (stuck at event {event_id})")]
    ReplayLimit {
        /// Passes attempted
        passes: usize,
        /// Event at which the last pass was interrupted
        event_id: u64,
    },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error (config files)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create an invalid query error
    pub fn invalid_query(msg: impl Into<String>) -> Self {
        Error::InvalidQuery(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Error::Storage(msg.into())
    }

    /// True for errors caused by a transform breaking the change-op contract
    ///
    /// These are programming errors; retrying the batch cannot fix them.
    pub fn is_contract_error(&self) -> bool {
        matches!(
            self,
            Error::UnknownChangeOp(_) | Error::ReservedField { .. } | Error::InvalidDocument(_)
        )
    }

    /// True for failures of the document store
    ///
    /// Retrying the whole batch after one of these is safe.
    pub fn is_store_error(&self) -> bool {
        matches!(
            self,
            Error::Write { .. } | Error::Read { .. } | Error::Storage(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
