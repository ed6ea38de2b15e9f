//! Common error types used throughout aether.
//!
//! Queue-level failures (unknown ids, a drain that is already running,
//! storage faults) are funnelled into [`Error`]. Engine-side failures keep
//! their own type in the root crate and are folded in via [`Error::Engine`].

use std::fmt;

/// Common error type for aether.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "item").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// Input failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A conflicting resource already exists.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A drain was requested while another one holds the processing flag.
    #[error("Queue is already processing")]
    AlreadyRunning,

    /// The durable key-value store failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// The conversion engine rejected or failed a request.
    #[error("Engine error: {0}")]
    Engine(String),

    /// The operation was cancelled before it finished.
    #[error("Cancelled")]
    Cancelled,

    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// (De)serialization of persisted state failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new NotFound error.
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Create a new Validation error.
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new Storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a new Engine error.
    pub fn engine<S: Into<String>>(msg: S) -> Self {
        Self::Engine(msg.into())
    }

    /// Create a new Internal error.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;
