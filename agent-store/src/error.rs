//! Error types for the tool store.

use serde_json::Error as SerdeError;
use thiserror::Error;

use agent_primitives::CustomToolId;

/// Errors emitted by store components.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A record with the same unique name already exists.
    #[error("custom tool `{name}` already exists")]
    Conflict {
        /// Name that collided.
        name: String,
    },
    /// The addressed record does not exist.
    #[error("custom tool {id} not found")]
    NotFound {
        /// Identifier that failed to resolve.
        id: CustomToolId,
    },
    /// Serialization or deserialization error.
    #[error("serialization error: {source}")]
    Serialization {
        /// Source [`serde_json::Error`].
        #[from]
        source: SerdeError,
    },
    /// Storage backend reported an application error.
    #[error("storage backend error: {reason}")]
    Backend {
        /// Human-readable reason describing the failure.
        reason: String,
    },
}

impl StoreError {
    /// Helper to construct backend errors from string-like values.
    #[must_use]
    pub fn backend(reason: impl Into<String>) -> Self {
        Self::Backend {
            reason: reason.into(),
        }
    }
}

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
