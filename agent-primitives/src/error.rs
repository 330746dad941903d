//! Shared error definitions for agent primitives.

use thiserror::Error;
use uuid::Error as UuidError;

use crate::status::{StatusEvent, ToolStatus};

/// Result alias used throughout the tool runtime.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while manipulating primitive types.
#[derive(Debug, Error)]
pub enum Error {
    /// The provided custom tool identifier could not be parsed.
    #[error("invalid tool id: {source}")]
    InvalidToolId {
        /// Source parsing error from the UUID library.
        #[from]
        source: UuidError,
    },

    /// Tool name failed validation.
    #[error("invalid tool name `{name}`: {reason}")]
    InvalidToolName {
        /// The offending name.
        name: String,
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// Permission tag is not part of the whitelist.
    #[error("unknown permission `{tag}`")]
    UnknownPermission {
        /// The rejected permission tag.
        tag: String,
    },

    /// Parameter schema is not a valid object schema.
    #[error("invalid parameter schema: {}", problems.join("; "))]
    InvalidSchema {
        /// Every problem detected in the schema.
        problems: Vec<String>,
    },

    /// Status string could not be decoded.
    #[error("unknown tool status `{0}`")]
    UnknownStatus(String),

    /// Status transition is not permitted by the approval state machine.
    #[error("invalid status transition from {from} via {event:?}")]
    InvalidStatusTransition {
        /// Status prior to the attempted transition.
        from: ToolStatus,
        /// Event that triggered the failure.
        event: StatusEvent,
    },
}
