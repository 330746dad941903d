//! Core shared types for the agent tool runtime.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod ids;
mod name;
mod permission;
mod schema;
mod status;

/// Error type and result alias shared across the workspace.
pub use error::{Error, Result};
/// Identifier of persisted custom tools.
pub use ids::CustomToolId;
/// Qualified tool names and custom name validation.
pub use name::{MAX_CUSTOM_NAME_LEN, QualifiedName, ToolNamespace, validate_custom_name};
/// Whitelisted sandbox permissions.
pub use permission::{MAX_PERMISSIONS, Permission, PermissionSet};
/// Object-shaped argument schema.
pub use schema::ParameterSchema;
/// Approval state machine.
pub use status::{StatusEvent, ToolStatus};
