//! Tool registration, dispatch and sandbox binding.
//!
//! The registry maps qualified names to executors; the sandbox module binds
//! stored custom-tool programs to an external isolation runtime.

#![warn(missing_docs, clippy::pedantic)]

pub mod definition;
pub mod error;
pub mod guard;
pub mod registry;
pub mod sandbox;
pub mod suggest;
pub mod tool;

pub use definition::{ToolDefinition, ToolMetadata, ToolSource, TrustLevel};
pub use error::{ToolError, ToolResult};
pub use guard::{InstallDirGuard, PathDenied, PathGuard};
pub use registry::{ToolHandle, ToolRegistry};
pub use sandbox::{
    FnRuntime, SandboxCache, SandboxError, SandboxProgram, SandboxRequest, SandboxRuntime,
    SyncOutcome,
};
pub use tool::{Tool, ToolContext, ToolOutput};
