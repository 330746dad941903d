//! Persistence for custom tools and their execution audit trail.
//!
//! The repository and audit traits are the seams a durable backend plugs
//! into; the in-memory implementations back tests and single-process hosts.

#![warn(missing_docs, clippy::pedantic)]

mod audit;
mod error;
mod record;
mod repository;

pub use audit::{
    AuditConfig, AuditOutcome, AuditStats, AuditStore, ExecutionAuditRecord, InMemoryAuditLog,
    REDACTED, redact_arguments,
};
pub use error::{StoreError, StoreResult};
pub use record::{CustomTool, ExecutableTool, ToolAuthor};
pub use repository::{CustomToolRepository, InMemoryToolRepository, ToolFilter};
