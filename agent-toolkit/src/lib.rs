//! Tool runtime for LLM agents.
//!
//! Bundles the workspace crates behind feature flags: a namespaced tool
//! registry, user- and model-authored custom tools executed in a sandbox
//! behind approval gating, and the meta-tools the model uses to discover and
//! call everything else.

#![warn(missing_docs, clippy::pedantic)]

/// Shared names, permissions, schemas and status machine.
pub use agent_primitives as primitives;

/// Custom tool lifecycle, execution bridge and meta-tools (enabled by `kernel` feature).
#[cfg(feature = "kernel")]
pub use agent_kernel as kernel;

/// Tool definitions, registry and sandbox boundary (enabled by `tools` feature).
#[cfg(feature = "tools")]
pub use agent_tools as tools;

/// Custom tool persistence and audit log (enabled by `store` feature).
#[cfg(feature = "store")]
pub use agent_store as store;

/// Code pattern table, risk analysis and approval policy (enabled by `policy` feature).
#[cfg(feature = "policy")]
pub use agent_policy as policy;

/// Dispatch hooks and tracing setup (enabled by `telemetry` feature).
#[cfg(feature = "telemetry")]
pub use agent_telemetry as telemetry;

/// Configuration loading (enabled by `config` feature).
#[cfg(feature = "config")]
pub use agent_config as config;
