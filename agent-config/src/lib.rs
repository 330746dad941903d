//! Configuration management for the tool runtime.
//!
//! Values come from built-in defaults, an optional TOML file, then
//! `AGENT_TOOLKIT_*` environment variables, in that order.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::ENV_PREFIX;
pub use schema::{
    Limits, NumericCap, PathGuardConfig, ToolkitConfig, default_numeric_caps,
};
