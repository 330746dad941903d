//! Observability utilities for the tool runtime.

#![warn(missing_docs, clippy::pedantic)]

mod hooks;
mod logging;

pub use hooks::{DispatchHooks, HookChain, NoopHooks, TracingHooks};
pub use logging::{LOG_ENV, LogFormat, LoggingConfig, init_tracing};
