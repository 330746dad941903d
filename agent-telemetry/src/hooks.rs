//! Side-channel hooks invoked around every tool dispatch.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

/// Observer notified before and after a tool dispatch.
///
/// Hooks are side-channel only: they cannot alter arguments or results and
/// must not block for long.
pub trait DispatchHooks: Send + Sync {
    /// Called once the target tool is resolved, before it runs.
    fn on_start(&self, tool: &str, args: &Value);

    /// Called after the tool finished, successfully or not.
    fn on_end(&self, tool: &str, args: &Value, success: bool, elapsed: Duration);
}

/// Hooks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl DispatchHooks for NoopHooks {
    fn on_start(&self, _tool: &str, _args: &Value) {}

    fn on_end(&self, _tool: &str, _args: &Value, _success: bool, _elapsed: Duration) {}
}

/// Hooks emitting structured `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingHooks;

impl DispatchHooks for TracingHooks {
    fn on_start(&self, tool: &str, args: &Value) {
        let arg_keys = args.as_object().map_or(0, serde_json::Map::len);
        debug!(tool, arg_keys, "tool dispatch started");
    }

    fn on_end(&self, tool: &str, _args: &Value, success: bool, elapsed: Duration) {
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        if success {
            info!(tool, elapsed_ms, "tool dispatch completed");
        } else {
            warn!(tool, elapsed_ms, "tool dispatch failed");
        }
    }
}

/// Fans every notification out to several hook sets in order.
#[derive(Default, Clone)]
pub struct HookChain {
    hooks: Vec<Arc<dyn DispatchHooks>>,
}

impl HookChain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a hook set.
    #[must_use]
    pub fn with(mut self, hooks: Arc<dyn DispatchHooks>) -> Self {
        self.hooks.push(hooks);
        self
    }

    /// Number of hook sets in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Returns `true` when no hook sets are chained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl std::fmt::Debug for HookChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookChain").field("len", &self.hooks.len()).finish()
    }
}

impl DispatchHooks for HookChain {
    fn on_start(&self, tool: &str, args: &Value) {
        for hooks in &self.hooks {
            hooks.on_start(tool, args);
        }
    }

    fn on_end(&self, tool: &str, args: &Value, success: bool, elapsed: Duration) {
        for hooks in &self.hooks {
            hooks.on_end(tool, args, success, elapsed);
        }
    }
}
