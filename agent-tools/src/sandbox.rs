//! Sandbox boundary for user- and model-authored code.
//!
//! Static pattern checks elsewhere in the workspace are defense in depth and
//! can be bypassed. Containment is the job of the [`SandboxRuntime`]
//! implementation (separate process or isolate with capability-scoped I/O).
//! This module only binds stored programs to that runtime.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use agent_primitives::{CustomToolId, Permission, PermissionSet};

use crate::tool::ToolContext;

/// Failures reported by a sandbox runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SandboxError {
    /// The program raised an error.
    #[error("{message}")]
    Runtime {
        /// Message produced by the program or the runtime.
        message: String,
    },
    /// The program exceeded its time budget.
    #[error("execution timed out after {}ms", after.as_millis())]
    Timeout {
        /// Budget that was exceeded.
        after: Duration,
    },
    /// The program used a capability it was not granted.
    #[error("permission `{permission}` was not granted to this tool")]
    PermissionDenied {
        /// Missing permission.
        permission: Permission,
    },
    /// No program is cached under the requested name.
    #[error("no sandbox program is registered for `{name}`")]
    NotLoaded {
        /// Requested name.
        name: String,
    },
}

impl SandboxError {
    /// Shorthand for [`SandboxError::Runtime`].
    #[must_use]
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime {
            message: message.into(),
        }
    }
}

/// One execution request handed to the runtime.
#[derive(Debug, Clone, Copy)]
pub struct SandboxRequest<'a> {
    /// Tool name, for diagnostics.
    pub tool: &'a str,
    /// Program source.
    pub code: &'a str,
    /// Call arguments.
    pub args: &'a Value,
    /// Capabilities the program may use.
    pub permissions: &'a PermissionSet,
    /// Caller context, including the path guard.
    pub context: &'a ToolContext,
}

/// Isolation primitive executing a program body.
#[async_trait]
pub trait SandboxRuntime: Send + Sync {
    /// Runs `request.code` with `request.args` bound as the program input.
    async fn run(&self, request: SandboxRequest<'_>) -> Result<Value, SandboxError>;
}

/// Adapts a synchronous closure into a [`SandboxRuntime`].
pub struct FnRuntime<F> {
    func: F,
}

impl<F> FnRuntime<F>
where
    F: Fn(SandboxRequest<'_>) -> Result<Value, SandboxError> + Send + Sync,
{
    /// Wraps `func`.
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> std::fmt::Debug for FnRuntime<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnRuntime").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F> SandboxRuntime for FnRuntime<F>
where
    F: Fn(SandboxRequest<'_>) -> Result<Value, SandboxError> + Send + Sync,
{
    async fn run(&self, request: SandboxRequest<'_>) -> Result<Value, SandboxError> {
        (self.func)(request)
    }
}

/// A stored program as last synchronized from persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxProgram {
    /// Identifier of the persisted record.
    pub tool_id: CustomToolId,
    /// Program source.
    pub code: Arc<str>,
    /// Granted capabilities.
    pub permissions: PermissionSet,
    /// Record version the program was taken from.
    pub version: u32,
}

/// Outcome of [`SandboxCache::sync`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No program was cached under the name.
    Inserted,
    /// The cached program differed and was replaced.
    Refreshed,
    /// The cached program already matched.
    Unchanged,
}

/// Process-wide map from custom tool name to executable program.
///
/// Writers persist first and then call [`SandboxCache::sync`] or
/// [`SandboxCache::remove`], so readers never observe a program that was not
/// committed.
pub struct SandboxCache {
    runtime: Arc<dyn SandboxRuntime>,
    programs: RwLock<HashMap<String, Arc<SandboxProgram>>>,
}

impl std::fmt::Debug for SandboxCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let programs = self.programs.read().expect("sandbox cache poisoned");
        let names: Vec<_> = programs.keys().cloned().collect();
        f.debug_struct("SandboxCache")
            .field("programs", &names)
            .finish_non_exhaustive()
    }
}

impl SandboxCache {
    /// Creates an empty cache bound to `runtime`.
    #[must_use]
    pub fn new(runtime: Arc<dyn SandboxRuntime>) -> Self {
        Self {
            runtime,
            programs: RwLock::new(HashMap::new()),
        }
    }

    /// Runtime programs execute on.
    #[must_use]
    pub fn runtime(&self) -> &Arc<dyn SandboxRuntime> {
        &self.runtime
    }

    /// Installs or refreshes the program cached under `name`.
    ///
    /// # Panics
    ///
    /// Panics if the internal cache lock is poisoned.
    pub fn sync(&self, name: &str, program: SandboxProgram) -> SyncOutcome {
        let mut programs = self.programs.write().expect("sandbox cache poisoned");
        let outcome = match programs.get(name) {
            None => SyncOutcome::Inserted,
            Some(current) if **current == program => return SyncOutcome::Unchanged,
            Some(_) => SyncOutcome::Refreshed,
        };
        programs.insert(name.to_owned(), Arc::new(program));
        debug!(tool = name, ?outcome, "synchronized sandbox program");
        outcome
    }

    /// Drops the program cached under `name`. Returns `false` if none was cached.
    ///
    /// # Panics
    ///
    /// Panics if the internal cache lock is poisoned.
    pub fn remove(&self, name: &str) -> bool {
        let removed = self
            .programs
            .write()
            .expect("sandbox cache poisoned")
            .remove(name)
            .is_some();
        if removed {
            debug!(tool = name, "evicted sandbox program");
        }
        removed
    }

    /// Returns the program cached under `name`.
    ///
    /// # Panics
    ///
    /// Panics if the internal cache lock is poisoned.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<SandboxProgram>> {
        self.programs
            .read()
            .expect("sandbox cache poisoned")
            .get(name)
            .cloned()
    }

    /// Returns `true` when a program is cached under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Number of cached programs.
    ///
    /// # Panics
    ///
    /// Panics if the internal cache lock is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.programs.read().expect("sandbox cache poisoned").len()
    }

    /// Returns `true` when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` when `program` is exactly what is cached under `name`.
    #[must_use]
    pub fn is_current(&self, name: &str, program: &SandboxProgram) -> bool {
        self.get(name).is_some_and(|cached| *cached == *program)
    }

    /// Runs the program cached under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::NotLoaded`] if nothing is cached, otherwise
    /// whatever the runtime reports.
    pub async fn run(
        &self,
        name: &str,
        args: &Value,
        context: &ToolContext,
    ) -> Result<Value, SandboxError> {
        let program = self.get(name).ok_or_else(|| SandboxError::NotLoaded {
            name: name.to_owned(),
        })?;
        self.run_program(name, &program, args, context).await
    }

    /// Runs `program` on the shared runtime without touching the cache.
    ///
    /// # Errors
    ///
    /// Returns whatever the runtime reports.
    pub async fn run_program(
        &self,
        name: &str,
        program: &SandboxProgram,
        args: &Value,
        context: &ToolContext,
    ) -> Result<Value, SandboxError> {
        self.runtime
            .run(SandboxRequest {
                tool: name,
                code: &program.code,
                args,
                permissions: &program.permissions,
                context,
            })
            .await
    }
}
