//! Runtime registry for tool definitions and executors.
//!
//! Tools are keyed by their full qualified name. A secondary index maps each
//! base name to every registration sharing it, so legacy callers can keep
//! using bare names. When several namespaces provide the same base name the
//! earliest namespace in [`ToolNamespace::ALL`] wins, then registration order.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, warn};

use agent_primitives::{QualifiedName, ToolNamespace};
use agent_telemetry::{DispatchHooks, NoopHooks};

use crate::definition::{ToolDefinition, ToolMetadata, ToolSource};
use crate::error::{ToolError, ToolResult};
use crate::suggest::{MAX_SUGGESTIONS, suggest};
use crate::tool::{Tool, ToolContext, ToolOutput};

/// Handle returned by the registry for direct invocation.
#[derive(Clone)]
pub struct ToolHandle {
    definition: Arc<ToolDefinition>,
    metadata: ToolMetadata,
    executor: Arc<dyn Tool>,
}

impl ToolHandle {
    /// Returns the model-facing definition.
    #[must_use]
    pub fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    /// Returns the provenance metadata.
    #[must_use]
    pub fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    /// Returns the implementation source, if the executor exposes it.
    #[must_use]
    pub fn source_text(&self) -> Option<String> {
        self.executor.source()
    }
}

impl std::fmt::Debug for ToolHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolHandle")
            .field("name", &self.definition.name().to_string())
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

struct Entry {
    handle: ToolHandle,
    seq: u64,
}

#[derive(Default)]
struct RegistryInner {
    tools: HashMap<String, Entry>,
    by_base: HashMap<String, Vec<String>>,
    next_seq: u64,
}

impl RegistryInner {
    fn resolve(&self, name: &str) -> Option<&Entry> {
        if let Some(entry) = self.tools.get(name) {
            return Some(entry);
        }
        if name.contains('.') {
            return None;
        }
        self.by_base
            .get(name)?
            .first()
            .and_then(|key| self.tools.get(key))
    }

    fn resolve_key(&self, name: &str) -> Option<String> {
        self.resolve(name)
            .map(|entry| entry.handle.definition.name().to_string())
    }

    fn reindex(&mut self, base: &str) {
        let Some(keys) = self.by_base.get(base) else {
            return;
        };
        let mut keyed: Vec<(usize, u64, String)> = keys
            .iter()
            .filter_map(|key| {
                let entry = self.tools.get(key)?;
                Some((precedence(entry.handle.definition.name()), entry.seq, key.clone()))
            })
            .collect();
        keyed.sort();
        let sorted: Vec<String> = keyed.into_iter().map(|(_, _, key)| key).collect();
        if sorted.is_empty() {
            self.by_base.remove(base);
        } else {
            self.by_base.insert(base.to_owned(), sorted);
        }
    }

    fn ordered(&self) -> Vec<&Entry> {
        let mut entries: Vec<&Entry> = self.tools.values().collect();
        entries.sort_by_key(|entry| entry.seq);
        entries
    }
}

fn precedence(name: &QualifiedName) -> usize {
    name.namespace()
        .and_then(|ns| ToolNamespace::ALL.iter().position(|candidate| *candidate == ns))
        .unwrap_or(ToolNamespace::ALL.len())
}

/// Registry that stores tool implementations keyed by qualified name.
///
/// A registry is built per request or conversation; share the process-wide
/// state (custom tool store, sandbox cache) instead of the registry itself.
pub struct ToolRegistry {
    inner: RwLock<RegistryInner>,
    hooks: Arc<dyn DispatchHooks>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read().expect("tool registry poisoned");
        let names: Vec<_> = inner.tools.keys().cloned().collect();
        f.debug_struct("ToolRegistry")
            .field("registered", &names)
            .finish_non_exhaustive()
    }
}

impl ToolRegistry {
    /// Creates an empty registry without dispatch hooks.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            hooks: Arc::new(NoopHooks),
        }
    }

    /// Installs start/end hooks invoked around every dispatch.
    #[must_use]
    pub fn with_hooks(mut self, hooks: Arc<dyn DispatchHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Registers a tool implementation.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::DuplicateTool`] if the qualified name is already present.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    pub fn register<T>(
        &self,
        definition: ToolDefinition,
        executor: T,
        metadata: ToolMetadata,
    ) -> ToolResult<()>
    where
        T: Tool + 'static,
    {
        self.register_arc(definition, Arc::new(executor), metadata)
    }

    /// Registers a shared executor.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::DuplicateTool`] if the qualified name is already present.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    pub fn register_arc(
        &self,
        definition: ToolDefinition,
        executor: Arc<dyn Tool>,
        metadata: ToolMetadata,
    ) -> ToolResult<()> {
        let key = definition.name().to_string();
        let base = definition.name().base().to_owned();

        let mut inner = self.inner.write().expect("tool registry poisoned");
        if inner.tools.contains_key(&key) {
            return Err(ToolError::DuplicateTool { name: key });
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.tools.insert(
            key.clone(),
            Entry {
                handle: ToolHandle {
                    definition: Arc::new(definition),
                    metadata,
                    executor,
                },
                seq,
            },
        );
        inner.by_base.entry(base.clone()).or_default().push(key.clone());
        inner.reindex(&base);
        debug!(tool = %key, "registered tool");
        Ok(())
    }

    /// Removes a tool. Returns `false` when nothing matched.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    pub fn unregister(&self, name: &str) -> bool {
        let mut inner = self.inner.write().expect("tool registry poisoned");
        let Some(key) = inner.resolve_key(name) else {
            return false;
        };
        let Some(entry) = inner.tools.remove(&key) else {
            return false;
        };
        let base = entry.handle.definition.name().base().to_owned();
        if let Some(keys) = inner.by_base.get_mut(&base) {
            keys.retain(|candidate| candidate != &key);
        }
        inner.reindex(&base);
        debug!(tool = %key, "unregistered tool");
        true
    }

    /// Returns `true` when `name` resolves to a registration.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        let inner = self.inner.read().expect("tool registry poisoned");
        inner.resolve(name).is_some()
    }

    /// Returns a handle to the tool `name` resolves to.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<ToolHandle> {
        let inner = self.inner.read().expect("tool registry poisoned");
        inner.resolve(name).map(|entry| entry.handle.clone())
    }

    /// Returns the definition `name` resolves to.
    #[must_use]
    pub fn get_definition(&self, name: &str) -> Option<ToolDefinition> {
        self.get(name).map(|handle| handle.definition().clone())
    }

    /// Lists every definition in registration order.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    #[must_use]
    pub fn get_definitions(&self) -> Vec<ToolDefinition> {
        let inner = self.inner.read().expect("tool registry poisoned");
        inner
            .ordered()
            .into_iter()
            .map(|entry| entry.handle.definition().clone())
            .collect()
    }

    /// Lists the definitions registered from `source`, in registration order.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    #[must_use]
    pub fn get_tools_by_source(&self, source: ToolSource) -> Vec<ToolDefinition> {
        let inner = self.inner.read().expect("tool registry poisoned");
        inner
            .ordered()
            .into_iter()
            .filter(|entry| entry.handle.metadata.source() == source)
            .map(|entry| entry.handle.definition().clone())
            .collect()
    }

    /// Replaces the executor of an existing tool, keeping its definition.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::NotFound`] if `name` does not resolve.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    pub fn update_executor<T>(&self, name: &str, executor: T) -> ToolResult<()>
    where
        T: Tool + 'static,
    {
        {
            let mut inner = self.inner.write().expect("tool registry poisoned");
            if let Some(key) = inner.resolve_key(name)
                && let Some(entry) = inner.tools.get_mut(&key)
            {
                entry.handle.executor = Arc::new(executor);
                debug!(tool = %key, "replaced tool executor");
                return Ok(());
            }
        }
        Err(ToolError::NotFound {
            name: name.to_owned(),
            suggestions: self.suggest(name, MAX_SUGGESTIONS),
        })
    }

    /// Number of registered tools.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().expect("tool registry poisoned").tools.len()
    }

    /// Returns `true` when no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Closest registered names to `name`, best first.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    #[must_use]
    pub fn suggest(&self, name: &str, limit: usize) -> Vec<String> {
        let names: Vec<String> = {
            let inner = self.inner.read().expect("tool registry poisoned");
            inner
                .ordered()
                .into_iter()
                .map(|entry| entry.handle.definition.name().to_string())
                .collect()
        };
        suggest(name, names.iter().map(String::as_str), limit)
    }

    /// Resolves `name` and runs its executor.
    ///
    /// Executor panics are caught and reported as [`ToolError::Execution`];
    /// nothing raised by an executor escapes as a panic. Dispatch hooks see
    /// the resolved qualified name.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::NotFound`] with suggestions when `name` does not
    /// resolve, or whatever error the executor returned.
    pub async fn execute(
        &self,
        name: &str,
        args: Value,
        ctx: &ToolContext,
    ) -> ToolResult<ToolOutput> {
        let Some(handle) = self.get(name) else {
            return Err(ToolError::NotFound {
                name: name.to_owned(),
                suggestions: self.suggest(name, MAX_SUGGESTIONS),
            });
        };

        let qualified = handle.definition.name().to_string();
        self.hooks.on_start(&qualified, &args);
        let started = Instant::now();

        let outcome = AssertUnwindSafe(handle.executor.invoke(args.clone(), ctx))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                let reason = panic_message(panic.as_ref());
                warn!(tool = %qualified, %reason, "tool executor panicked");
                Err(ToolError::execution(reason))
            });

        let success = matches!(&outcome, Ok(output) if !output.is_error);
        self.hooks
            .on_end(&qualified, &args, success, started.elapsed());
        outcome
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("executor panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("executor panicked: {message}")
    } else {
        "executor panicked".to_owned()
    }
}
