//! Per-conversation assembly of the tool registry.

use std::num::NonZeroUsize;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use agent_config::ToolkitConfig;
use agent_store::{
    AuditConfig, AuditStore, CustomToolRepository, InMemoryAuditLog, InMemoryToolRepository,
};
use agent_telemetry::{DispatchHooks, HookChain, TracingHooks};
use agent_tools::{
    InstallDirGuard, PathGuard, SandboxCache, SandboxRuntime, Tool, ToolContext, ToolDefinition,
    ToolMetadata, ToolOutput, ToolRegistry, ToolResult,
};

use crate::bridge::ExecutionBridge;
use crate::custom::CustomToolManager;
use crate::manage::register_manage_tools;
use crate::meta::MetaTools;

/// Executor of a registered custom tool; forwards to the execution bridge.
struct CustomToolProxy {
    name: String,
    bridge: Arc<ExecutionBridge>,
}

#[async_trait]
impl Tool for CustomToolProxy {
    async fn invoke(&self, args: Value, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        self.bridge.execute_active(&self.name, args, ctx).await
    }
}

struct Builtin {
    definition: ToolDefinition,
    executor: Arc<dyn Tool>,
    metadata: ToolMetadata,
}

/// Process-wide owner of the custom tool store, sandbox cache and audit log.
///
/// Call [`ToolCatalog::build`] once per conversation to get a fresh
/// [`ToolRegistry`] holding the built-ins, the caller's active custom tools,
/// the meta-tools and the management tools.
pub struct ToolCatalog {
    config: ToolkitConfig,
    manager: Arc<CustomToolManager>,
    bridge: Arc<ExecutionBridge>,
    builtins: Vec<Builtin>,
    hooks: HookChain,
    path_guard: Option<Arc<dyn PathGuard>>,
}

impl std::fmt::Debug for ToolCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolCatalog")
            .field("builtins", &self.builtins.len())
            .field("hooks", &self.hooks.len())
            .field("bridge", &self.bridge)
            .finish_non_exhaustive()
    }
}

impl ToolCatalog {
    /// Wires the catalog over caller-supplied persistence and runtime.
    #[must_use]
    pub fn new(
        config: ToolkitConfig,
        repository: Arc<dyn CustomToolRepository>,
        audit: Arc<dyn AuditStore>,
        runtime: Arc<dyn SandboxRuntime>,
    ) -> Self {
        let cache = Arc::new(SandboxCache::new(runtime));
        let manager = Arc::new(CustomToolManager::new(
            Arc::clone(&repository),
            Arc::clone(&cache),
        ));
        let bridge = Arc::new(
            ExecutionBridge::new(repository, cache, audit)
                .with_timeout(config.limits.sandbox_timeout())
                .with_max_argument_chars(config.limits.max_argument_chars),
        );
        let roots = &config.path_guard.protected_roots;
        let path_guard = (!roots.is_empty())
            .then(|| Arc::new(InstallDirGuard::new(roots)) as Arc<dyn PathGuard>);

        Self {
            config,
            manager,
            bridge,
            builtins: Vec::new(),
            hooks: HookChain::new().with(Arc::new(TracingHooks)),
            path_guard,
        }
    }

    /// Catalog backed by the in-memory repository and audit ring.
    #[must_use]
    pub fn in_memory(config: ToolkitConfig, runtime: Arc<dyn SandboxRuntime>) -> Self {
        let window = NonZeroUsize::new(config.limits.audit_window).unwrap_or(NonZeroUsize::MIN);
        let audit = Arc::new(InMemoryAuditLog::new(AuditConfig::new(window)));
        Self::new(
            config,
            Arc::new(InMemoryToolRepository::new()),
            audit,
            runtime,
        )
    }

    /// Adds dispatch hooks after the built-in tracing hooks.
    #[must_use]
    pub fn with_hooks(mut self, hooks: Arc<dyn DispatchHooks>) -> Self {
        self.hooks = self.hooks.with(hooks);
        self
    }

    /// Adds a built-in tool to every registry built from now on.
    pub fn register_builtin(
        &mut self,
        definition: ToolDefinition,
        executor: Arc<dyn Tool>,
        metadata: ToolMetadata,
    ) {
        debug!(tool = %definition.name(), "added built-in tool to catalog");
        self.builtins.push(Builtin {
            definition,
            executor,
            metadata,
        });
    }

    /// Effective configuration.
    #[must_use]
    pub fn config(&self) -> &ToolkitConfig {
        &self.config
    }

    /// Custom tool lifecycle manager.
    #[must_use]
    pub fn manager(&self) -> &Arc<CustomToolManager> {
        &self.manager
    }

    /// Execution bridge for custom tools.
    #[must_use]
    pub fn bridge(&self) -> &Arc<ExecutionBridge> {
        &self.bridge
    }

    /// Context for a call on behalf of `user_id`, carrying the path guard.
    #[must_use]
    pub fn context(&self, user_id: Option<&str>) -> ToolContext {
        let mut ctx = ToolContext::new();
        if let Some(user) = user_id {
            ctx = ctx.with_user(user);
        }
        if let Some(guard) = &self.path_guard {
            ctx = ctx.with_path_guard(Arc::clone(guard));
        }
        ctx
    }

    /// Loads every active custom tool into the sandbox cache.
    ///
    /// # Errors
    ///
    /// Returns [`agent_tools::ToolError::Execution`] when the store fails.
    pub async fn warm(&self) -> ToolResult<usize> {
        self.manager.warm_cache().await
    }

    /// Builds a fresh registry for one conversation.
    ///
    /// Custom tools are the active ones visible to `ctx.user_id()`.
    ///
    /// # Errors
    ///
    /// Returns [`agent_tools::ToolError::DuplicateTool`] when two built-ins
    /// collide or a built-in takes a meta-tool name, or
    /// [`agent_tools::ToolError::Execution`] when the store fails.
    pub async fn build(&self, ctx: &ToolContext) -> ToolResult<Arc<ToolRegistry>> {
        let registry = Arc::new(ToolRegistry::new().with_hooks(Arc::new(self.hooks.clone())));

        for builtin in &self.builtins {
            registry.register_arc(
                builtin.definition.clone(),
                Arc::clone(&builtin.executor),
                builtin.metadata.clone(),
            )?;
        }

        let definitions = self.manager.list_active_definitions(ctx.user_id()).await?;
        let mut custom = 0_usize;
        for definition in definitions {
            let name = definition.name().base().to_owned();
            let proxy = CustomToolProxy {
                name,
                bridge: Arc::clone(&self.bridge),
            };
            match registry.register(definition, proxy, ToolMetadata::custom()) {
                Ok(()) => custom += 1,
                Err(err) => warn!(%err, "skipping custom tool"),
            }
        }

        MetaTools::new(&registry)
            .with_limits(self.config.limits.clone())
            .with_numeric_caps(self.config.numeric_caps.clone())
            .with_manager(Arc::clone(&self.manager))
            .register()?;
        register_manage_tools(&registry, &self.manager)?;

        debug!(
            builtins = self.builtins.len(),
            custom,
            total = registry.len(),
            "built tool registry"
        );
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use agent_primitives::QualifiedName;
    use agent_store::ToolAuthor;
    use agent_tools::{FnRuntime, SandboxRequest, ToolError, ToolSource};
    use serde_json::json;

    use crate::custom::CreateToolInput;

    fn catalog() -> ToolCatalog {
        let runtime = Arc::new(FnRuntime::new(|request: SandboxRequest<'_>| {
            Ok(json!({ "tool": request.tool, "args": request.args }))
        }));
        let mut catalog = ToolCatalog::in_memory(ToolkitConfig::default(), runtime);
        catalog.register_builtin(
            ToolDefinition::new(QualifiedName::core("read_file").unwrap(), "Read a file").unwrap(),
            Arc::new(|args: Value| async move { Ok::<_, ToolError>(args) }),
            ToolMetadata::built_in(),
        );
        catalog
    }

    #[tokio::test]
    async fn build_combines_every_source() {
        let catalog = catalog();
        catalog
            .manager()
            .create(
                CreateToolInput::new("get_weather", "Weather", "return 1;"),
                ToolAuthor::User,
            )
            .await
            .unwrap();

        let registry = catalog.build(&catalog.context(None)).await.unwrap();
        assert!(registry.has("core.read_file"));
        assert!(registry.has("custom.get_weather"));
        assert!(registry.has("core.search_tools"));
        assert!(registry.has("core.create_tool"));
        assert_eq!(registry.get_tools_by_source(ToolSource::Custom).len(), 1);
    }

    #[tokio::test]
    async fn custom_proxy_runs_through_bridge() {
        let catalog = catalog();
        catalog
            .manager()
            .create(
                CreateToolInput::new("get_weather", "Weather", "return 1;"),
                ToolAuthor::User,
            )
            .await
            .unwrap();
        let ctx = catalog.context(None);
        let registry = catalog.build(&ctx).await.unwrap();

        let output = registry
            .execute("get_weather", json!({"city": "Oslo"}), &ctx)
            .await
            .unwrap();
        assert_eq!(output.content["tool"], "get_weather");
        assert_eq!(output.content["args"]["city"], "Oslo");
    }

    #[tokio::test]
    async fn registries_are_isolated_per_build() {
        let catalog = catalog();
        let ctx = catalog.context(Some("alice"));
        let before = catalog.build(&ctx).await.unwrap();
        catalog
            .manager()
            .create(
                CreateToolInput::new("late_tool", "Late", "return 1;"),
                ToolAuthor::Llm,
            )
            .await
            .unwrap();
        let after = catalog.build(&ctx).await.unwrap();
        assert!(!before.has("late_tool"));
        assert!(after.has("late_tool"));
    }

    #[test]
    fn protected_roots_become_a_path_guard() {
        let mut config = ToolkitConfig::default();
        config.path_guard.protected_roots = vec!["/opt/agent".into()];
        let runtime = Arc::new(FnRuntime::new(|_: SandboxRequest<'_>| Ok(Value::Null)));
        let catalog = ToolCatalog::in_memory(config, runtime);
        let ctx = catalog.context(Some("alice"));
        assert!(ctx.check_path(std::path::Path::new("/opt/agent/bin")).is_err());
        assert_eq!(ctx.user_id(), Some("alice"));
    }
}
