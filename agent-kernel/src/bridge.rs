//! Execution of persisted custom tools inside the sandbox.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use agent_primitives::{PermissionSet, ToolStatus};
use agent_store::{
    AuditOutcome, AuditStore, CustomTool, CustomToolRepository, ExecutionAuditRecord, ToolFilter,
};
use agent_policy::{CodeValidator, CodeViolation};
use agent_tools::suggest::{MAX_SUGGESTIONS, suggest};
use agent_tools::{
    SandboxCache, SandboxError, SandboxRequest, ToolContext, ToolError, ToolOutput,
    ToolResult,
};

use crate::custom::{base_name, program_for, storage_error};

/// Default wall-clock budget of one sandbox run.
pub const DEFAULT_SANDBOX_TIMEOUT: Duration = Duration::from_secs(30);
/// Default cap on serialized argument size.
pub const DEFAULT_MAX_ARGUMENT_CHARS: usize = 100_000;

/// Unsaved tool body for dry runs.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDraft {
    /// Name used in diagnostics.
    pub name: String,
    /// Program body.
    pub code: String,
    /// Permission tags granted for the run.
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// Runs active custom tools, keeping the sandbox cache and audit log current.
pub struct ExecutionBridge {
    repository: Arc<dyn CustomToolRepository>,
    cache: Arc<SandboxCache>,
    audit: Arc<dyn AuditStore>,
    validator: CodeValidator,
    timeout: Duration,
    max_argument_chars: usize,
}

impl std::fmt::Debug for ExecutionBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionBridge")
            .field("timeout", &self.timeout)
            .field("max_argument_chars", &self.max_argument_chars)
            .finish_non_exhaustive()
    }
}

impl ExecutionBridge {
    /// Creates a bridge with default limits.
    #[must_use]
    pub fn new(
        repository: Arc<dyn CustomToolRepository>,
        cache: Arc<SandboxCache>,
        audit: Arc<dyn AuditStore>,
    ) -> Self {
        Self {
            repository,
            cache,
            audit,
            validator: CodeValidator::new(),
            timeout: DEFAULT_SANDBOX_TIMEOUT,
            max_argument_chars: DEFAULT_MAX_ARGUMENT_CHARS,
        }
    }

    /// Overrides the sandbox time budget.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Overrides the argument size cap.
    #[must_use]
    pub fn with_max_argument_chars(mut self, limit: usize) -> Self {
        self.max_argument_chars = limit;
        self
    }

    /// Audit store receiving execution records.
    #[must_use]
    pub fn audit(&self) -> &Arc<dyn AuditStore> {
        &self.audit
    }

    /// Executes the active custom tool `name` with `args`.
    ///
    /// Runtime failures and timeouts are returned as error outputs, not as
    /// `Err`, so the model sees them as ordinary tool results.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::NotFound`] for unknown or invisible tools,
    /// [`ToolError::ApprovalRequired`] or [`ToolError::Disabled`] for tools
    /// that may not run, [`ToolError::PayloadTooLarge`] for oversized
    /// arguments, and [`ToolError::Execution`] when the store fails.
    pub async fn execute_active(
        &self,
        name: &str,
        args: Value,
        ctx: &ToolContext,
    ) -> ToolResult<ToolOutput> {
        let base = base_name(name);
        let tool = match self.repository.get_by_name(base).await.map_err(storage_error)? {
            Some(tool) if tool.visible_to(ctx.user_id()) => tool,
            _ => return Err(self.not_found(name, ctx).await),
        };

        let executable = match tool.executable() {
            Ok(executable) => executable,
            Err(ToolStatus::PendingApproval) => {
                return Err(ToolError::ApprovalRequired {
                    name: tool.name.clone(),
                    tool_id: tool.id.to_string(),
                });
            }
            Err(_) => {
                return Err(ToolError::Disabled {
                    name: tool.name.clone(),
                });
            }
        };
        ensure_payload(&args, self.max_argument_chars)?;

        // The shared cache is written only by lifecycle writers under their lock.
        let program = program_for(&tool);
        if !self.cache.is_current(executable.name(), &program) {
            warn!(tool = %tool.name, version = tool.version, "cached sandbox program differs from the store; running the stored version");
        }

        let started = Instant::now();
        let run = self.cache.run_program(executable.name(), &program, &args, ctx);
        let result = tokio::time::timeout(self.timeout, run)
            .await
            .unwrap_or(Err(SandboxError::Timeout {
                after: self.timeout,
            }));
        let elapsed = started.elapsed();

        match result {
            Ok(value) => {
                if let Err(err) = self.repository.record_usage(tool.id).await {
                    warn!(tool = %tool.name, %err, "failed to record usage");
                }
                self.append_audit(&tool, &args, AuditOutcome::success(&value), elapsed)
                    .await;
                debug!(tool = %tool.name, elapsed_ms = elapsed.as_millis(), "custom tool succeeded");
                Ok(ToolOutput::success(value))
            }
            Err(err) => {
                info!(tool = %tool.name, %err, "custom tool failed");
                self.append_audit(&tool, &args, AuditOutcome::failure(err.to_string()), elapsed)
                    .await;
                Ok(failure_output(&tool.name, &err))
            }
        }
    }

    /// Dry-runs an unsaved body with `args`.
    ///
    /// Nothing is persisted and nothing is audited.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Validation`] for forbidden constructs or unknown
    /// permissions and [`ToolError::PayloadTooLarge`] for oversized arguments.
    pub async fn test(&self, draft: &ToolDraft, args: Value, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let mut problems: Vec<String> = self
            .validator
            .scan(&draft.code)
            .iter()
            .map(CodeViolation::message)
            .collect();
        let permissions = PermissionSet::parse_tags(&draft.permissions).unwrap_or_else(|unknown| {
            problems.push(format!("unknown permission(s): {}", unknown.join(", ")));
            PermissionSet::new()
        });
        if !problems.is_empty() {
            return Err(ToolError::validation(problems.join("; ")));
        }
        ensure_payload(&args, self.max_argument_chars)?;

        let request = SandboxRequest {
            tool: &draft.name,
            code: &draft.code,
            args: &args,
            permissions: &permissions,
            context: ctx,
        };
        let result = tokio::time::timeout(self.timeout, self.cache.runtime().run(request))
            .await
            .unwrap_or(Err(SandboxError::Timeout {
                after: self.timeout,
            }));
        Ok(match result {
            Ok(value) => ToolOutput::success(value),
            Err(err) => failure_output(&draft.name, &err),
        })
    }

    async fn append_audit(
        &self,
        tool: &CustomTool,
        args: &Value,
        outcome: AuditOutcome,
        elapsed: Duration,
    ) {
        let record = ExecutionAuditRecord::new(tool.name.as_str(), tool.id, args, outcome, elapsed);
        if let Err(err) = self.audit.append(record).await {
            warn!(tool = %tool.name, %err, "failed to append audit record");
        }
    }

    async fn not_found(&self, name: &str, ctx: &ToolContext) -> ToolError {
        let mut filter = ToolFilter::all().with_status(ToolStatus::Active);
        if let Some(user) = ctx.user_id() {
            filter = filter.visible_to(user);
        }
        let suggestions = match self.repository.list(&filter).await {
            Ok(tools) => suggest(
                base_name(name),
                tools.iter().map(|tool| tool.name.as_str()),
                MAX_SUGGESTIONS,
            ),
            Err(err) => {
                warn!(%err, "could not list custom tools for suggestions");
                Vec::new()
            }
        };
        ToolError::NotFound {
            name: name.to_owned(),
            suggestions,
        }
    }
}

/// Rejects arguments whose serialized form exceeds `limit` characters.
///
/// # Errors
///
/// Returns [`ToolError::PayloadTooLarge`].
pub fn ensure_payload(args: &Value, limit: usize) -> ToolResult<()> {
    let size = args.to_string().chars().count();
    if size > limit {
        return Err(ToolError::PayloadTooLarge { size, limit });
    }
    Ok(())
}

fn failure_output(tool: &str, err: &SandboxError) -> ToolOutput {
    ToolOutput::error(json!({
        "error": ToolError::execution(err.to_string()).to_string(),
        "tool": tool,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use agent_store::{InMemoryAuditLog, InMemoryToolRepository, ToolAuthor};
    use agent_tools::{FnRuntime, SandboxRuntime};
    use async_trait::async_trait;

    use crate::custom::{CreateToolInput, CustomToolManager};

    struct Harness {
        manager: CustomToolManager,
        bridge: ExecutionBridge,
        audit: Arc<InMemoryAuditLog>,
        repository: Arc<InMemoryToolRepository>,
    }

    fn harness(runtime: Arc<dyn SandboxRuntime>) -> Harness {
        let repository = Arc::new(InMemoryToolRepository::new());
        let cache = Arc::new(SandboxCache::new(runtime));
        let audit = Arc::new(InMemoryAuditLog::default());
        Harness {
            manager: CustomToolManager::new(repository.clone(), cache.clone()),
            bridge: ExecutionBridge::new(repository.clone(), cache, audit.clone()),
            audit,
            repository,
        }
    }

    fn echo() -> Arc<dyn SandboxRuntime> {
        Arc::new(FnRuntime::new(|request: SandboxRequest<'_>| {
            if request.args.get("fail").is_some() {
                return Err(SandboxError::runtime("boom"));
            }
            Ok(json!({ "echo": request.args }))
        }))
    }

    #[tokio::test]
    async fn active_tool_runs_and_is_audited() {
        let h = harness(echo());
        h.manager
            .create(CreateToolInput::new("echo_tool", "Echo", "return args;"), ToolAuthor::User)
            .await
            .unwrap();

        let output = h
            .bridge
            .execute_active("custom.echo_tool", json!({"password": "hunter2", "x": 1}), &ToolContext::new())
            .await
            .unwrap();
        assert!(!output.is_error);
        assert_eq!(output.content["echo"]["x"], 1);

        let records = h.audit.recent("echo_tool", 10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].outcome().is_success());
        assert_eq!(records[0].arguments()["password"], agent_store::REDACTED);

        let stored = h.repository.get_by_name("echo_tool").await.unwrap().unwrap();
        assert_eq!(stored.usage_count, 1);
    }

    #[tokio::test]
    async fn execution_never_repopulates_the_cache() {
        let h = harness(echo());
        h.manager
            .create(CreateToolInput::new("echo_tool", "Echo", "return args;"), ToolAuthor::User)
            .await
            .unwrap();
        assert!(h.manager.cache().remove("echo_tool"));

        let output = h
            .bridge
            .execute_active("echo_tool", json!({"x": 1}), &ToolContext::new())
            .await
            .unwrap();
        assert!(!output.is_error);
        assert_eq!(output.content["echo"]["x"], 1);
        assert!(!h.manager.cache().contains("echo_tool"));

        h.manager.delete("echo_tool", true, ToolAuthor::User).await.unwrap();
        let err = h
            .bridge
            .execute_active("echo_tool", json!({}), &ToolContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound { .. }));
        assert!(h.manager.cache().is_empty());
    }

    #[tokio::test]
    async fn runtime_failure_is_an_error_output() {
        let h = harness(echo());
        h.manager
            .create(CreateToolInput::new("echo_tool", "Echo", "return args;"), ToolAuthor::User)
            .await
            .unwrap();

        let output = h
            .bridge
            .execute_active("echo_tool", json!({"fail": true}), &ToolContext::new())
            .await
            .unwrap();
        assert!(output.is_error);
        assert!(output.text().contains("boom"));

        let records = h.audit.recent("echo_tool", 10).await.unwrap();
        assert!(!records[0].outcome().is_success());
    }

    #[tokio::test]
    async fn gated_tools_do_not_run() {
        let h = harness(echo());
        h.manager
            .create(
                CreateToolInput::new("run_shell", "Shell", "return 1;").with_permissions(["shell"]),
                ToolAuthor::Llm,
            )
            .await
            .unwrap();
        let err = h
            .bridge
            .execute_active("run_shell", json!({}), &ToolContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ApprovalRequired { .. }));

        h.manager.reject("run_shell").await.unwrap();
        let err = h
            .bridge
            .execute_active("run_shell", json!({}), &ToolContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Disabled { .. }));
    }

    #[tokio::test]
    async fn unknown_and_foreign_tools_are_not_found() {
        let h = harness(echo());
        h.manager
            .create(
                CreateToolInput::new("echo_tool", "Echo", "return args;").with_owner("alice"),
                ToolAuthor::User,
            )
            .await
            .unwrap();

        let err = h
            .bridge
            .execute_active("echo_tol", json!({}), &ToolContext::new().with_user("alice"))
            .await
            .unwrap_err();
        assert_eq!(err.suggestions(), ["echo_tool".to_owned()]);

        let err = h
            .bridge
            .execute_active("echo_tool", json!({}), &ToolContext::new().with_user("bob"))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound { .. }));
    }

    #[tokio::test]
    async fn oversized_payload_never_reaches_runtime() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let runtime = Arc::new(FnRuntime::new(move |_: SandboxRequest<'_>| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Null)
        }));
        let h = harness(runtime);
        let bridge = ExecutionBridge::new(h.repository.clone(), h.manager.cache().clone(), h.audit.clone())
            .with_max_argument_chars(16);
        h.manager
            .create(CreateToolInput::new("echo_tool", "Echo", "return args;"), ToolAuthor::User)
            .await
            .unwrap();

        let err = bridge
            .execute_active("echo_tool", json!({"text": "x".repeat(64)}), &ToolContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::PayloadTooLarge { limit: 16, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    struct Sleepy;

    #[async_trait]
    impl SandboxRuntime for Sleepy {
        async fn run(&self, _request: SandboxRequest<'_>) -> Result<Value, SandboxError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Value::Null)
        }
    }

    #[tokio::test]
    async fn slow_programs_time_out() {
        let h = harness(Arc::new(Sleepy));
        let bridge = ExecutionBridge::new(h.repository.clone(), h.manager.cache().clone(), h.audit.clone())
            .with_timeout(Duration::from_millis(20));
        h.manager
            .create(CreateToolInput::new("slow_tool", "Slow", "return 1;"), ToolAuthor::User)
            .await
            .unwrap();

        let output = bridge
            .execute_active("slow_tool", json!({}), &ToolContext::new())
            .await
            .unwrap();
        assert!(output.is_error);
        assert!(output.text().contains("timed out"));
    }

    #[tokio::test]
    async fn dry_run_leaves_no_trace() {
        let h = harness(echo());
        let draft = ToolDraft {
            name: "draft".into(),
            code: "return args;".into(),
            permissions: Vec::new(),
        };
        let output = h
            .bridge
            .test(&draft, json!({"x": 2}), &ToolContext::new())
            .await
            .unwrap();
        assert_eq!(output.content["echo"]["x"], 2);
        assert!(h.repository.is_empty().await);
        assert!(h.audit.recent("draft", 10).await.unwrap().is_empty());

        let bad = ToolDraft {
            code: "process.exit(1)".into(),
            ..draft
        };
        assert!(matches!(
            h.bridge.test(&bad, json!({}), &ToolContext::new()).await,
            Err(ToolError::Validation { .. })
        ));
    }
}
