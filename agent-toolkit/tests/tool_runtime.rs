use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agent_toolkit::config::ToolkitConfig;
use agent_toolkit::kernel::{CreateToolInput, ToolCatalog};
use agent_toolkit::policy::{CodeLanguage, RiskLevel, analyze_code_risk};
use agent_toolkit::primitives::{ParameterSchema, QualifiedName, ToolStatus};
use agent_toolkit::store::{AuditStore, ToolAuthor};
use agent_toolkit::telemetry::DispatchHooks;
use agent_toolkit::tools::{
    SandboxError, SandboxRequest, SandboxRuntime, ToolContext, ToolDefinition, ToolError,
    ToolMetadata, ToolOutput, ToolRegistry,
};
use async_trait::async_trait;
use serde_json::{Value, json};

/// Runtime that echoes its input and counts invocations.
#[derive(Default)]
struct EchoRuntime {
    runs: AtomicUsize,
}

#[async_trait]
impl SandboxRuntime for EchoRuntime {
    async fn run(&self, request: SandboxRequest<'_>) -> Result<Value, SandboxError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if request.args.get("explode").is_some() {
            return Err(SandboxError::runtime("program threw"));
        }
        Ok(json!({
            "tool": request.tool,
            "args": request.args,
            "permissions": request.permissions.tags(),
        }))
    }
}

#[derive(Default)]
struct RecordingHooks {
    events: Mutex<Vec<(String, bool)>>,
}

impl DispatchHooks for RecordingHooks {
    fn on_start(&self, _tool: &str, _args: &Value) {}

    fn on_end(&self, tool: &str, _args: &Value, success: bool, _elapsed: Duration) {
        self.events
            .lock()
            .unwrap()
            .push((tool.to_owned(), success));
    }
}

struct Fixture {
    catalog: ToolCatalog,
    runtime: Arc<EchoRuntime>,
    hooks: Arc<RecordingHooks>,
    ctx: ToolContext,
}

async fn always_panics(_args: Value) -> Result<Value, ToolError> {
    panic!("bad executor")
}

fn fixture() -> Fixture {
    let runtime = Arc::new(EchoRuntime::default());
    let hooks = Arc::new(RecordingHooks::default());
    let mut catalog = ToolCatalog::in_memory(ToolkitConfig::default(), runtime.clone())
        .with_hooks(hooks.clone());

    catalog.register_builtin(
        ToolDefinition::new(QualifiedName::core("read_file").unwrap(), "Read a file from disk")
            .unwrap()
            .with_category("files")
            .with_parameters(ParameterSchema::empty().property("path", "string", "File path", true)),
        Arc::new(|args: Value| async move { Ok::<_, ToolError>(json!({ "contents": args["path"] })) }),
        ToolMetadata::built_in(),
    );
    catalog.register_builtin(
        ToolDefinition::new(QualifiedName::core("panicky").unwrap(), "Always panics").unwrap(),
        Arc::new(always_panics),
        ToolMetadata::built_in(),
    );

    let ctx = catalog.context(Some("alice"));
    Fixture {
        catalog,
        runtime,
        hooks,
        ctx,
    }
}

async fn call(registry: &ToolRegistry, ctx: &ToolContext, tool: &str, args: Value) -> ToolOutput {
    registry.execute(tool, args, ctx).await.unwrap()
}

#[tokio::test]
async fn create_tool_and_use_it() -> anyhow::Result<()> {
    let f = fixture();
    let registry = f.catalog.build(&f.ctx).await?;

    let created = call(
        &registry,
        &f.ctx,
        "create_tool",
        json!({
            "name": "get_weather",
            "description": "Current weather for a city",
            "code": "return { city: args.city, temp: 21 };",
            "parameters": {
                "type": "object",
                "properties": { "city": { "type": "string" } },
                "required": ["city"]
            }
        }),
    )
    .await;
    assert_eq!(created.content["success"], true);
    assert_eq!(created.content["status"], "active");

    let registry = f.catalog.build(&f.ctx).await?;
    let output = call(
        &registry,
        &f.ctx,
        "use_tool",
        json!({"tool_name": "get_weather", "arguments": {"city": "Oslo"}}),
    )
    .await;
    assert!(!output.is_error, "{}", output.text());
    assert_eq!(output.content["args"]["city"], "Oslo");

    let missing = call(
        &registry,
        &f.ctx,
        "use_tool",
        json!({"tool_name": "custom.get_weather", "arguments": {}}),
    )
    .await;
    assert!(missing.is_error);
    assert!(missing.content["help"].as_str().unwrap().contains("city"));
    Ok(())
}

#[tokio::test]
async fn invalid_names_are_rejected_mentioning_lowercase() -> anyhow::Result<()> {
    let f = fixture();
    let registry = f.catalog.build(&f.ctx).await?;
    for name in ["GetWeather", "get-weather"] {
        let output = call(
            &registry,
            &f.ctx,
            "create_tool",
            json!({"name": name, "description": "x", "code": "return 1;"}),
        )
        .await;
        assert!(output.is_error);
        assert_eq!(output.content["success"], false);
        assert!(output.content["error"].as_str().unwrap().contains("lowercase"));
    }
    Ok(())
}

#[tokio::test]
async fn forbidden_code_is_rejected_on_create_and_update() -> anyhow::Result<()> {
    let f = fixture();
    let manager = f.catalog.manager();

    let err = manager
        .create(
            CreateToolInput::new("bad_tool", "Bad", "require('child_process').exec('ls')"),
            ToolAuthor::User,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ToolError::Validation { .. }));

    manager
        .create(CreateToolInput::new("good_tool", "Good", "return 1;"), ToolAuthor::Llm)
        .await?;
    let registry = f.catalog.build(&f.ctx).await?;
    let output = call(
        &registry,
        &f.ctx,
        "update_custom_tool",
        json!({"name": "good_tool", "code": "process.exit(1)"}),
    )
    .await;
    assert!(output.is_error);
    assert_eq!(output.content["kind"], "validation_error");
    assert_eq!(f.catalog.manager().get("good_tool").await?.map(|t| t.version), Some(1));
    Ok(())
}

#[tokio::test]
async fn dangerous_tools_wait_for_approval() -> anyhow::Result<()> {
    let f = fixture();
    let registry = f.catalog.build(&f.ctx).await?;

    let created = call(
        &registry,
        &f.ctx,
        "create_tool",
        json!({
            "name": "run_shell",
            "description": "Run a shell command",
            "code": "return args.command;",
            "permissions": ["shell"]
        }),
    )
    .await;
    assert_eq!(created.content["success"], true);
    assert_eq!(created.content["requiresApproval"], true);
    assert!(created.content["pendingToolId"].is_string());

    let registry = f.catalog.build(&f.ctx).await?;
    assert!(!registry.has("custom.run_shell"));
    let err = f
        .catalog
        .bridge()
        .execute_active("run_shell", json!({}), &f.ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, ToolError::ApprovalRequired { .. }));
    assert_eq!(f.runtime.runs.load(Ordering::SeqCst), 0);

    let approved = f
        .catalog
        .manager()
        .toggle("run_shell", true, ToolAuthor::User)
        .await?;
    assert_eq!(approved.status, ToolStatus::Active);

    let registry = f.catalog.build(&f.ctx).await?;
    let output = call(&registry, &f.ctx, "run_shell", json!({"command": "ls"})).await;
    assert!(!output.is_error);
    assert_eq!(output.content["permissions"][0], "shell");
    Ok(())
}

#[tokio::test]
async fn user_tools_are_protected_from_the_model() -> anyhow::Result<()> {
    let f = fixture();
    f.catalog
        .manager()
        .create(
            CreateToolInput::new("user_owned_tool", "Mine", "return 1;"),
            ToolAuthor::User,
        )
        .await?;
    let registry = f.catalog.build(&f.ctx).await?;

    let output = call(
        &registry,
        &f.ctx,
        "delete_custom_tool",
        json!({"name": "user_owned_tool", "confirm": true}),
    )
    .await;
    assert_eq!(output.content["success"], false);
    assert!(output.content["error"].as_str().unwrap().contains("protected"));
    assert!(f.catalog.manager().get("user_owned_tool").await?.is_some());
    Ok(())
}

#[tokio::test]
async fn search_all_lists_each_non_meta_tool_once() -> anyhow::Result<()> {
    let f = fixture();
    f.catalog
        .manager()
        .create(CreateToolInput::new("get_weather", "Weather", "return 1;"), ToolAuthor::User)
        .await?;
    let registry = f.catalog.build(&f.ctx).await?;

    let output = call(&registry, &f.ctx, "search_tools", json!({"query": "all"})).await;
    let mut names: Vec<String> = output.content["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|tool| tool["name"].as_str().unwrap().to_owned())
        .collect();
    let listed = names.len();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), listed);

    let expected = registry
        .get_definitions()
        .iter()
        .filter(|definition| !agent_toolkit::kernel::is_meta_tool(definition))
        .count();
    assert_eq!(listed, expected);
    assert!(names.contains(&"custom.get_weather".to_owned()));
    assert!(!names.contains(&"core.use_tool".to_owned()));
    Ok(())
}

#[tokio::test]
async fn unknown_tools_get_bounded_suggestions() -> anyhow::Result<()> {
    let f = fixture();
    let registry = f.catalog.build(&f.ctx).await?;
    let output = call(
        &registry,
        &f.ctx,
        "use_tool",
        json!({"tool_name": "does_not_exist", "arguments": {}}),
    )
    .await;
    assert!(output.is_error);
    assert!(output.content["suggestions"].as_array().unwrap().len() <= 5);

    let output = call(
        &registry,
        &f.ctx,
        "use_tool",
        json!({"tool_name": "reed_file", "arguments": {"path": "x"}}),
    )
    .await;
    assert_eq!(output.content["suggestions"][0], "core.read_file");
    Ok(())
}

#[tokio::test]
async fn oversized_arguments_never_reach_the_sandbox() -> anyhow::Result<()> {
    let f = fixture();
    f.catalog
        .manager()
        .create(CreateToolInput::new("sink", "Sink", "return 1;"), ToolAuthor::User)
        .await?;
    let registry = f.catalog.build(&f.ctx).await?;

    let output = call(
        &registry,
        &f.ctx,
        "use_tool",
        json!({"tool_name": "sink", "arguments": {"blob": "x".repeat(100_001)}}),
    )
    .await;
    assert!(output.is_error);
    assert_eq!(output.content["error"], "payload_too_large");
    assert_eq!(f.runtime.runs.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn batch_counts_always_add_up() -> anyhow::Result<()> {
    let f = fixture();
    f.catalog
        .manager()
        .create(CreateToolInput::new("echo_tool", "Echo", "return args;"), ToolAuthor::User)
        .await?;
    let registry = f.catalog.build(&f.ctx).await?;

    let calls = json!([
        {"tool_name": "read_file", "arguments": {"path": "/a"}},
        {"tool_name": "echo_tool", "arguments": {"n": 1}},
        {"tool_name": "echo_tool", "arguments": {"explode": true}},
        {"tool_name": "panicky"},
        {"tool_name": "missing_tool"},
        {"tool_name": "read_file", "arguments": {}},
    ]);
    let output = call(&registry, &f.ctx, "batch_use_tool", json!({ "calls": calls })).await;
    let success = output.content["successCount"].as_u64().unwrap();
    let failure = output.content["failureCount"].as_u64().unwrap();
    assert_eq!(success + failure, 6);
    assert_eq!(success, 2);
    assert!(!output.is_error);
    assert_eq!(output.content["results"][3]["success"], false);
    Ok(())
}

#[tokio::test]
async fn sandbox_failures_are_audited() -> anyhow::Result<()> {
    let f = fixture();
    let created = f
        .catalog
        .manager()
        .create(CreateToolInput::new("echo_tool", "Echo", "return args;"), ToolAuthor::User)
        .await?;
    let registry = f.catalog.build(&f.ctx).await?;

    call(&registry, &f.ctx, "echo_tool", json!({"api_key": "sk-123"})).await;
    let failed = call(&registry, &f.ctx, "echo_tool", json!({"explode": true})).await;
    assert!(failed.is_error);

    let records = f.catalog.bridge().audit().recent("echo_tool", 10).await?;
    assert_eq!(records.len(), 2);
    assert!(records[0].outcome().is_success());
    assert_eq!(records[0].arguments()["api_key"], "[REDACTED]");
    assert!(!records[1].outcome().is_success());
    assert_eq!(records[1].tool_id(), created.tool.id);
    Ok(())
}

#[tokio::test]
async fn inspect_returns_custom_code() -> anyhow::Result<()> {
    let f = fixture();
    f.catalog
        .manager()
        .create(CreateToolInput::new("echo_tool", "Echo", "return args;"), ToolAuthor::Llm)
        .await?;
    let registry = f.catalog.build(&f.ctx).await?;
    let output = call(
        &registry,
        &f.ctx,
        "inspect_tool_source",
        json!({"tool_name": "custom.echo_tool"}),
    )
    .await;
    assert_eq!(output.content["code"], "return args;");
    assert_eq!(output.content["createdBy"], "llm");
    Ok(())
}

#[tokio::test]
async fn hooks_observe_dispatch() -> anyhow::Result<()> {
    let f = fixture();
    let registry = f.catalog.build(&f.ctx).await?;
    call(&registry, &f.ctx, "read_file", json!({"path": "/a"})).await;
    let err = registry.execute("panicky", json!({}), &f.ctx).await.unwrap_err();
    assert!(matches!(err, ToolError::Execution { .. }));

    let events = f.hooks.events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            ("core.read_file".to_owned(), true),
            ("core.panicky".to_owned(), false),
        ]
    );
    Ok(())
}

#[test]
fn risk_verdicts() {
    let analysis = analyze_code_risk("eval(x)", CodeLanguage::JavaScript);
    assert_eq!(analysis.level, RiskLevel::High);
    assert!(
        analysis
            .factors
            .iter()
            .any(|factor| factor.description.eq_ignore_ascii_case("dynamic code evaluation"))
    );

    let analysis = analyze_code_risk(
        "eval(x); this.constructor.constructor('return process')()",
        CodeLanguage::JavaScript,
    );
    assert_eq!(analysis.level, RiskLevel::Critical);
    assert_eq!(analysis.score, 100);
    assert!(analysis.blocked);
}

#[test]
fn config_round_trips_from_toml() -> anyhow::Result<()> {
    let config = ToolkitConfig::from_toml_str(
        r#"
        [limits]
        max_batch_calls = 4

        [[numeric_caps]]
        tool = "core.list_files"
        parameter = "depth"
        max = 3
        "#,
    )?;
    assert_eq!(config.limits.max_batch_calls, 4);
    assert_eq!(config.limits.max_argument_chars, 100_000);
    assert_eq!(config.numeric_caps.len(), 1);
    Ok(())
}
