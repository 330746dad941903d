//! Meta-tools: discovery, documentation and indirect dispatch.
//!
//! The model sees a small fixed surface (`search_tools`, `get_tool_help`,
//! `use_tool`, `batch_use_tool`, `inspect_tool_source`) and reaches the rest
//! of the registry through it. Every failure is returned as an error output
//! carrying suggestions or parameter documentation.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::debug;

use agent_config::{Limits, NumericCap, default_numeric_caps};
use agent_primitives::{ParameterSchema, QualifiedName, ToolNamespace};
use agent_tools::{
    Tool, ToolContext, ToolDefinition, ToolError, ToolMetadata, ToolOutput, ToolRegistry,
    ToolResult, ToolSource,
};

use crate::bridge::ensure_payload;
use crate::custom::{CustomToolManager, base_name};

/// Keyword search over the registry.
pub const SEARCH_TOOLS: &str = "search_tools";
/// Full documentation of named tools.
pub const GET_TOOL_HELP: &str = "get_tool_help";
/// Validated single dispatch.
pub const USE_TOOL: &str = "use_tool";
/// Concurrent settle-all dispatch.
pub const BATCH_USE_TOOL: &str = "batch_use_tool";
/// Source inspection.
pub const INSPECT_TOOL_SOURCE: &str = "inspect_tool_source";

/// Base names of every meta-tool, all registered under `core`.
pub const META_TOOL_NAMES: [&str; 5] = [
    SEARCH_TOOLS,
    GET_TOOL_HELP,
    USE_TOOL,
    BATCH_USE_TOOL,
    INSPECT_TOOL_SOURCE,
];

/// Returns `true` when `definition` is one of the meta-tools.
#[must_use]
pub fn is_meta_tool(definition: &ToolDefinition) -> bool {
    let name = definition.name();
    name.namespace() == Some(ToolNamespace::Core) && META_TOOL_NAMES.contains(&name.base())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetaKind {
    Search,
    Help,
    Use,
    Batch,
    Inspect,
}

impl MetaKind {
    const ALL: [Self; 5] = [Self::Search, Self::Help, Self::Use, Self::Batch, Self::Inspect];

    fn definition(self) -> ToolResult<ToolDefinition> {
        let (base, description, parameters) = match self {
            Self::Search => (
                SEARCH_TOOLS,
                "Search available tools by keyword. Use query \"all\" to list every tool.",
                ParameterSchema::empty()
                    .property("query", "string", "Space separated keywords, or \"all\"", true)
                    .property("category", "string", "Only return tools in this category", false)
                    .property(
                        "include_params",
                        "boolean",
                        "Include parameter schemas (default true)",
                        false,
                    ),
            ),
            Self::Help => (
                GET_TOOL_HELP,
                "Show full documentation for one or more tools.",
                ParameterSchema::empty()
                    .property("tool_name", "string", "Tool to describe", false)
                    .raw_property(
                        "tool_names",
                        json!({
                            "type": "array",
                            "items": { "type": "string" },
                            "description": "Several tools to describe"
                        }),
                        false,
                    ),
            ),
            Self::Use => (
                USE_TOOL,
                "Invoke a tool by name after validating its arguments.",
                ParameterSchema::empty()
                    .property("tool_name", "string", "Tool to invoke", true)
                    .property("arguments", "object", "Arguments for the tool", false),
            ),
            Self::Batch => (
                BATCH_USE_TOOL,
                "Invoke several tools concurrently. Every call runs to completion and reports its own result.",
                ParameterSchema::empty().raw_property(
                    "calls",
                    json!({
                        "type": "array",
                        "description": "Calls to run",
                        "items": {
                            "type": "object",
                            "properties": {
                                "tool_name": { "type": "string" },
                                "arguments": { "type": "object" }
                            },
                            "required": ["tool_name"]
                        }
                    }),
                    true,
                ),
            ),
            Self::Inspect => (
                INSPECT_TOOL_SOURCE,
                "Show the implementation of a tool. Custom tools return their code and metadata.",
                ParameterSchema::empty().property("tool_name", "string", "Tool to inspect", true),
            ),
        };
        Ok(ToolDefinition::new(QualifiedName::core(base)?, description)?
            .with_parameters(parameters)
            .with_category("meta")
            .with_workflow_usable(false))
    }
}

struct MetaShared {
    registry: Weak<ToolRegistry>,
    limits: Limits,
    numeric_caps: Vec<NumericCap>,
    manager: Option<Arc<CustomToolManager>>,
}

/// Installs the meta-tools into a registry.
pub struct MetaTools {
    registry: Arc<ToolRegistry>,
    limits: Limits,
    numeric_caps: Vec<NumericCap>,
    manager: Option<Arc<CustomToolManager>>,
}

impl std::fmt::Debug for MetaTools {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetaTools")
            .field("limits", &self.limits)
            .field("numeric_caps", &self.numeric_caps)
            .finish_non_exhaustive()
    }
}

impl MetaTools {
    /// Targets `registry` with default limits and caps.
    #[must_use]
    pub fn new(registry: &Arc<ToolRegistry>) -> Self {
        Self {
            registry: Arc::clone(registry),
            limits: Limits::default(),
            numeric_caps: default_numeric_caps(),
            manager: None,
        }
    }

    /// Overrides the dispatch limits.
    #[must_use]
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Overrides the numeric caps.
    #[must_use]
    pub fn with_numeric_caps(mut self, caps: Vec<NumericCap>) -> Self {
        self.numeric_caps = caps;
        self
    }

    /// Lets `inspect_tool_source` read custom tool records.
    #[must_use]
    pub fn with_manager(mut self, manager: Arc<CustomToolManager>) -> Self {
        self.manager = Some(manager);
        self
    }

    /// Registers the five meta-tools under `core`.
    ///
    /// The tools hold a weak reference to the registry, so they stop working
    /// once the registry is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::DuplicateTool`] if a meta-tool name is taken.
    pub fn register(self) -> ToolResult<()> {
        let shared = Arc::new(MetaShared {
            registry: Arc::downgrade(&self.registry),
            limits: self.limits,
            numeric_caps: self.numeric_caps,
            manager: self.manager,
        });
        for kind in MetaKind::ALL {
            self.registry.register(
                kind.definition()?,
                MetaTool {
                    kind,
                    shared: Arc::clone(&shared),
                },
                ToolMetadata::built_in(),
            )?;
        }
        debug!(count = MetaKind::ALL.len(), "registered meta-tools");
        Ok(())
    }
}

/// Definitions of the meta-tools, as registered by [`MetaTools::register`].
///
/// # Errors
///
/// Never fails for the built-in names; the `Result` mirrors definition
/// construction.
pub fn meta_tool_definitions() -> ToolResult<Vec<ToolDefinition>> {
    MetaKind::ALL.iter().map(|kind| kind.definition()).collect()
}

struct MetaTool {
    kind: MetaKind,
    shared: Arc<MetaShared>,
}

#[async_trait]
impl Tool for MetaTool {
    async fn invoke(&self, args: Value, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let Some(registry) = self.shared.registry.upgrade() else {
            return Err(ToolError::execution("tool registry is no longer available"));
        };
        let result = match self.kind {
            MetaKind::Search => self.search(&registry, args),
            MetaKind::Help => self.help(&registry, args),
            MetaKind::Use => self.use_tool(&registry, args, ctx).await,
            MetaKind::Batch => self.batch(&registry, args, ctx).await,
            MetaKind::Inspect => self.inspect(&registry, args, ctx).await,
        };
        Ok(result.unwrap_or_else(|err| {
            let help = self.kind.definition().map(|d| d.help_text()).ok();
            err.to_output(help.as_deref())
        }))
    }
}

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default = "default_true")]
    include_params: bool,
}

#[derive(Deserialize)]
struct HelpArgs {
    #[serde(default)]
    tool_name: Option<String>,
    #[serde(default)]
    tool_names: Vec<String>,
}

#[derive(Deserialize)]
struct CallArgs {
    tool_name: String,
    #[serde(default, alias = "args")]
    arguments: Value,
}

#[derive(Deserialize)]
struct BatchArgs {
    calls: Vec<Value>,
}

#[derive(Deserialize)]
struct InspectArgs {
    tool_name: String,
}

fn default_true() -> bool {
    true
}

fn parse_args<T: for<'de> Deserialize<'de>>(tool: &str, args: Value) -> ToolResult<T> {
    serde_json::from_value(args)
        .map_err(|err| ToolError::validation(format!("invalid arguments for {tool}: {err}")))
}

impl MetaTool {
    fn suggest(&self, registry: &ToolRegistry, name: &str) -> Vec<String> {
        registry.suggest(name, self.shared.limits.max_suggestions)
    }

    fn not_found(&self, registry: &ToolRegistry, name: &str) -> ToolError {
        ToolError::NotFound {
            name: name.to_owned(),
            suggestions: self.suggest(registry, name),
        }
    }

    fn search(&self, registry: &ToolRegistry, args: Value) -> ToolResult<ToolOutput> {
        let args: SearchArgs = parse_args(SEARCH_TOOLS, args)?;
        let query = args.query.trim().to_lowercase();
        if query.is_empty() {
            return Err(ToolError::validation(
                "query is empty; pass keywords or \"all\"",
            ));
        }
        let everything = query == "all" || query == "*";
        let tokens: Vec<&str> = query.split_whitespace().collect();

        let tools: Vec<Value> = registry
            .get_definitions()
            .iter()
            .filter(|definition| !is_meta_tool(definition))
            .filter(|definition| match &args.category {
                Some(category) => definition
                    .category()
                    .is_some_and(|c| c.eq_ignore_ascii_case(category.trim())),
                None => true,
            })
            .filter(|definition| {
                if everything {
                    return true;
                }
                let blob = definition.search_blob();
                tokens.iter().all(|token| blob.contains(token))
            })
            .map(|definition| {
                let mut entry = Map::new();
                entry.insert("name".into(), Value::from(definition.name().to_string()));
                entry.insert("description".into(), Value::from(definition.description()));
                if let Some(category) = definition.category() {
                    entry.insert("category".into(), Value::from(category));
                }
                if args.include_params {
                    entry.insert("parameters".into(), definition.parameters().to_value());
                }
                Value::Object(entry)
            })
            .collect();

        debug!(query = %args.query, matches = tools.len(), "searched tools");
        let nothing = tools.is_empty();
        let mut payload = json!({
            "query": args.query,
            "count": tools.len(),
            "tools": tools,
        });
        if nothing {
            payload["hint"] = Value::from(
                "No tools matched. Try fewer keywords or search_tools with query \"all\".",
            );
        }
        Ok(ToolOutput::success(payload))
    }

    fn help(&self, registry: &ToolRegistry, args: Value) -> ToolResult<ToolOutput> {
        let args: HelpArgs = parse_args(GET_TOOL_HELP, args)?;
        let mut names = args.tool_names;
        if let Some(name) = args.tool_name {
            names.insert(0, name);
        }
        if names.is_empty() {
            return Err(ToolError::validation("provide tool_name or tool_names"));
        }

        let mut documented = Vec::new();
        let mut unknown = Vec::new();
        for name in &names {
            match registry.get_definition(name) {
                Some(definition) => documented.push(json!({
                    "name": definition.name().to_string(),
                    "help": definition.help_text(),
                })),
                None => unknown.push(json!({
                    "name": name,
                    "suggestions": self.suggest(registry, name),
                })),
            }
        }

        let all_unknown = documented.is_empty();
        let payload = json!({ "tools": documented, "unknown": unknown });
        Ok(if all_unknown {
            ToolOutput::error(payload)
        } else {
            ToolOutput::success(payload)
        })
    }

    async fn use_tool(
        &self,
        registry: &ToolRegistry,
        args: Value,
        ctx: &ToolContext,
    ) -> ToolResult<ToolOutput> {
        let call: CallArgs = parse_args(USE_TOOL, args)?;
        Ok(self.dispatch(registry, call, ctx).await)
    }

    async fn batch(
        &self,
        registry: &ToolRegistry,
        args: Value,
        ctx: &ToolContext,
    ) -> ToolResult<ToolOutput> {
        let BatchArgs { calls } = parse_args(BATCH_USE_TOOL, args)?;
        let limit = self.shared.limits.max_batch_calls;
        if calls.is_empty() {
            return Err(ToolError::validation("calls is empty; provide at least one call"));
        }
        if calls.len() > limit {
            return Err(ToolError::validation(format!(
                "{} calls exceed the batch limit of {limit}; split them into smaller batches",
                calls.len()
            )));
        }

        let total = calls.len();
        let outcomes = join_all(calls.into_iter().map(|entry| async move {
            let name = entry.get("tool_name").cloned().unwrap_or(Value::Null);
            match parse_args::<CallArgs>(BATCH_USE_TOOL, entry) {
                Ok(call) => (name, self.dispatch(registry, call, ctx).await),
                Err(err) => {
                    let help = MetaKind::Use.definition().map(|d| d.help_text()).ok();
                    (name, err.to_output(help.as_deref()))
                }
            }
        }))
        .await;

        let mut success_count = 0_usize;
        let results: Vec<Value> = outcomes
            .into_iter()
            .map(|(name, output)| {
                if output.is_error {
                    json!({ "tool_name": name, "success": false, "error": output.content })
                } else {
                    success_count += 1;
                    json!({ "tool_name": name, "success": true, "result": output.content })
                }
            })
            .collect();
        let failure_count = total - success_count;
        debug!(total, success_count, failure_count, "batch finished");

        let payload = json!({
            "successCount": success_count,
            "failureCount": failure_count,
            "results": results,
        });
        Ok(if success_count == 0 {
            ToolOutput::error(payload)
        } else {
            ToolOutput::success(payload)
        })
    }

    async fn inspect(
        &self,
        registry: &ToolRegistry,
        args: Value,
        ctx: &ToolContext,
    ) -> ToolResult<ToolOutput> {
        let InspectArgs { tool_name } = parse_args(INSPECT_TOOL_SOURCE, args)?;
        let handle = registry.get(&tool_name);

        let custom_base = match &handle {
            Some(handle) if handle.metadata().source() == ToolSource::Custom => {
                Some(handle.definition().name().base().to_owned())
            }
            Some(_) => None,
            None => Some(base_name(&tool_name).to_owned()),
        };
        if let (Some(base), Some(manager)) = (custom_base, &self.shared.manager)
            && let Some(tool) = manager.get(&base).await?
            && tool.visible_to(ctx.user_id())
        {
            return Ok(ToolOutput::success(json!({
                "name": format!("custom.{}", tool.name),
                "source": "custom",
                "language": "javascript",
                "code": tool.code,
                "description": tool.description,
                "parameters": tool.parameters.to_value(),
                "permissions": tool.permissions.tags(),
                "status": tool.status,
                "requiresApproval": tool.requires_approval,
                "createdBy": tool.created_by,
                "category": tool.category,
                "version": tool.version,
                "usageCount": tool.usage_count,
            })));
        }

        let Some(handle) = handle else {
            return Err(self.not_found(registry, &tool_name));
        };
        let name = handle.definition().name().to_string();
        Ok(ToolOutput::success(match handle.source_text() {
            Some(source) => json!({
                "name": name,
                "source": handle.metadata().source(),
                "code": source,
            }),
            None => json!({
                "name": name,
                "source": handle.metadata().source(),
                "code": Value::Null,
                "note": "source code is not available for this tool",
            }),
        }))
    }

    /// Full `use_tool` pipeline for one call. Never fails: every problem is
    /// rendered into the returned output.
    async fn dispatch(&self, registry: &ToolRegistry, call: CallArgs, ctx: &ToolContext) -> ToolOutput {
        let CallArgs {
            tool_name,
            arguments,
        } = call;

        let Some(definition) = registry.get_definition(&tool_name) else {
            return self.not_found(registry, &tool_name).to_output(None);
        };
        if is_meta_tool(&definition) {
            return ToolError::validation(format!(
                "`{tool_name}` is a meta-tool; call it directly instead of through use_tool"
            ))
            .to_output(None);
        }
        let help = definition.help_text();

        let mut arguments = match arguments {
            Value::Null => Value::Object(Map::new()),
            Value::Object(map) => Value::Object(map),
            other => {
                return ToolError::validation(format!(
                    "arguments must be a JSON object, got {other}"
                ))
                .to_output(Some(&help));
            }
        };

        let missing = definition.parameters().missing_required(&arguments);
        if !missing.is_empty() {
            return ToolError::validation(format!(
                "missing required parameter(s): {}",
                missing.join(", ")
            ))
            .to_output(Some(&help));
        }
        if let Err(err) = ensure_payload(&arguments, self.shared.limits.max_argument_chars) {
            return err.to_output(Some(&help));
        }
        apply_numeric_caps(&definition, &self.shared.numeric_caps, &mut arguments);

        let qualified = definition.name().to_string();
        match registry.execute(&qualified, arguments, ctx).await {
            Ok(output) => output,
            Err(err) => err.to_output(Some(&help)),
        }
    }
}

/// Clamps numeric arguments the target declares to their configured cap.
fn apply_numeric_caps(definition: &ToolDefinition, caps: &[NumericCap], arguments: &mut Value) {
    let Value::Object(map) = arguments else {
        return;
    };
    let qualified = definition.name().to_string();
    let base = definition.name().base();
    for cap in caps {
        if !(cap.applies_to(&qualified) || cap.applies_to(base))
            || !definition.parameters().properties().contains_key(&cap.parameter)
        {
            continue;
        }
        let Some(value) = map.get_mut(&cap.parameter) else {
            continue;
        };
        #[allow(clippy::cast_precision_loss)]
        let exceeds = value.as_f64().is_some_and(|n| n > cap.max as f64);
        if exceeds {
            debug!(tool = %qualified, parameter = %cap.parameter, max = cap.max, "clamped numeric argument");
            *value = Value::from(cap.max);
        }
    }
}
