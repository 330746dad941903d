//! Model-facing tools for managing custom tools.
//!
//! These are ordinary registrations under `core`, discoverable through
//! `search_tools`. They always act as [`ToolAuthor::Llm`], so the model can
//! neither touch user-created tools nor approve its own gated tools. Results
//! carry a `success` flag and failures are error outputs, never `Err`.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use agent_primitives::{ParameterSchema, Permission, QualifiedName, ToolStatus};
use agent_store::{CustomTool, ToolAuthor, ToolFilter};
use agent_tools::{
    Tool, ToolContext, ToolDefinition, ToolError, ToolMetadata, ToolOutput, ToolRegistry,
    ToolResult,
};

use agent_tools::suggest::{MAX_SUGGESTIONS, suggest};

use crate::custom::{CreateToolInput, CustomToolManager, ToolPatch, base_name};

/// Base names of the management tools, registered under `core`.
pub const MANAGE_TOOL_NAMES: [&str; 5] = [
    "create_tool",
    "list_custom_tools",
    "update_custom_tool",
    "delete_custom_tool",
    "toggle_custom_tool",
];

#[derive(Debug, Clone, Copy)]
enum ManageKind {
    Create,
    List,
    Update,
    Delete,
    Toggle,
}

impl ManageKind {
    const ALL: [Self; 5] = [
        Self::Create,
        Self::List,
        Self::Update,
        Self::Delete,
        Self::Toggle,
    ];

    fn base(self) -> &'static str {
        match self {
            Self::Create => MANAGE_TOOL_NAMES[0],
            Self::List => MANAGE_TOOL_NAMES[1],
            Self::Update => MANAGE_TOOL_NAMES[2],
            Self::Delete => MANAGE_TOOL_NAMES[3],
            Self::Toggle => MANAGE_TOOL_NAMES[4],
        }
    }

    fn definition(self) -> ToolResult<ToolDefinition> {
        let permissions = json!({
            "type": "array",
            "items": { "type": "string", "enum": Permission::ALL.map(Permission::as_str) },
            "description": permissions_help(),
        });
        let (description, parameters) = match self {
            Self::Create => (
                "Create a reusable custom tool from JavaScript code. Tools requesting dangerous permissions wait for user approval.",
                ParameterSchema::empty()
                    .property("name", "string", "Lowercase name with letters, digits and underscores", true)
                    .property("description", "string", "What the tool does", true)
                    .property("code", "string", "JavaScript body; arguments are available as `args`", true)
                    .property("parameters", "object", "JSON schema of the arguments (type object)", false)
                    .property("category", "string", "Optional category", false)
                    .raw_property("permissions", permissions.clone(), false),
            ),
            Self::List => (
                "List custom tools, optionally filtered by status.",
                ParameterSchema::empty().raw_property(
                    "status",
                    json!({
                        "type": "string",
                        "enum": ["active", "pending_approval", "disabled"],
                        "description": "Only list tools in this status"
                    }),
                    false,
                ),
            ),
            Self::Update => (
                "Update fields of a custom tool created by the assistant.",
                ParameterSchema::empty()
                    .property("name", "string", "Tool to update", true)
                    .property("description", "string", "New description", false)
                    .property("code", "string", "New JavaScript body", false)
                    .property("parameters", "object", "New argument schema", false)
                    .property("category", "string", "New category", false)
                    .raw_property("permissions", permissions, false),
            ),
            Self::Delete => (
                "Permanently delete a custom tool created by the assistant.",
                ParameterSchema::empty()
                    .property("name", "string", "Tool to delete", true)
                    .property("confirm", "boolean", "Must be true", true),
            ),
            Self::Toggle => (
                "Enable or disable a custom tool.",
                ParameterSchema::empty()
                    .property("name", "string", "Tool to toggle", true)
                    .property("enabled", "boolean", "true to enable, false to disable", true),
            ),
        };
        Ok(ToolDefinition::new(QualifiedName::core(self.base())?, description)?
            .with_parameters(parameters)
            .with_category("custom_tools")
            .with_workflow_usable(false))
    }
}

/// Registers the management tools under `core`.
///
/// # Errors
///
/// Returns [`ToolError::DuplicateTool`] if a name is already taken.
pub fn register_manage_tools(
    registry: &ToolRegistry,
    manager: &Arc<CustomToolManager>,
) -> ToolResult<()> {
    for kind in ManageKind::ALL {
        registry.register(
            kind.definition()?,
            ManageTool {
                kind,
                manager: Arc::clone(manager),
            },
            ToolMetadata::built_in(),
        )?;
    }
    Ok(())
}

struct ManageTool {
    kind: ManageKind,
    manager: Arc<CustomToolManager>,
}

#[async_trait]
impl Tool for ManageTool {
    async fn invoke(&self, args: Value, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let result = match self.kind {
            ManageKind::Create => self.create(args, ctx).await,
            ManageKind::List => self.list(&args, ctx).await,
            ManageKind::Update => self.update(args, ctx).await,
            ManageKind::Delete => self.delete(&args, ctx).await,
            ManageKind::Toggle => self.toggle(&args, ctx).await,
        };
        Ok(result.unwrap_or_else(|err| failure(&err)))
    }
}

#[derive(Deserialize)]
struct UpdateArgs {
    name: String,
    #[serde(flatten)]
    patch: ToolPatch,
}

impl ManageTool {
    async fn create(&self, args: Value, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let mut input: CreateToolInput = serde_json::from_value(args)
            .map_err(|err| ToolError::validation(format!("invalid arguments for create_tool: {err}")))?;
        input.owner = ctx.user_id().map(str::to_owned);

        let outcome = self.manager.create(input, ToolAuthor::Llm).await?;
        let tool = &outcome.tool;
        let qualified = format!("custom.{}", tool.name);
        let message = if outcome.requires_approval() {
            format!(
                "Tool `{qualified}` was created and is waiting for user approval. It cannot run until approved."
            )
        } else {
            format!("Tool `{qualified}` is active. Call it with use_tool.")
        };

        let mut payload = json!({
            "success": true,
            "name": qualified,
            "status": tool.status,
            "toolId": tool.id.to_string(),
            "requiresApproval": outcome.requires_approval(),
            "message": message,
            "risk": outcome.risk,
        });
        if let Some(pending) = outcome.pending_tool_id() {
            payload["pendingToolId"] = Value::from(pending);
        }
        Ok(ToolOutput::success(payload))
    }

    async fn list(&self, args: &Value, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let mut filter = ToolFilter::all();
        if let Some(user) = ctx.user_id() {
            filter = filter.visible_to(user);
        }
        match args.get("status") {
            None | Some(Value::Null) => {}
            Some(Value::String(raw)) => {
                let status = ToolStatus::from_str(raw).map_err(|_| {
                    ToolError::validation(format!(
                        "unknown status `{raw}`; use active, pending_approval or disabled"
                    ))
                })?;
                filter = filter.with_status(status);
            }
            Some(other) => {
                return Err(ToolError::validation(format!(
                    "status must be a string, got {other}"
                )));
            }
        }

        let tools = self.manager.list(&filter).await?;
        let entries: Vec<Value> = tools.iter().map(summary).collect();
        Ok(ToolOutput::success(json!({
            "success": true,
            "count": entries.len(),
            "tools": entries,
        })))
    }

    async fn update(&self, args: Value, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let UpdateArgs { name, patch } = serde_json::from_value(args).map_err(|err| {
            ToolError::validation(format!("invalid arguments for update_custom_tool: {err}"))
        })?;
        self.ensure_visible(&name, ctx).await?;

        let outcome = self.manager.update(&name, patch, ToolAuthor::Llm).await?;
        let message = if outcome.changed.is_empty() {
            "Nothing changed.".to_owned()
        } else if outcome.tool.status == ToolStatus::PendingApproval {
            format!(
                "Updated {}. The tool now waits for user approval.",
                outcome.changed.join(", ")
            )
        } else {
            format!("Updated {}.", outcome.changed.join(", "))
        };
        Ok(ToolOutput::success(json!({
            "success": true,
            "name": format!("custom.{}", outcome.tool.name),
            "changed": outcome.changed,
            "version": outcome.tool.version,
            "status": outcome.tool.status,
            "message": message,
        })))
    }

    async fn delete(&self, args: &Value, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let name = required_str(args, "name")?;
        let confirm = args.get("confirm").and_then(Value::as_bool).unwrap_or(false);
        self.ensure_visible(name, ctx).await?;

        let tool = self.manager.delete(name, confirm, ToolAuthor::Llm).await?;
        Ok(ToolOutput::success(json!({
            "success": true,
            "message": format!("Deleted custom tool `{}`.", tool.name),
        })))
    }

    async fn toggle(&self, args: &Value, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let name = required_str(args, "name")?;
        let Some(enabled) = args.get("enabled").and_then(Value::as_bool) else {
            return Err(ToolError::validation(
                "enabled must be a JSON boolean (true or false), not a string or number",
            ));
        };
        self.ensure_visible(name, ctx).await?;

        let tool = self.manager.toggle(name, enabled, ToolAuthor::Llm).await?;
        Ok(ToolOutput::success(json!({
            "success": true,
            "name": format!("custom.{}", tool.name),
            "status": tool.status,
        })))
    }

    /// Hides other users' tools behind a not-found error.
    ///
    /// Suggestions only name tools the caller can see.
    async fn ensure_visible(&self, name: &str, ctx: &ToolContext) -> ToolResult<()> {
        if let Some(tool) = self.manager.get(name).await?
            && tool.visible_to(ctx.user_id())
        {
            return Ok(());
        }
        let visible = self.manager.list(&ToolFilter::all()).await?;
        let candidates = visible
            .iter()
            .filter(|tool| tool.visible_to(ctx.user_id()))
            .map(|tool| tool.name.as_str());
        Err(ToolError::NotFound {
            name: name.to_owned(),
            suggestions: suggest(base_name(name), candidates, MAX_SUGGESTIONS),
        })
    }
}

/// Permission documentation derived from the whitelist.
fn permissions_help() -> String {
    let names = |dangerous: bool| {
        Permission::ALL
            .iter()
            .filter(|p| p.is_dangerous() == dangerous)
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!(
        "Sandbox permissions. Run immediately: {}. Require user approval: {}.",
        names(false),
        names(true)
    )
}

fn required_str<'a>(args: &'a Value, key: &str) -> ToolResult<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::validation(format!("`{key}` is required and must be a string")))
}

fn summary(tool: &CustomTool) -> Value {
    json!({
        "name": format!("custom.{}", tool.name),
        "description": tool.description,
        "status": tool.status,
        "createdBy": tool.created_by,
        "permissions": tool.permissions.tags(),
        "category": tool.category,
        "version": tool.version,
        "usageCount": tool.usage_count,
    })
}

fn failure(err: &ToolError) -> ToolOutput {
    let mut payload = json!({
        "success": false,
        "error": err.to_string(),
        "kind": err.kind(),
    });
    if !err.suggestions().is_empty() {
        payload["suggestions"] = Value::from(err.suggestions().to_vec());
    }
    if let ToolError::ApprovalRequired { tool_id, .. } = err {
        payload["pendingToolId"] = Value::from(tool_id.as_str());
    }
    ToolOutput::error(payload)
}
