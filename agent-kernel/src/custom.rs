//! Lifecycle of user- and model-authored custom tools.
//!
//! Every write persists first and refreshes the shared [`SandboxCache`]
//! second, under one writer lock, so a cache lookup anywhere in the process
//! observes the committed state once a call returns.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use agent_policy::{ApprovalPolicy, CodeLanguage, CodeValidator, CodeViolation, RiskAnalysis};
use agent_primitives::{
    MAX_PERMISSIONS, ParameterSchema, Permission, PermissionSet, QualifiedName, StatusEvent,
    ToolStatus, validate_custom_name,
};
use agent_store::{CustomTool, CustomToolRepository, StoreError, ToolAuthor, ToolFilter};
use agent_tools::suggest::{MAX_SUGGESTIONS, suggest};
use agent_tools::{SandboxCache, SandboxProgram, ToolDefinition, ToolError, ToolResult};

/// Longest accepted description.
pub const MAX_DESCRIPTION_LEN: usize = 2_000;
/// Longest accepted code body.
pub const MAX_CODE_LEN: usize = 50_000;
/// Longest accepted category label.
pub const MAX_CATEGORY_LEN: usize = 50;
/// Category reported for tools that have none.
pub const DEFAULT_CATEGORY: &str = "custom";

/// Language custom tool bodies are written in.
pub const TOOL_LANGUAGE: CodeLanguage = CodeLanguage::JavaScript;

/// Fields accepted by [`CustomToolManager::create`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateToolInput {
    /// Unique lowercase name.
    pub name: String,
    /// Model-facing description.
    pub description: String,
    /// Schema as a JSON object or as JSON text.
    #[serde(default)]
    pub parameters: Value,
    /// Program body.
    pub code: String,
    /// Optional category.
    #[serde(default)]
    pub category: Option<String>,
    /// Permission tags.
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Requests approval even without dangerous permissions.
    #[serde(default, alias = "requires_approval")]
    pub requires_approval: bool,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Owning user.
    #[serde(default)]
    pub owner: Option<String>,
}

impl CreateToolInput {
    /// Input with the mandatory fields set.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Value::Null,
            code: code.into(),
            ..Self::default()
        }
    }

    /// Sets the parameter schema.
    #[must_use]
    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    /// Sets permission tags.
    #[must_use]
    pub fn with_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions = permissions.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the category.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Sets the owner.
    #[must_use]
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }
}

/// Partial update accepted by [`CustomToolManager::update`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolPatch {
    /// New description.
    #[serde(default)]
    pub description: Option<String>,
    /// New schema, as object or JSON text.
    #[serde(default)]
    pub parameters: Option<Value>,
    /// New program body.
    #[serde(default)]
    pub code: Option<String>,
    /// New category.
    #[serde(default)]
    pub category: Option<String>,
    /// New permission tags.
    #[serde(default)]
    pub permissions: Option<Vec<String>>,
    /// New metadata, replacing the old map.
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

impl ToolPatch {
    /// Returns `true` when no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.description.is_none()
            && self.parameters.is_none()
            && self.code.is_none()
            && self.category.is_none()
            && self.permissions.is_none()
            && self.metadata.is_none()
    }
}

/// Result of a successful create.
#[derive(Debug, Clone)]
pub struct CreateOutcome {
    /// Persisted record.
    pub tool: CustomTool,
    /// Static risk verdict of the body.
    pub risk: RiskAnalysis,
}

impl CreateOutcome {
    /// Whether the tool waits for approval.
    #[must_use]
    pub fn requires_approval(&self) -> bool {
        self.tool.status == ToolStatus::PendingApproval
    }

    /// Id to hand to an approval UI, when approval is pending.
    #[must_use]
    pub fn pending_tool_id(&self) -> Option<String> {
        self.requires_approval().then(|| self.tool.id.to_string())
    }
}

/// Result of a successful update.
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    /// Persisted record.
    pub tool: CustomTool,
    /// Names of the fields whose value changed.
    pub changed: Vec<&'static str>,
}

/// Owns validation, approval gating and persistence of custom tools.
pub struct CustomToolManager {
    repository: Arc<dyn CustomToolRepository>,
    cache: Arc<SandboxCache>,
    validator: CodeValidator,
    policy: ApprovalPolicy,
    writer: Mutex<()>,
}

impl std::fmt::Debug for CustomToolManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomToolManager")
            .field("cache", &self.cache)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl CustomToolManager {
    /// Creates a manager over the supplied store and shared cache.
    #[must_use]
    pub fn new(repository: Arc<dyn CustomToolRepository>, cache: Arc<SandboxCache>) -> Self {
        Self {
            repository,
            cache,
            validator: CodeValidator::new(),
            policy: ApprovalPolicy::new(),
            writer: Mutex::new(()),
        }
    }

    /// Replaces the approval policy.
    #[must_use]
    pub fn with_policy(mut self, policy: ApprovalPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replaces the code validator.
    #[must_use]
    pub fn with_validator(mut self, validator: CodeValidator) -> Self {
        self.validator = validator;
        self
    }

    /// Underlying repository.
    #[must_use]
    pub fn repository(&self) -> &Arc<dyn CustomToolRepository> {
        &self.repository
    }

    /// Shared sandbox cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<SandboxCache> {
        &self.cache
    }

    /// Validates and persists a new tool.
    ///
    /// Tools whose permissions or body need approval are stored as
    /// `pending_approval` and are not loaded into the sandbox.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Validation`] listing every problem found, or
    /// [`ToolError::Execution`] when the store fails.
    pub async fn create(&self, input: CreateToolInput, author: ToolAuthor) -> ToolResult<CreateOutcome> {
        let mut problems = Vec::new();

        if let Err(err) = validate_custom_name(&input.name) {
            problems.push(err.to_string());
        }
        check_description(&input.description, &mut problems);
        let code_clean = check_code(&input.code, &self.validator, &mut problems);
        if let Some(category) = &input.category {
            check_category(category, &mut problems);
        }
        let parameters = parse_parameters(&input.parameters, &mut problems);
        let permissions = parse_permissions(&input.permissions, &mut problems);

        let (decision, risk) = self.policy.evaluate(&permissions, &input.code, TOOL_LANGUAGE);
        if decision.is_deny() && code_clean {
            problems.extend(decision.reasons().iter().cloned());
        }

        if problems.is_empty()
            && self
                .repository
                .get_by_name(&input.name)
                .await
                .map_err(storage_error)?
                .is_some()
        {
            problems.push(format!(
                "a custom tool named `{}` already exists; choose another name or update it",
                input.name
            ));
        }
        reject_if_any("custom tool", &problems)?;

        let requires_approval = input.requires_approval || decision.requires_approval();
        let mut tool = CustomTool::new(
            input.name,
            input.description,
            parameters,
            input.code,
            author,
        );
        tool.category = input.category;
        tool.permissions = permissions;
        tool.requires_approval = requires_approval;
        tool.status = ToolStatus::initial(requires_approval);
        tool.metadata = input.metadata;
        tool.owner = input.owner;

        let _writer = self.writer.lock().await;
        let tool = self.repository.create(tool).await.map_err(storage_error)?;
        self.refresh_cache(&tool);
        info!(
            tool = %tool.name,
            status = %tool.status,
            created_by = tool.created_by.as_str(),
            risk = risk.level.as_str(),
            "created custom tool"
        );
        Ok(CreateOutcome { tool, risk })
    }

    /// Applies a partial update.
    ///
    /// Every successful update bumps the version. Gaining a dangerous
    /// permission, or a body that now needs approval, sends the tool back to
    /// `pending_approval`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Validation`] for an empty patch or invalid fields,
    /// [`ToolError::NotFound`] for unknown tools, [`ToolError::Protected`]
    /// when the model edits a user's tool, or [`ToolError::Execution`] when
    /// the store fails.
    pub async fn update(
        &self,
        name: &str,
        patch: ToolPatch,
        actor: ToolAuthor,
    ) -> ToolResult<UpdateOutcome> {
        if patch.is_empty() {
            return Err(ToolError::validation(
                "no fields to update; provide at least one of description, parameters, code, category, permissions, metadata",
            ));
        }

        let _writer = self.writer.lock().await;
        let mut tool = self.require(name).await?;
        ensure_may_modify(&tool, actor)?;

        let mut problems = Vec::new();
        if let Some(description) = &patch.description {
            check_description(description, &mut problems);
        }
        if let Some(code) = &patch.code {
            check_code(code, &self.validator, &mut problems);
        }
        if let Some(category) = &patch.category {
            check_category(category, &mut problems);
        }
        let parameters = patch
            .parameters
            .as_ref()
            .map(|value| parse_parameters(value, &mut problems));
        let permissions = patch
            .permissions
            .as_ref()
            .map(|tags| parse_permissions(tags, &mut problems));
        reject_if_any("update", &problems)?;

        let mut changed = Vec::new();
        if let Some(description) = patch.description
            && description != tool.description
        {
            tool.description = description;
            changed.push("description");
        }
        if let Some(parameters) = parameters
            && parameters != tool.parameters
        {
            tool.parameters = parameters;
            changed.push("parameters");
        }
        if let Some(code) = patch.code
            && code != tool.code
        {
            tool.code = code;
            changed.push("code");
        }
        if let Some(category) = patch.category
            && tool.category.as_deref() != Some(category.as_str())
        {
            tool.category = Some(category);
            changed.push("category");
        }
        let previous_dangerous = tool.permissions.dangerous();
        if let Some(permissions) = permissions
            && permissions != tool.permissions
        {
            tool.permissions = permissions;
            changed.push("permissions");
        }
        if let Some(metadata) = patch.metadata
            && metadata != tool.metadata
        {
            tool.metadata = metadata;
            changed.push("metadata");
        }

        if changed.is_empty() {
            return Ok(UpdateOutcome { tool, changed });
        }

        if changed.iter().any(|field| matches!(*field, "code" | "permissions")) {
            let (decision, _risk) =
                self.policy
                    .evaluate(&tool.permissions, &tool.code, TOOL_LANGUAGE);
            if decision.is_deny() {
                reject_if_any("update", decision.reasons())?;
            }
            let gained_dangerous = tool
                .permissions
                .dangerous()
                .iter()
                .any(|permission| !previous_dangerous.contains(permission));
            let newly_required = decision.requires_approval() && !tool.requires_approval;
            if gained_dangerous || newly_required {
                tool.requires_approval = true;
                if tool.status != ToolStatus::Disabled {
                    tool.status = ToolStatus::PendingApproval;
                }
                info!(tool = %tool.name, "update requires approval again");
            }
        }

        tool.version = tool.version.saturating_add(1);
        let tool = self.repository.update(tool).await.map_err(storage_error)?;
        self.refresh_cache(&tool);
        debug!(tool = %tool.name, version = tool.version, ?changed, "updated custom tool");
        Ok(UpdateOutcome { tool, changed })
    }

    /// Deletes a tool.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Validation`] without confirmation,
    /// [`ToolError::NotFound`] for unknown tools, [`ToolError::Protected`]
    /// when the model deletes a user's tool, or [`ToolError::Execution`] when
    /// the store fails.
    pub async fn delete(&self, name: &str, confirm: bool, actor: ToolAuthor) -> ToolResult<CustomTool> {
        if !confirm {
            return Err(ToolError::validation(format!(
                "deleting `{name}` is permanent; call again with confirm set to true"
            )));
        }

        let _writer = self.writer.lock().await;
        let tool = self.require(name).await?;
        ensure_may_modify(&tool, actor)?;

        self.repository.delete(tool.id).await.map_err(storage_error)?;
        self.cache.remove(&tool.name);
        info!(tool = %tool.name, actor = actor.as_str(), "deleted custom tool");
        Ok(tool)
    }

    /// Enables or disables a tool.
    ///
    /// Enabling a pending tool approves it and disabling it rejects it.
    /// Repeating the current state is a no-op. The model can never enable a
    /// tool that needs approval.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::NotFound`] for unknown tools,
    /// [`ToolError::Protected`] when the model toggles a user's tool,
    /// [`ToolError::ApprovalRequired`] when the model tries to enable a gated
    /// tool, or [`ToolError::Execution`] when the store fails.
    pub async fn toggle(&self, name: &str, enabled: bool, actor: ToolAuthor) -> ToolResult<CustomTool> {
        let _writer = self.writer.lock().await;
        let tool = self.require(name).await?;
        ensure_may_modify(&tool, actor)?;

        let event = match (tool.status, enabled) {
            (ToolStatus::PendingApproval, true) => StatusEvent::Approve,
            (ToolStatus::PendingApproval, false) => StatusEvent::Reject,
            (_, true) => StatusEvent::Enable,
            (_, false) => StatusEvent::Disable,
        };

        if actor == ToolAuthor::Llm
            && enabled
            && !tool.status.is_active()
            && (tool.requires_approval || tool.status == ToolStatus::PendingApproval)
        {
            return Err(ToolError::ApprovalRequired {
                name: tool.name,
                tool_id: tool.id.to_string(),
            });
        }

        self.transition(tool, event).await
    }

    /// Approves a pending tool.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Validation`] when the tool is not pending.
    pub async fn approve(&self, name: &str) -> ToolResult<CustomTool> {
        let _writer = self.writer.lock().await;
        let tool = self.require(name).await?;
        self.transition(tool, StatusEvent::Approve).await
    }

    /// Rejects a pending tool, leaving it disabled.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Validation`] when the tool is not pending.
    pub async fn reject(&self, name: &str) -> ToolResult<CustomTool> {
        let _writer = self.writer.lock().await;
        let tool = self.require(name).await?;
        self.transition(tool, StatusEvent::Reject).await
    }

    /// Fetches a tool by name.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Execution`] when the store fails.
    pub async fn get(&self, name: &str) -> ToolResult<Option<CustomTool>> {
        self.repository
            .get_by_name(base_name(name))
            .await
            .map_err(storage_error)
    }

    /// Lists tools matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Execution`] when the store fails.
    pub async fn list(&self, filter: &ToolFilter) -> ToolResult<Vec<CustomTool>> {
        self.repository.list(filter).await.map_err(storage_error)
    }

    /// Active tools visible to `user_id`, as model-facing definitions.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Execution`] when the store fails.
    pub async fn list_active_definitions(
        &self,
        user_id: Option<&str>,
    ) -> ToolResult<Vec<ToolDefinition>> {
        let mut filter = ToolFilter::all().with_status(ToolStatus::Active);
        if let Some(user) = user_id {
            filter = filter.visible_to(user);
        }
        let tools = self.list(&filter).await?;
        let mut definitions = Vec::with_capacity(tools.len());
        for tool in &tools {
            match definition_for(tool) {
                Ok(definition) => definitions.push(definition),
                Err(err) => warn!(tool = %tool.name, %err, "skipping unlistable custom tool"),
            }
        }
        Ok(definitions)
    }

    /// Loads every active tool into the sandbox cache.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Execution`] when the store fails.
    pub async fn warm_cache(&self) -> ToolResult<usize> {
        let _writer = self.writer.lock().await;
        let tools = self
            .list(&ToolFilter::all().with_status(ToolStatus::Active))
            .await?;
        for tool in &tools {
            self.refresh_cache(tool);
        }
        Ok(tools.len())
    }

    async fn transition(&self, mut tool: CustomTool, event: StatusEvent) -> ToolResult<CustomTool> {
        let next = tool.status.transition(event).map_err(|_| {
            ToolError::validation(format!(
                "tool `{}` is {} and cannot be {}",
                tool.name,
                tool.status,
                event_verb(event)
            ))
        })?;
        if next == tool.status {
            return Ok(tool);
        }

        let previous = tool.status;
        tool.status = next;
        let tool = self.repository.update(tool).await.map_err(storage_error)?;
        self.refresh_cache(&tool);
        info!(tool = %tool.name, from = %previous, to = %tool.status, "custom tool status changed");
        Ok(tool)
    }

    async fn require(&self, name: &str) -> ToolResult<CustomTool> {
        let base = base_name(name);
        if let Some(tool) = self
            .repository
            .get_by_name(base)
            .await
            .map_err(storage_error)?
        {
            return Ok(tool);
        }
        let known = self.list(&ToolFilter::all()).await?;
        Err(ToolError::NotFound {
            name: name.to_owned(),
            suggestions: suggest(base, known.iter().map(|t| t.name.as_str()), MAX_SUGGESTIONS),
        })
    }

    fn refresh_cache(&self, tool: &CustomTool) {
        match tool.executable() {
            Ok(executable) => {
                self.cache.sync(executable.name(), program_for(tool));
            }
            Err(_) => {
                self.cache.remove(&tool.name);
            }
        }
    }
}

/// Snapshot of a record as a sandbox program.
#[must_use]
pub fn program_for(tool: &CustomTool) -> SandboxProgram {
    SandboxProgram {
        tool_id: tool.id,
        code: Arc::from(tool.code.as_str()),
        permissions: tool.permissions.clone(),
        version: tool.version,
    }
}

/// Model-facing definition of a custom tool, under the `custom` namespace.
///
/// # Errors
///
/// Returns [`ToolError::InvalidDefinition`] if the stored record is unusable.
pub fn definition_for(tool: &CustomTool) -> ToolResult<ToolDefinition> {
    let name = QualifiedName::custom(tool.name.as_str())
        .map_err(|err| ToolError::InvalidDefinition {
            reason: err.to_string(),
        })?;
    Ok(ToolDefinition::new(name, tool.description.as_str())?
        .with_parameters(tool.parameters.clone())
        .with_category(tool.category.as_deref().unwrap_or(DEFAULT_CATEGORY))
        .with_tags(["custom".to_owned()])
        .with_workflow_usable(tool.workflow_usable()))
}

/// Strips a `custom.` prefix.
#[must_use]
pub fn base_name(name: &str) -> &str {
    name.strip_prefix("custom.").unwrap_or(name)
}

fn ensure_may_modify(tool: &CustomTool, actor: ToolAuthor) -> ToolResult<()> {
    if actor == ToolAuthor::Llm && tool.created_by == ToolAuthor::User {
        warn!(tool = %tool.name, "model attempted to modify a user-created tool");
        return Err(ToolError::Protected {
            name: tool.name.clone(),
        });
    }
    Ok(())
}

fn check_description(description: &str, problems: &mut Vec<String>) {
    if description.trim().is_empty() {
        problems.push("description is required".into());
    } else if description.chars().count() > MAX_DESCRIPTION_LEN {
        problems.push(format!(
            "description must be at most {MAX_DESCRIPTION_LEN} characters"
        ));
    }
}

/// Returns `false` when the body contains forbidden constructs.
fn check_code(code: &str, validator: &CodeValidator, problems: &mut Vec<String>) -> bool {
    if code.trim().is_empty() {
        problems.push("code is required".into());
        return true;
    }
    if code.chars().count() > MAX_CODE_LEN {
        problems.push(format!("code must be at most {MAX_CODE_LEN} characters"));
    }
    let violations = validator.scan(code);
    problems.extend(violations.iter().map(CodeViolation::message));
    violations.is_empty()
}

fn check_category(category: &str, problems: &mut Vec<String>) {
    if category.chars().count() > MAX_CATEGORY_LEN {
        problems.push(format!(
            "category must be at most {MAX_CATEGORY_LEN} characters"
        ));
    }
}

fn parse_parameters(value: &Value, problems: &mut Vec<String>) -> ParameterSchema {
    let parsed = match value {
        Value::Null => return ParameterSchema::empty(),
        Value::String(text) => ParameterSchema::parse(text),
        other => ParameterSchema::from_value(other.clone()),
    };
    parsed.unwrap_or_else(|err| {
        match err {
            agent_primitives::Error::InvalidSchema { problems: found } => problems.extend(found),
            other => problems.push(other.to_string()),
        }
        ParameterSchema::empty()
    })
}

fn parse_permissions(tags: &[String], problems: &mut Vec<String>) -> PermissionSet {
    if tags.len() > MAX_PERMISSIONS {
        problems.push(format!(
            "at most {MAX_PERMISSIONS} permissions may be requested"
        ));
    }
    PermissionSet::parse_tags(tags).unwrap_or_else(|unknown| {
        let allowed: Vec<&str> = Permission::ALL.iter().map(|p| p.as_str()).collect();
        problems.push(format!(
            "unknown permission(s): {}; allowed: {}",
            unknown.join(", "),
            allowed.join(", ")
        ));
        PermissionSet::new()
    })
}

fn reject_if_any(subject: &str, problems: &[String]) -> ToolResult<()> {
    if problems.is_empty() {
        return Ok(());
    }
    let mut message = format!("invalid {subject}:");
    for problem in problems {
        message.push_str("\n- ");
        message.push_str(problem);
    }
    Err(ToolError::validation(message))
}

fn event_verb(event: StatusEvent) -> &'static str {
    match event {
        StatusEvent::Approve => "approved",
        StatusEvent::Reject => "rejected",
        StatusEvent::Enable => "enabled",
        StatusEvent::Disable => "disabled",
    }
}

pub(crate) fn storage_error(err: StoreError) -> ToolError {
    match err {
        StoreError::Conflict { name } => ToolError::validation(format!(
            "a custom tool named `{name}` already exists; choose another name or update it"
        )),
        other => ToolError::execution(format!("storage error: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use agent_policy::RiskLevel;
    use agent_store::InMemoryToolRepository;
    use agent_tools::{FnRuntime, SandboxRequest};
    use serde_json::json;

    fn manager() -> CustomToolManager {
        let runtime = Arc::new(FnRuntime::new(|_: SandboxRequest<'_>| Ok(Value::Null)));
        CustomToolManager::new(
            Arc::new(InMemoryToolRepository::new()),
            Arc::new(SandboxCache::new(runtime)),
        )
    }

    fn weather() -> CreateToolInput {
        CreateToolInput::new("get_weather", "Fetch the weather", "return { temp: 21 };")
            .with_parameters(json!({
                "type": "object",
                "properties": { "city": { "type": "string" } },
                "required": ["city"]
            }))
    }

    #[tokio::test]
    async fn safe_tool_is_active_and_cached() {
        let manager = manager();
        let outcome = manager.create(weather(), ToolAuthor::User).await.unwrap();
        assert_eq!(outcome.tool.status, ToolStatus::Active);
        assert!(!outcome.tool.requires_approval);
        assert!(!outcome.requires_approval());
        assert!(outcome.pending_tool_id().is_none());
        assert!(manager.cache().contains("get_weather"));
    }

    #[tokio::test]
    async fn dangerous_tool_waits_for_approval() {
        let manager = manager();
        let input = CreateToolInput::new("run_shell", "Run a command", "return args.cmd;")
            .with_permissions(["shell"]);
        let outcome = manager.create(input, ToolAuthor::Llm).await.unwrap();
        assert_eq!(outcome.tool.status, ToolStatus::PendingApproval);
        assert!(outcome.tool.requires_approval);
        assert_eq!(outcome.pending_tool_id(), Some(outcome.tool.id.to_string()));
        assert!(!manager.cache().contains("run_shell"));

        let approved = manager.toggle("run_shell", true, ToolAuthor::User).await.unwrap();
        assert_eq!(approved.status, ToolStatus::Active);
        assert!(manager.cache().contains("run_shell"));
    }

    #[tokio::test]
    async fn invalid_names_mention_lowercase() {
        let manager = manager();
        for name in ["GetWeather", "get-weather"] {
            let mut input = weather();
            input.name = name.into();
            let err = manager.create(input, ToolAuthor::User).await.unwrap_err();
            assert!(err.to_string().contains("lowercase"), "{err}");
        }
    }

    #[tokio::test]
    async fn problems_are_aggregated() {
        let manager = manager();
        let input = CreateToolInput {
            name: "Bad-Name".into(),
            description: String::new(),
            parameters: json!({"type": "array"}),
            code: "process.exit(1)".into(),
            category: Some("c".repeat(MAX_CATEGORY_LEN + 1)),
            permissions: vec!["root".into()],
            ..CreateToolInput::default()
        };
        let err = manager.create(input, ToolAuthor::User).await.unwrap_err();
        let ToolError::Validation { message } = err else {
            panic!("expected validation error");
        };
        for needle in ["lowercase", "description", "category", "parameters.type", "root", "forbidden"] {
            assert!(message.contains(needle), "missing {needle} in {message}");
        }
    }

    #[tokio::test]
    async fn forbidden_code_is_rejected_on_update_too() {
        let manager = manager();
        manager.create(weather(), ToolAuthor::User).await.unwrap();
        let patch = ToolPatch {
            code: Some("const cp = require('child_process');".into()),
            ..ToolPatch::default()
        };
        let err = manager
            .update("get_weather", patch, ToolAuthor::User)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Validation { .. }));
    }

    #[tokio::test]
    async fn duplicate_names_are_rejected() {
        let manager = manager();
        manager.create(weather(), ToolAuthor::User).await.unwrap();
        let err = manager.create(weather(), ToolAuthor::User).await.unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[tokio::test]
    async fn update_reports_changed_fields_and_bumps_version() {
        let manager = manager();
        manager.create(weather(), ToolAuthor::Llm).await.unwrap();

        let err = manager
            .update("get_weather", ToolPatch::default(), ToolAuthor::Llm)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Validation { .. }));

        let patch = ToolPatch {
            description: Some("Fetch current weather".into()),
            category: Some("weather".into()),
            ..ToolPatch::default()
        };
        let outcome = manager
            .update("custom.get_weather", patch, ToolAuthor::Llm)
            .await
            .unwrap();
        assert_eq!(outcome.changed, vec!["description", "category"]);
        assert_eq!(outcome.tool.version, 2);
    }

    #[tokio::test]
    async fn gaining_dangerous_permission_requires_approval_again() {
        let manager = manager();
        manager.create(weather(), ToolAuthor::User).await.unwrap();
        let patch = ToolPatch {
            permissions: Some(vec!["filesystem".into()]),
            ..ToolPatch::default()
        };
        let outcome = manager
            .update("get_weather", patch, ToolAuthor::User)
            .await
            .unwrap();
        assert_eq!(outcome.tool.status, ToolStatus::PendingApproval);
        assert!(!manager.cache().contains("get_weather"));
    }

    #[tokio::test]
    async fn model_cannot_touch_user_tools() {
        let manager = manager();
        manager.create(weather(), ToolAuthor::User).await.unwrap();

        let err = manager
            .delete("get_weather", true, ToolAuthor::Llm)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Protected { .. }));

        let patch = ToolPatch {
            description: Some("hijacked".into()),
            ..ToolPatch::default()
        };
        let err = manager
            .update("get_weather", patch, ToolAuthor::Llm)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Protected { .. }));
    }

    #[tokio::test]
    async fn delete_requires_confirmation() {
        let manager = manager();
        manager.create(weather(), ToolAuthor::Llm).await.unwrap();
        let err = manager
            .delete("get_weather", false, ToolAuthor::Llm)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("confirm"));

        manager
            .delete("get_weather", true, ToolAuthor::Llm)
            .await
            .unwrap();
        assert!(manager.get("get_weather").await.unwrap().is_none());
        assert!(!manager.cache().contains("get_weather"));

        let err = manager
            .delete("get_weather", true, ToolAuthor::Llm)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound { .. }));
    }

    #[tokio::test]
    async fn toggle_is_idempotent_and_refreshes_cache() {
        let manager = manager();
        manager.create(weather(), ToolAuthor::Llm).await.unwrap();

        let off = manager.toggle("get_weather", false, ToolAuthor::Llm).await.unwrap();
        assert_eq!(off.status, ToolStatus::Disabled);
        assert!(!manager.cache().contains("get_weather"));

        let again = manager.toggle("get_weather", false, ToolAuthor::Llm).await.unwrap();
        assert_eq!(again.status, ToolStatus::Disabled);

        let on = manager.toggle("get_weather", true, ToolAuthor::Llm).await.unwrap();
        assert_eq!(on.status, ToolStatus::Active);
        assert!(manager.cache().contains("get_weather"));

        let err = manager.toggle("nope", true, ToolAuthor::User).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound { .. }));
    }

    #[tokio::test]
    async fn model_cannot_toggle_user_tools() {
        let manager = manager();
        manager.create(weather(), ToolAuthor::User).await.unwrap();

        let err = manager.toggle("get_weather", false, ToolAuthor::Llm).await.unwrap_err();
        assert!(matches!(err, ToolError::Protected { .. }));
        let stored = manager.get("get_weather").await.unwrap().unwrap();
        assert_eq!(stored.status, ToolStatus::Active);
        assert!(manager.cache().contains("get_weather"));

        let off = manager.toggle("get_weather", false, ToolAuthor::User).await.unwrap();
        assert_eq!(off.status, ToolStatus::Disabled);
    }

    #[tokio::test]
    async fn risky_code_without_permissions_stays_active() {
        let manager = manager();
        let input = CreateToolInput::new("calc", "Evaluate an expression", "return eval(args.expr);");
        let outcome = manager.create(input, ToolAuthor::User).await.unwrap();
        assert_eq!(outcome.tool.status, ToolStatus::Active);
        assert!(!outcome.requires_approval());
        assert!(outcome.pending_tool_id().is_none());
        assert_eq!(outcome.risk.level, RiskLevel::High);
    }

    #[tokio::test]
    async fn model_cannot_self_approve() {
        let manager = manager();
        let input = CreateToolInput::new("run_shell", "Run a command", "return 1;")
            .with_permissions(["shell"]);
        manager.create(input, ToolAuthor::Llm).await.unwrap();

        let err = manager.toggle("run_shell", true, ToolAuthor::Llm).await.unwrap_err();
        assert!(matches!(err, ToolError::ApprovalRequired { .. }));

        let rejected = manager.reject("run_shell").await.unwrap();
        assert_eq!(rejected.status, ToolStatus::Disabled);
        assert!(manager.approve("run_shell").await.is_err());
    }

    #[tokio::test]
    async fn active_definitions_respect_owner_and_defaults() {
        let manager = manager();
        manager.create(weather(), ToolAuthor::User).await.unwrap();
        manager
            .create(
                CreateToolInput::new("private_tool", "Mine", "return 1;").with_owner("alice"),
                ToolAuthor::User,
            )
            .await
            .unwrap();
        manager
            .create(
                CreateToolInput::new("gated", "Gated", "return 1;").with_permissions(["local"]),
                ToolAuthor::User,
            )
            .await
            .unwrap();

        let for_bob = manager.list_active_definitions(Some("bob")).await.unwrap();
        let names: Vec<String> = for_bob.iter().map(|d| d.name().to_string()).collect();
        assert_eq!(names, vec!["custom.get_weather"]);
        assert_eq!(for_bob[0].category(), Some(DEFAULT_CATEGORY));
        assert!(for_bob[0].workflow_usable());

        let for_alice = manager.list_active_definitions(Some("alice")).await.unwrap();
        assert_eq!(for_alice.len(), 2);
    }

    #[tokio::test]
    async fn raw_json_parameters_are_accepted() {
        let manager = manager();
        let input = CreateToolInput::new("echo_text", "Echo", "return args;").with_parameters(
            Value::String(r#"{"type":"object","properties":{"text":{"type":"string"}}}"#.into()),
        );
        let outcome = manager.create(input, ToolAuthor::Llm).await.unwrap();
        assert!(outcome.tool.parameters.properties().contains_key("text"));
    }
}
