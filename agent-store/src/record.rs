//! Persisted custom tool records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use agent_primitives::{CustomToolId, ParameterSchema, PermissionSet, ToolStatus};

/// Who authored a custom tool, and who is acting on one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolAuthor {
    /// A human user through the management surface.
    User,
    /// The language model through the model-facing tools.
    Llm,
}

impl ToolAuthor {
    /// Wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Llm => "llm",
        }
    }
}

/// A user- or model-authored tool whose code runs inside the sandbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomTool {
    /// Stable identifier.
    pub id: CustomToolId,
    /// Unique lowercase name.
    pub name: String,
    /// Model-facing description.
    pub description: String,
    /// Argument schema.
    pub parameters: ParameterSchema,
    /// Source code executed by the sandbox.
    pub code: String,
    /// Optional grouping label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Capabilities requested from the sandbox.
    #[serde(default)]
    pub permissions: PermissionSet,
    /// Whether the tool needed approval when last written.
    pub requires_approval: bool,
    /// Author of the tool.
    pub created_by: ToolAuthor,
    /// Approval status.
    pub status: ToolStatus,
    /// Number of completed executions.
    #[serde(default)]
    pub usage_count: u64,
    /// Monotonic revision, bumped on every update.
    pub version: u32,
    /// Free-form metadata such as `workflowUsable`.
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Optional owning user; `None` means visible to everyone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl CustomTool {
    /// Creates a fresh record at version 1 with zero usage.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ParameterSchema,
        code: impl Into<String>,
        created_by: ToolAuthor,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: CustomToolId::random(),
            name: name.into(),
            description: description.into(),
            parameters,
            code: code.into(),
            category: None,
            permissions: PermissionSet::default(),
            requires_approval: false,
            created_by,
            status: ToolStatus::Active,
            usage_count: 0,
            version: 1,
            metadata: Map::new(),
            owner: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns `true` if `user_id` may see this record.
    #[must_use]
    pub fn visible_to(&self, user_id: Option<&str>) -> bool {
        match (&self.owner, user_id) {
            (None, _) => true,
            (Some(owner), Some(user)) => owner == user,
            (Some(_), None) => false,
        }
    }

    /// Reads `metadata.workflowUsable`, defaulting to `true`.
    #[must_use]
    pub fn workflow_usable(&self) -> bool {
        self.metadata
            .get("workflowUsable")
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }

    /// Returns an execution handle if and only if the tool is active.
    ///
    /// # Errors
    ///
    /// Returns the current status when the tool may not run.
    pub fn executable(&self) -> Result<ExecutableTool<'_>, ToolStatus> {
        if self.status.is_active() {
            Ok(ExecutableTool { tool: self })
        } else {
            Err(self.status)
        }
    }
}

/// Proof that a custom tool was active at the time it was read.
///
/// Only [`CustomTool::executable`] constructs this type, so sandbox entry
/// points that take it cannot be reached for pending or disabled tools.
#[derive(Debug, Clone, Copy)]
pub struct ExecutableTool<'a> {
    tool: &'a CustomTool,
}

impl ExecutableTool<'_> {
    /// Underlying record.
    #[must_use]
    pub fn record(&self) -> &CustomTool {
        self.tool
    }

    /// Tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.tool.name
    }

    /// Source code to execute.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.tool.code
    }

    /// Granted permissions.
    #[must_use]
    pub fn permissions(&self) -> &PermissionSet {
        &self.tool.permissions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> CustomTool {
        CustomTool::new(
            "get_weather",
            "Fetch weather",
            ParameterSchema::empty(),
            "return 1;",
            ToolAuthor::User,
        )
    }

    #[test]
    fn only_active_tools_are_executable() {
        let mut tool = sample();
        assert!(tool.executable().is_ok());

        tool.status = ToolStatus::PendingApproval;
        assert_eq!(tool.executable().unwrap_err(), ToolStatus::PendingApproval);

        tool.status = ToolStatus::Disabled;
        assert_eq!(tool.executable().unwrap_err(), ToolStatus::Disabled);
    }

    #[test]
    fn ownership_scopes_visibility() {
        let mut tool = sample();
        assert!(tool.visible_to(None));
        assert!(tool.visible_to(Some("alice")));

        tool.owner = Some("alice".into());
        assert!(tool.visible_to(Some("alice")));
        assert!(!tool.visible_to(Some("bob")));
        assert!(!tool.visible_to(None));
    }

    #[test]
    fn workflow_flag_defaults_to_true() {
        let mut tool = sample();
        assert!(tool.workflow_usable());
        tool.metadata.insert("workflowUsable".into(), json!(false));
        assert!(!tool.workflow_usable());
    }

    #[test]
    fn serializes_camel_case() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(value["createdBy"], json!("user"));
        assert_eq!(value["usageCount"], json!(0));
        assert_eq!(value["parameters"]["type"], json!("object"));
    }
}
