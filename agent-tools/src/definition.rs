//! Model-facing tool descriptions and registry metadata.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use agent_primitives::{ParameterSchema, QualifiedName};

use crate::error::{ToolError, ToolResult};

/// Description of a tool as presented to the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    name: QualifiedName,
    description: String,
    parameters: ParameterSchema,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    category: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tags: Vec<String>,
    #[serde(default = "default_true")]
    workflow_usable: bool,
}

const fn default_true() -> bool {
    true
}

impl ToolDefinition {
    /// Creates a definition with an empty parameter schema.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidDefinition`] if the description is blank.
    pub fn new(name: QualifiedName, description: impl Into<String>) -> ToolResult<Self> {
        let description = description.into();
        if description.trim().is_empty() {
            return Err(ToolError::InvalidDefinition {
                reason: format!("tool `{name}` needs a description"),
            });
        }
        Ok(Self {
            name,
            description,
            parameters: ParameterSchema::empty(),
            category: None,
            tags: Vec::new(),
            workflow_usable: true,
        })
    }

    /// Sets the argument schema.
    #[must_use]
    pub fn with_parameters(mut self, parameters: ParameterSchema) -> Self {
        self.parameters = parameters;
        self
    }

    /// Sets the category label.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Sets search tags.
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Marks whether workflow builders may use the tool.
    #[must_use]
    pub fn with_workflow_usable(mut self, usable: bool) -> Self {
        self.workflow_usable = usable;
        self
    }

    /// Qualified name.
    #[must_use]
    pub fn name(&self) -> &QualifiedName {
        &self.name
    }

    /// Description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Argument schema.
    #[must_use]
    pub fn parameters(&self) -> &ParameterSchema {
        &self.parameters
    }

    /// Category label, if any.
    #[must_use]
    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    /// Search tags.
    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Whether workflow builders may use the tool.
    #[must_use]
    pub fn workflow_usable(&self) -> bool {
        self.workflow_usable
    }

    /// First line of the description prefixed with the name.
    #[must_use]
    pub fn summary(&self) -> String {
        let first = self.description.lines().next().unwrap_or_default();
        format!("{}: {first}", self.name)
    }

    /// Full parameter documentation.
    #[must_use]
    pub fn help_text(&self) -> String {
        let mut out = format!("Tool: {}\nDescription: {}\n", self.name, self.description);
        if let Some(category) = &self.category {
            let _ = writeln!(out, "Category: {category}");
        }
        let properties = self.parameters.properties();
        if properties.is_empty() {
            out.push_str("Parameters: none\n");
            return out;
        }
        out.push_str("Parameters:\n");
        for (name, schema) in properties {
            let kind = schema.get("type").and_then(Value::as_str).unwrap_or("any");
            let requirement = if self.parameters.is_required(name) {
                "required"
            } else {
                "optional"
            };
            let _ = write!(out, "  - {name} ({kind}, {requirement})");
            if let Some(description) = schema.get("description").and_then(Value::as_str) {
                let _ = write!(out, ": {description}");
            }
            if let Some(values) = schema.get("enum").and_then(Value::as_array) {
                let rendered: Vec<String> = values.iter().map(Value::to_string).collect();
                let _ = write!(out, " [one of {}]", rendered.join(", "));
            }
            out.push('\n');
        }
        out
    }

    /// Lowercased text searched by `search_tools`.
    #[must_use]
    pub fn search_blob(&self) -> String {
        let mut blob = format!(
            "{} {} {}",
            self.name.base(),
            self.name,
            self.description
        );
        if let Some(category) = &self.category {
            blob.push(' ');
            blob.push_str(category);
        }
        for tag in &self.tags {
            blob.push(' ');
            blob.push_str(tag);
        }
        blob.to_lowercase()
    }
}

/// Where a registered tool comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolSource {
    /// Shipped with the runtime.
    BuiltIn,
    /// Contributed by a plugin.
    Plugin,
    /// User or model authored, executed in the sandbox.
    Custom,
    /// Bridged from an external protocol server.
    Mcp,
    /// Contributed by an extension package.
    Extension,
}

/// How much the runtime trusts a tool's executor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    /// Runtime code.
    Trusted,
    /// Third-party code running in process.
    SemiTrusted,
    /// Code executed through the sandbox.
    Sandboxed,
}

/// Provenance attached to a registration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolMetadata {
    source: ToolSource,
    trust_level: TrustLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    provider: Option<String>,
}

impl Default for ToolMetadata {
    fn default() -> Self {
        Self::built_in()
    }
}

impl ToolMetadata {
    /// Metadata with an explicit source and trust level.
    #[must_use]
    pub fn new(source: ToolSource, trust_level: TrustLevel) -> Self {
        Self {
            source,
            trust_level,
            provider: None,
        }
    }

    /// Trusted built-in tool.
    #[must_use]
    pub fn built_in() -> Self {
        Self::new(ToolSource::BuiltIn, TrustLevel::Trusted)
    }

    /// Sandboxed custom tool.
    #[must_use]
    pub fn custom() -> Self {
        Self::new(ToolSource::Custom, TrustLevel::Sandboxed)
    }

    /// Sets the provider name.
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Source of the tool.
    #[must_use]
    pub const fn source(&self) -> ToolSource {
        self.source
    }

    /// Trust level of the executor.
    #[must_use]
    pub const fn trust_level(&self) -> TrustLevel {
        self.trust_level
    }

    /// Provider name, if any.
    #[must_use]
    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }
}
