//! Model-facing error taxonomy.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::tool::ToolOutput;

/// Result alias for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;

/// Errors produced by registration, dispatch and custom tool management.
///
/// Every variant renders to a message an automated caller can act on: unknown
/// names carry suggestions and validation failures carry remediation text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    /// Requested tool does not exist.
    #[error("tool `{name}` not found. {}", render_suggestions(suggestions))]
    NotFound {
        /// Name as requested by the caller.
        name: String,
        /// Closest registered names, best first.
        suggestions: Vec<String>,
    },

    /// Arguments or tool fields failed validation.
    #[error("validation failed: {message}")]
    Validation {
        /// Problems found, with remediation hints.
        message: String,
    },

    /// Serialized arguments exceed the size limit.
    #[error("arguments are {size} characters, exceeding the {limit} character limit; send less data per call")]
    PayloadTooLarge {
        /// Serialized size of the rejected arguments.
        size: usize,
        /// Configured maximum.
        limit: usize,
    },

    /// The tool requests dangerous permissions and has not been approved.
    #[error("tool `{name}` is pending approval and cannot run until a user approves it")]
    ApprovalRequired {
        /// Tool name.
        name: String,
        /// Identifier of the pending record.
        tool_id: String,
    },

    /// The model attempted to modify or delete a user-created tool.
    #[error("tool `{name}` was created by a user and is protected from modification by the assistant")]
    Protected {
        /// Tool name.
        name: String,
    },

    /// The tool exists but is switched off.
    #[error("tool `{name}` is disabled; enable it before use")]
    Disabled {
        /// Tool name.
        name: String,
    },

    /// The tool body failed at runtime.
    #[error("tool execution failed: {reason}")]
    Execution {
        /// Underlying error message.
        reason: String,
    },

    /// Tool name collided with an existing registration.
    #[error("tool `{name}` is already registered")]
    DuplicateTool {
        /// Name of the offending tool.
        name: String,
    },

    /// Tool definition failed validation at registration.
    #[error("invalid tool definition: {reason}")]
    InvalidDefinition {
        /// Human-readable reason for rejection.
        reason: String,
    },
}

impl ToolError {
    /// Creates an execution error from the supplied reason.
    #[must_use]
    pub fn execution(reason: impl Into<String>) -> Self {
        Self::Execution {
            reason: reason.into(),
        }
    }

    /// Creates a validation error from the supplied message.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a not-found error without suggestions.
    #[must_use]
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            name: name.into(),
            suggestions: Vec::new(),
        }
    }

    /// Stable snake-case identifier of the variant.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Validation { .. } => "validation_error",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::ApprovalRequired { .. } => "approval_required",
            Self::Protected { .. } => "protected",
            Self::Disabled { .. } => "disabled",
            Self::Execution { .. } => "execution_error",
            Self::DuplicateTool { .. } => "duplicate_tool",
            Self::InvalidDefinition { .. } => "invalid_definition",
        }
    }

    /// Suggestions attached to a not-found error.
    #[must_use]
    pub fn suggestions(&self) -> &[String] {
        match self {
            Self::NotFound { suggestions, .. } => suggestions,
            _ => &[],
        }
    }

    /// Renders the error as a model-facing failure payload.
    ///
    /// The payload always carries `error` (the variant kind) and `message`;
    /// not-found errors add `suggestions` and `help` is appended when given.
    #[must_use]
    pub fn to_output(&self, help: Option<&str>) -> ToolOutput {
        let mut payload = Map::new();
        payload.insert("error".into(), Value::from(self.kind()));
        payload.insert("message".into(), Value::from(self.to_string()));
        if let Self::NotFound { suggestions, .. } = self {
            payload.insert("suggestions".into(), Value::from(suggestions.clone()));
        }
        if let Some(help) = help {
            payload.insert("help".into(), Value::from(help));
        }
        ToolOutput::error(Value::Object(payload))
    }
}

impl From<agent_primitives::Error> for ToolError {
    fn from(err: agent_primitives::Error) -> Self {
        Self::Validation {
            message: err.to_string(),
        }
    }
}

fn render_suggestions(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        "Use search_tools to discover available tools.".to_owned()
    } else {
        format!("Did you mean: {}?", suggestions.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_lists_suggestions() {
        let err = ToolError::NotFound {
            name: "reed_file".into(),
            suggestions: vec!["core.read_file".into(), "core.write_file".into()],
        };
        let message = err.to_string();
        assert!(message.contains("Did you mean: core.read_file, core.write_file?"));
        assert_eq!(err.kind(), "not_found");
        assert_eq!(err.suggestions().len(), 2);
    }

    #[test]
    fn not_found_without_suggestions_points_to_search() {
        let message = ToolError::not_found("zzz").to_string();
        assert!(message.contains("search_tools"));
    }

    #[test]
    fn renders_structured_output() {
        let err = ToolError::NotFound {
            name: "x".into(),
            suggestions: vec!["core.y".into()],
        };
        let output = err.to_output(Some("usage"));
        assert!(output.is_error);
        assert_eq!(output.content["error"], "not_found");
        assert_eq!(output.content["suggestions"][0], "core.y");
        assert_eq!(output.content["help"], "usage");

        let output = ToolError::execution("boom").to_output(None);
        assert!(output.content.get("suggestions").is_none());
        assert!(output.content.get("help").is_none());
    }

    #[test]
    fn protected_mentions_protection() {
        let err = ToolError::Protected {
            name: "user_owned_tool".into(),
        };
        assert!(err.to_string().contains("protected"));
    }
}
