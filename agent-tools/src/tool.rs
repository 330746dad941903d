//! Executor trait and per-call context.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ToolError, ToolResult};
use crate::guard::PathGuard;

/// Value returned by a tool.
///
/// `is_error` marks a failure the tool reported as data, as opposed to a
/// [`ToolError`] raised by the dispatch path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolOutput {
    /// Result payload.
    pub content: Value,
    /// Whether the payload describes a failure.
    #[serde(default)]
    pub is_error: bool,
}

impl ToolOutput {
    /// Successful output.
    #[must_use]
    pub fn success(content: impl Into<Value>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    /// Failed output.
    #[must_use]
    pub fn error(content: impl Into<Value>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }

    /// Renders the payload as text, unquoting plain strings.
    #[must_use]
    pub fn text(&self) -> String {
        match &self.content {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

/// Caller information passed to every executor.
#[derive(Clone, Debug, Default)]
pub struct ToolContext {
    conversation_id: Option<String>,
    user_id: Option<String>,
    path_guard: Option<Arc<dyn PathGuard>>,
}

impl ToolContext {
    /// Empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the conversation id.
    #[must_use]
    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    /// Sets the requesting user.
    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Installs the path guard filesystem executors must consult.
    #[must_use]
    pub fn with_path_guard(mut self, guard: Arc<dyn PathGuard>) -> Self {
        self.path_guard = Some(guard);
        self
    }

    /// Conversation id, if known.
    #[must_use]
    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    /// Requesting user, if known.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Installed path guard, if any.
    #[must_use]
    pub fn path_guard(&self) -> Option<&Arc<dyn PathGuard>> {
        self.path_guard.as_ref()
    }

    /// Consults the path guard before a filesystem operation.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Execution`] when the guard refuses `path`.
    pub fn check_path(&self, path: &Path) -> ToolResult<()> {
        match &self.path_guard {
            Some(guard) => guard
                .check(path)
                .map_err(|denied| ToolError::execution(denied.to_string())),
            None => Ok(()),
        }
    }
}

/// Executor bound to a registered tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Runs the tool.
    async fn invoke(&self, args: Value, ctx: &ToolContext) -> ToolResult<ToolOutput>;

    /// Source text of the implementation, when it can be shown.
    fn source(&self) -> Option<String> {
        None
    }
}

#[async_trait]
impl<F, Fut> Tool for F
where
    F: Send + Sync + Fn(Value) -> Fut,
    Fut: Future<Output = ToolResult<Value>> + Send,
{
    async fn invoke(&self, args: Value, _ctx: &ToolContext) -> ToolResult<ToolOutput> {
        (self)(args).await.map(ToolOutput::success)
    }
}
