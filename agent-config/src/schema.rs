//! Strongly typed configuration schema.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use agent_telemetry::LoggingConfig;

use crate::error::{ConfigError, ConfigResult};

/// Root configuration for the tool runtime.
///
/// Every section is optional. An absent `numeric_caps` key keeps the default
/// caps; an explicit empty list disables them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolkitConfig {
    /// Dispatch and sandbox limits.
    pub limits: Limits,
    /// Numeric argument clamps applied by `use_tool`.
    pub numeric_caps: Vec<NumericCap>,
    /// Directories executors must never touch.
    pub path_guard: PathGuardConfig,
    /// Logging setup.
    pub logging: LoggingConfig,
}

/// Hard limits enforced by the meta-tools and the execution bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum serialized size of one call's arguments, in characters.
    pub max_argument_chars: usize,
    /// Maximum number of calls in one batch.
    pub max_batch_calls: usize,
    /// Maximum fuzzy suggestions attached to a not-found error.
    pub max_suggestions: usize,
    /// Audit records retained per tool.
    pub audit_window: usize,
    /// Upper bound on one sandbox execution, in milliseconds.
    pub sandbox_timeout_ms: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_argument_chars: 100_000,
            max_batch_calls: 20,
            max_suggestions: 5,
            audit_window: 100,
            sandbox_timeout_ms: 30_000,
        }
    }
}

impl Limits {
    /// Sandbox timeout as a [`Duration`].
    #[must_use]
    pub const fn sandbox_timeout(&self) -> Duration {
        Duration::from_millis(self.sandbox_timeout_ms)
    }
}

/// Upper bound applied to a numeric argument before dispatch.
///
/// A cap only applies when the target tool's schema declares `parameter`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumericCap {
    /// Restricts the cap to one tool; `None` applies it to every tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// Argument name.
    pub parameter: String,
    /// Largest value forwarded to the tool.
    pub max: u64,
}

impl NumericCap {
    /// Cap applying to every tool declaring `parameter`.
    #[must_use]
    pub fn global(parameter: impl Into<String>, max: u64) -> Self {
        Self {
            tool: None,
            parameter: parameter.into(),
            max,
        }
    }

    /// Cap applying to one tool only.
    #[must_use]
    pub fn for_tool(tool: impl Into<String>, parameter: impl Into<String>, max: u64) -> Self {
        Self {
            tool: Some(tool.into()),
            parameter: parameter.into(),
            max,
        }
    }

    /// Returns `true` when the cap targets `tool`.
    #[must_use]
    pub fn applies_to(&self, tool: &str) -> bool {
        self.tool.as_deref().is_none_or(|target| target == tool)
    }
}

/// Default numeric caps: unbounded page sizes are clamped to 100.
#[must_use]
pub fn default_numeric_caps() -> Vec<NumericCap> {
    vec![
        NumericCap::global("limit", 100),
        NumericCap::global("max_results", 100),
    ]
}

/// Install-directory protection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathGuardConfig {
    /// Roots whose subtrees are off limits.
    pub protected_roots: Vec<PathBuf>,
}

impl Default for ToolkitConfig {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            numeric_caps: default_numeric_caps(),
            path_guard: PathGuardConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ToolkitConfig {
    /// Rejects values that would make the runtime unusable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> ConfigResult<()> {
        let checks: [(&'static str, bool); 5] = [
            ("limits.max_argument_chars", self.limits.max_argument_chars > 0),
            ("limits.max_batch_calls", self.limits.max_batch_calls > 0),
            ("limits.max_suggestions", self.limits.max_suggestions > 0),
            ("limits.audit_window", self.limits.audit_window > 0),
            ("limits.sandbox_timeout_ms", self.limits.sandbox_timeout_ms > 0),
        ];
        if let Some((field, _)) = checks.into_iter().find(|(_, ok)| !ok) {
            return Err(ConfigError::Invalid {
                field,
                reason: "must be greater than zero".into(),
            });
        }

        if self.numeric_caps.iter().any(|cap| cap.parameter.is_empty()) {
            return Err(ConfigError::Invalid {
                field: "numeric_caps.parameter",
                reason: "parameter name cannot be empty".into(),
            });
        }

        if let Some(root) = self
            .path_guard
            .protected_roots
            .iter()
            .find(|root| !root.is_absolute())
        {
            return Err(ConfigError::Invalid {
                field: "path_guard.protected_roots",
                reason: format!("{} is not an absolute path", root.display()),
            });
        }
        Ok(())
    }
}
