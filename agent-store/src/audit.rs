//! Execution audit trail retained in bounded per-tool rings.

use std::collections::{HashMap, VecDeque};
use std::num::NonZeroUsize;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use agent_primitives::CustomToolId;

use crate::error::StoreResult;

/// Placeholder written in place of secret argument values.
pub const REDACTED: &str = "[REDACTED]";

const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "passwd",
    "secret",
    "token",
    "api_key",
    "apikey",
    "authorization",
    "credential",
];
const MAX_STRING_CHARS: usize = 256;
const MAX_SUMMARY_CHARS: usize = 512;

/// Result of one audited execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AuditOutcome {
    /// The tool returned a value.
    Success {
        /// Truncated rendering of the result.
        summary: String,
    },
    /// The tool or sandbox reported an error.
    Failure {
        /// Error message.
        error: String,
    },
}

impl AuditOutcome {
    /// Builds a success outcome from a result value.
    #[must_use]
    pub fn success(result: &Value) -> Self {
        Self::Success {
            summary: truncate(&result.to_string(), MAX_SUMMARY_CHARS),
        }
    }

    /// Builds a failure outcome.
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self::Failure {
            error: truncate(&error.into(), MAX_SUMMARY_CHARS),
        }
    }

    /// Returns `true` for [`AuditOutcome::Success`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// One sandbox execution of a custom tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionAuditRecord {
    id: Uuid,
    tool_name: String,
    tool_id: CustomToolId,
    arguments: Value,
    #[serde(flatten)]
    outcome: AuditOutcome,
    duration_ms: u64,
    timestamp: DateTime<Utc>,
}

impl ExecutionAuditRecord {
    /// Captures an execution, redacting and truncating the arguments.
    #[must_use]
    pub fn new(
        tool_name: impl Into<String>,
        tool_id: CustomToolId,
        arguments: &Value,
        outcome: AuditOutcome,
        duration: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tool_name: tool_name.into(),
            tool_id,
            arguments: redact_arguments(arguments),
            outcome,
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            timestamp: Utc::now(),
        }
    }

    /// Unique record identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Name of the executed tool.
    #[must_use]
    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    /// Identifier of the executed tool.
    #[must_use]
    pub fn tool_id(&self) -> CustomToolId {
        self.tool_id
    }

    /// Redacted argument snapshot.
    #[must_use]
    pub fn arguments(&self) -> &Value {
        &self.arguments
    }

    /// Execution outcome.
    #[must_use]
    pub fn outcome(&self) -> &AuditOutcome {
        &self.outcome
    }

    /// Wall-clock duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    /// Time the record was captured.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Sink for execution audit records.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Appends a record.
    async fn append(&self, record: ExecutionAuditRecord) -> StoreResult<()>;

    /// Returns up to `limit` most recent records for `tool`, oldest first.
    async fn recent(&self, tool: &str, limit: usize) -> StoreResult<Vec<ExecutionAuditRecord>>;
}

/// Configuration for [`InMemoryAuditLog`].
#[derive(Debug, Clone, Copy)]
pub struct AuditConfig {
    window: NonZeroUsize,
}

impl AuditConfig {
    /// Creates a configuration keeping `window` records per tool.
    #[must_use]
    pub const fn new(window: NonZeroUsize) -> Self {
        Self { window }
    }

    /// Records retained per tool.
    #[must_use]
    pub const fn window(self) -> NonZeroUsize {
        self.window
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            window: NonZeroUsize::new(100).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

/// Audit log keeping the most recent records of each tool in memory.
#[derive(Debug)]
pub struct InMemoryAuditLog {
    config: AuditConfig,
    rings: RwLock<HashMap<String, VecDeque<ExecutionAuditRecord>>>,
}

impl Default for InMemoryAuditLog {
    fn default() -> Self {
        Self::new(AuditConfig::default())
    }
}

impl InMemoryAuditLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new(config: AuditConfig) -> Self {
        Self {
            config,
            rings: RwLock::new(HashMap::new()),
        }
    }

    /// Returns utilisation statistics.
    pub async fn stats(&self) -> AuditStats {
        let guard = self.rings.read().await;
        AuditStats {
            tools: guard.len(),
            entries: guard.values().map(VecDeque::len).sum(),
            window: self.config.window().get(),
        }
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditLog {
    async fn append(&self, record: ExecutionAuditRecord) -> StoreResult<()> {
        let mut guard = self.rings.write().await;
        let capacity = self.config.window().get();
        let ring = guard
            .entry(record.tool_name.clone())
            .or_insert_with(|| VecDeque::with_capacity(capacity));
        ring.push_back(record);
        while ring.len() > capacity {
            ring.pop_front();
        }
        Ok(())
    }

    async fn recent(&self, tool: &str, limit: usize) -> StoreResult<Vec<ExecutionAuditRecord>> {
        let guard = self.rings.read().await;
        let Some(ring) = guard.get(tool) else {
            return Ok(Vec::new());
        };
        let skip = ring.len().saturating_sub(limit);
        Ok(ring.iter().skip(skip).cloned().collect())
    }
}

/// Snapshot describing utilisation of the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditStats {
    /// Tools with at least one record.
    pub tools: usize,
    /// Records currently retained.
    pub entries: usize,
    /// Per-tool capacity.
    pub window: usize,
}

/// Returns a copy of `args` with secret-looking keys masked and long strings cut.
#[must_use]
pub fn redact_arguments(args: &Value) -> Value {
    match args {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, value) in map {
                let value = if is_sensitive(key) {
                    Value::from(REDACTED)
                } else {
                    redact_arguments(value)
                };
                out.insert(key.clone(), value);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_arguments).collect()),
        Value::String(text) => Value::String(truncate(text, MAX_STRING_CHARS)),
        other => other.clone(),
    }
}

fn is_sensitive(key: &str) -> bool {
    let lowered = key.to_ascii_lowercase();
    SENSITIVE_KEYS.iter().any(|needle| lowered.contains(needle))
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...[truncated]", &text[..cut]),
        None => text.to_owned(),
    }
}
