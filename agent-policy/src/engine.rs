//! Approval policy and policy errors.

use agent_primitives::PermissionSet;
use thiserror::Error;
use tracing::debug;

use crate::decision::ApprovalDecision;
use crate::patterns::CodeLanguage;
use crate::risk::{RiskAnalysis, RiskAnalyzer, RiskLevel};

/// Errors surfaced by policy components.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// A pattern in a custom table failed to compile.
    #[error("invalid code pattern `{id}`: {reason}")]
    InvalidPattern {
        /// Identifier of the offending pattern.
        id: &'static str,
        /// Compiler message.
        reason: String,
    },
}

/// Result alias for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;

/// Decides whether a custom tool needs human approval before it may run.
///
/// Dangerous permissions escalate and critical code is denied. Escalating on
/// the advisory risk level is opt-in through
/// [`ApprovalPolicy::with_escalation_level`].
#[derive(Debug, Clone, Default)]
pub struct ApprovalPolicy {
    analyzer: RiskAnalyzer,
    escalate_at: Option<RiskLevel>,
}

impl ApprovalPolicy {
    /// Creates the default policy, which only consults the permission table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Escalates code whose risk is at or above `level`.
    #[must_use]
    pub fn with_escalation_level(mut self, level: RiskLevel) -> Self {
        self.escalate_at = Some(level);
        self
    }

    /// Returns the analyzer used for the risk signal.
    #[must_use]
    pub fn analyzer(&self) -> &RiskAnalyzer {
        &self.analyzer
    }

    /// Evaluates a tool's declared permissions and code body.
    #[must_use]
    pub fn evaluate(
        &self,
        permissions: &PermissionSet,
        code: &str,
        language: CodeLanguage,
    ) -> (ApprovalDecision, RiskAnalysis) {
        let risk = self.analyzer.analyze(code, language);
        if risk.blocked {
            let reason = risk
                .block_reason
                .clone()
                .unwrap_or_else(|| "code matched a critical pattern".to_owned());
            return (ApprovalDecision::deny(reason), risk);
        }

        let dangerous = permissions.dangerous();
        let mut reasons: Vec<String> = dangerous
            .iter()
            .map(|p| format!("permission `{p}` requires approval"))
            .collect();

        if let Some(threshold) = self.escalate_at {
            if risk.level >= threshold {
                reasons.push(format!(
                    "code risk is {} (score {})",
                    risk.level.as_str(),
                    risk.score
                ));
            }
        }

        let decision = if reasons.is_empty() {
            ApprovalDecision::allow()
        } else {
            debug!(?reasons, "custom tool requires approval");
            ApprovalDecision::escalate(reasons, dangerous)
        };
        (decision, risk)
    }
}
