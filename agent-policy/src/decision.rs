//! Approval decisions produced for custom tools.

use agent_primitives::Permission;
use serde::{Deserialize, Serialize};

/// Describes the outcome of an approval evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    /// Tool may run as soon as it is saved.
    Allow,
    /// Tool must never run.
    Deny,
    /// Tool requires human approval before it may run.
    Escalate,
}

/// Structured decision emitted by [`ApprovalPolicy`](crate::ApprovalPolicy).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    kind: DecisionKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    reasons: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    dangerous_permissions: Vec<Permission>,
}

impl ApprovalDecision {
    /// Returns an allow decision with no additional context.
    #[must_use]
    pub fn allow() -> Self {
        Self {
            kind: DecisionKind::Allow,
            reasons: Vec::new(),
            dangerous_permissions: Vec::new(),
        }
    }

    /// Returns a deny decision with an explanatory reason.
    #[must_use]
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            kind: DecisionKind::Deny,
            reasons: vec![reason.into()],
            dangerous_permissions: Vec::new(),
        }
    }

    /// Returns an escalate decision listing why approval is needed.
    #[must_use]
    pub fn escalate(reasons: Vec<String>, dangerous_permissions: Vec<Permission>) -> Self {
        Self {
            kind: DecisionKind::Escalate,
            reasons,
            dangerous_permissions,
        }
    }

    /// Returns the decision kind.
    #[must_use]
    pub fn kind(&self) -> DecisionKind {
        self.kind
    }

    /// Returns true when the tool may run immediately.
    #[must_use]
    pub fn is_allow(&self) -> bool {
        self.kind == DecisionKind::Allow
    }

    /// Returns true when the tool must not run at all.
    #[must_use]
    pub fn is_deny(&self) -> bool {
        self.kind == DecisionKind::Deny
    }

    /// Returns true when approval is required.
    #[must_use]
    pub fn requires_approval(&self) -> bool {
        self.kind == DecisionKind::Escalate
    }

    /// Returns the reasons behind a deny or escalate decision.
    #[must_use]
    pub fn reasons(&self) -> &[String] {
        &self.reasons
    }

    /// Returns the dangerous permissions that triggered escalation.
    #[must_use]
    pub fn dangerous_permissions(&self) -> &[Permission] {
        &self.dangerous_permissions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_helpers_work() {
        let allow = ApprovalDecision::allow();
        assert!(allow.is_allow());
        assert!(!allow.requires_approval());

        let deny = ApprovalDecision::deny("blocked");
        assert!(deny.is_deny());
        assert_eq!(deny.reasons(), ["blocked"]);

        let escalate =
            ApprovalDecision::escalate(vec!["shell access".into()], vec![Permission::Shell]);
        assert!(escalate.requires_approval());
        assert_eq!(escalate.dangerous_permissions(), [Permission::Shell]);
    }
}
