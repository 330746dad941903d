//! Code risk analysis and approval policy for custom tools.
//!
//! Everything here is static and pattern based. It decides whether a tool
//! may be saved and whether it needs a human in the loop; it does not contain
//! the code it scores.

#![warn(missing_docs, clippy::pedantic)]

pub mod decision;
pub mod engine;
pub mod patterns;
pub mod risk;
pub mod validation;

pub use decision::{ApprovalDecision, DecisionKind};
pub use engine::{ApprovalPolicy, PolicyError, PolicyResult};
pub use patterns::{CodeLanguage, Disposition, PatternSpec, PatternTable, Severity};
pub use risk::{RiskAnalysis, RiskAnalyzer, RiskFactor, RiskLevel, analyze_code_risk};
pub use validation::{CodeValidator, CodeViolation};
