//! Static risk scoring of code snippets.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::patterns::{CodeLanguage, Disposition, PatternTable, Severity};

/// Score reserved for the critical veto.
pub const CRITICAL_SCORE: u8 = 100;
/// Highest score the weighted pass can produce.
pub const MAX_WEIGHTED_SCORE: u8 = 99;

const LOW_THRESHOLD: u8 = 1;
const MEDIUM_THRESHOLD: u8 = 15;
const HIGH_THRESHOLD: u8 = 30;

/// Discrete risk level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Nothing matched.
    Safe,
    /// Score in `1..15`.
    Low,
    /// Score in `15..30`.
    Medium,
    /// Score of 30 or more.
    High,
    /// A critical pattern matched.
    Critical,
}

impl RiskLevel {
    /// Maps a weighted score onto a level.
    #[must_use]
    pub const fn from_score(score: u8) -> Self {
        if score >= CRITICAL_SCORE {
            Self::Critical
        } else if score >= HIGH_THRESHOLD {
            Self::High
        } else if score >= MEDIUM_THRESHOLD {
            Self::Medium
        } else if score >= LOW_THRESHOLD {
            Self::Low
        } else {
            Self::Safe
        }
    }

    /// Returns the wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// A matched pattern contributing to the verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskFactor {
    /// Identifier of the matched pattern.
    pub pattern: String,
    /// Description of the danger.
    pub description: String,
    /// Severity of the match.
    pub severity: Severity,
}

/// Outcome of [`RiskAnalyzer::analyze`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAnalysis {
    /// Discrete level.
    pub level: RiskLevel,
    /// Clamped score, or [`CRITICAL_SCORE`] on veto.
    pub score: u8,
    /// Matched patterns.
    pub factors: Vec<RiskFactor>,
    /// Whether the snippet must not run.
    pub blocked: bool,
    /// Reason for the block, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,
}

/// Pure, deterministic scorer over a [`PatternTable`].
#[derive(Debug, Clone, Default)]
pub struct RiskAnalyzer {
    patterns: PatternTable,
}

impl RiskAnalyzer {
    /// Creates an analyzer over the built-in table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an analyzer over a caller-supplied table.
    #[must_use]
    pub fn with_patterns(patterns: PatternTable) -> Self {
        Self { patterns }
    }

    /// Scores the snippet.
    ///
    /// Critical patterns are checked first, in every language, and veto the
    /// weighted pass entirely.
    #[must_use]
    pub fn analyze(&self, code: &str, language: CodeLanguage) -> RiskAnalysis {
        let critical: Vec<RiskFactor> = self
            .patterns
            .iter()
            .filter(|entry| matches!(entry.spec().disposition, Disposition::Critical))
            .filter(|entry| entry.is_match(code))
            .map(|entry| RiskFactor {
                pattern: entry.spec().id.to_owned(),
                description: entry.spec().description.to_owned(),
                severity: Severity::Critical,
            })
            .collect();

        if let Some(first) = critical.first() {
            let reason = format!("Blocked: {}", first.description);
            debug!(%language, pattern = %first.pattern, "critical code pattern matched");
            return RiskAnalysis {
                level: RiskLevel::Critical,
                score: CRITICAL_SCORE,
                factors: critical,
                blocked: true,
                block_reason: Some(reason),
            };
        }

        let mut total: u32 = 0;
        let mut factors = Vec::new();
        for entry in self.patterns.iter().filter(|e| e.applies_to(language)) {
            let Disposition::Weighted { severity, score } = entry.spec().disposition else {
                continue;
            };
            if entry.is_match(code) {
                total += u32::from(score);
                factors.push(RiskFactor {
                    pattern: entry.spec().id.to_owned(),
                    description: entry.spec().description.to_owned(),
                    severity,
                });
            }
        }

        let score = u8::try_from(total.min(u32::from(MAX_WEIGHTED_SCORE)))
            .unwrap_or(MAX_WEIGHTED_SCORE);

        RiskAnalysis {
            level: RiskLevel::from_score(score),
            score,
            factors,
            blocked: false,
            block_reason: None,
        }
    }
}

/// Scores a snippet with the built-in table.
#[must_use]
pub fn analyze_code_risk(code: &str, language: CodeLanguage) -> RiskAnalysis {
    RiskAnalyzer::new().analyze(code, language)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eval_is_high_risk() {
        let analysis = analyze_code_risk("eval(x)", CodeLanguage::JavaScript);
        assert_eq!(analysis.level, RiskLevel::High);
        assert!(!analysis.blocked);
        assert!(
            analysis
                .factors
                .iter()
                .any(|f| f.description.eq_ignore_ascii_case("dynamic code evaluation"))
        );
    }

    #[test]
    fn plain_code_is_safe() {
        let analysis = analyze_code_risk(
            "return { temperature: args.city.length };",
            CodeLanguage::JavaScript,
        );
        assert_eq!(analysis.level, RiskLevel::Safe);
        assert_eq!(analysis.score, 0);
        assert!(analysis.factors.is_empty());
    }

    #[test]
    fn critical_veto_ignores_other_signals() {
        let code = "eval(x); new Function('a'); this.constructor.constructor('return process')()";
        let analysis = analyze_code_risk(code, CodeLanguage::JavaScript);
        assert_eq!(analysis.level, RiskLevel::Critical);
        assert_eq!(analysis.score, CRITICAL_SCORE);
        assert!(analysis.blocked);
        assert!(analysis.block_reason.is_some());
        assert!(
            analysis
                .factors
                .iter()
                .all(|f| f.severity == Severity::Critical)
        );
    }

    #[test]
    fn critical_applies_regardless_of_language() {
        let analysis = analyze_code_risk(":(){ :|:& };:", CodeLanguage::Other);
        assert_eq!(analysis.level, RiskLevel::Critical);
    }

    #[test]
    fn weighted_sum_is_clamped() {
        let code = "import os, subprocess\nos.system('x')\nsubprocess.run(['y'])\nexec(code)\n__import__('z')\neval(q)";
        let analysis = analyze_code_risk(code, CodeLanguage::Python);
        assert_eq!(analysis.score, MAX_WEIGHTED_SCORE);
        assert_eq!(analysis.level, RiskLevel::High);
        assert!(!analysis.blocked);
    }

    #[test]
    fn language_filter_applies() {
        let analysis = analyze_code_risk("subprocess.run(['ls'])", CodeLanguage::JavaScript);
        assert_eq!(analysis.level, RiskLevel::Safe);
    }

    #[test]
    fn thresholds() {
        assert_eq!(RiskLevel::from_score(0), RiskLevel::Safe);
        assert_eq!(RiskLevel::from_score(1), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(14), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(15), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(29), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(30), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(99), RiskLevel::High);
    }

    #[test]
    fn analysis_is_deterministic() {
        let code = "fetch(url); process.env.KEY";
        let a = analyze_code_risk(code, CodeLanguage::JavaScript);
        let b = analyze_code_risk(code, CodeLanguage::JavaScript);
        assert_eq!(a, b);
        assert_eq!(a.level, RiskLevel::Medium);
        assert_eq!(a.score, 15);
    }
}
