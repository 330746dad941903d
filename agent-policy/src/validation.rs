//! Forbidden-pattern scan applied to custom tool code.

use crate::patterns::PatternTable;

/// Blocked construct found in a code body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeViolation {
    /// Identifier of the matched pattern.
    pub pattern: &'static str,
    /// Description of the blocked construct.
    pub description: &'static str,
}

impl CodeViolation {
    /// Formats the violation for an aggregated validation message.
    #[must_use]
    pub fn message(&self) -> String {
        format!("code contains a forbidden construct: {}", self.description)
    }
}

/// Scans tool bodies for forbidden and critical patterns.
#[derive(Debug, Clone, Default)]
pub struct CodeValidator {
    patterns: PatternTable,
}

impl CodeValidator {
    /// Creates a validator over the built-in table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a validator over a caller-supplied table.
    #[must_use]
    pub fn with_patterns(patterns: PatternTable) -> Self {
        Self { patterns }
    }

    /// Returns every violation found in `code`, in table order.
    #[must_use]
    pub fn scan(&self, code: &str) -> Vec<CodeViolation> {
        self.patterns
            .blocking()
            .filter(|entry| entry.is_match(code))
            .map(|entry| CodeViolation {
                pattern: entry.spec().id,
                description: entry.spec().description,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trivial_code_passes() {
        let validator = CodeValidator::new();
        assert!(validator.scan("return { ok: true, city: args.city };").is_empty());
    }

    #[test]
    fn termination_and_module_loading_are_rejected() {
        let validator = CodeValidator::new();
        for code in [
            "process.exit(1)",
            "const fs = require('fs')",
            "const m = await import('node:fs')",
            "import fs from 'fs';\nreturn 1;",
            "obj.__proto__.polluted = true",
        ] {
            assert!(!validator.scan(code).is_empty(), "{code}");
        }
    }

    #[test]
    fn critical_patterns_are_also_rejected() {
        let violations = CodeValidator::new().scan("rm -rf / --no-preserve-root");
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].pattern, "root_wipe");
        assert!(violations[0].message().contains("forbidden"));
    }

    #[test]
    fn weighted_patterns_are_not_validation_errors() {
        assert!(CodeValidator::new().scan("const r = await fetch(args.url);").is_empty());
    }
}
