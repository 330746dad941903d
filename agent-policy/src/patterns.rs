//! Authoritative table of code patterns.
//!
//! One table serves every call site: custom tool creation and update reject
//! [`Disposition::Forbidden`] and [`Disposition::Critical`] entries, and the
//! risk analyzer vetoes on critical entries and sums weighted ones.
//!
//! Pattern matching is defense in depth only. String concatenation or encoding
//! can rebuild any blocked token; containment is the job of the sandbox runtime.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::engine::{PolicyError, PolicyResult};

/// Source language of a code snippet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeLanguage {
    /// JavaScript, the language of custom tool bodies.
    JavaScript,
    /// TypeScript.
    TypeScript,
    /// Python.
    Python,
    /// POSIX shell scripts.
    Shell,
    /// Anything else; only language-agnostic patterns apply.
    Other,
}

impl CodeLanguage {
    /// Returns the canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Python => "python",
            Self::Shell => "shell",
            Self::Other => "other",
        }
    }
}

impl Display for CodeLanguage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CodeLanguage {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "javascript" | "js" | "node" => Self::JavaScript,
            "typescript" | "ts" => Self::TypeScript,
            "python" | "py" => Self::Python,
            "shell" | "sh" | "bash" | "zsh" => Self::Shell,
            _ => Self::Other,
        })
    }
}

/// Severity attached to a risk factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Worth noting, rarely harmful.
    Low,
    /// Potentially harmful depending on arguments.
    Medium,
    /// Grants broad capabilities to the snippet.
    High,
    /// Always blocked.
    Critical,
}

/// How a pattern match is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Rejected when validating custom tool code; ignored by risk scoring.
    Forbidden,
    /// Rejected when validating code and forces a critical risk verdict.
    Critical,
    /// Contributes `score` to the risk sum.
    Weighted {
        /// Severity reported in the factor list.
        severity: Severity,
        /// Points added to the risk score.
        score: u8,
    },
}

/// Declarative pattern entry.
#[derive(Debug, Clone, Copy)]
pub struct PatternSpec {
    /// Stable identifier reported in factors.
    pub id: &'static str,
    /// Regular expression source.
    pub pattern: &'static str,
    /// Human-readable description of the danger.
    pub description: &'static str,
    /// Treatment of a match.
    pub disposition: Disposition,
    /// Languages the entry applies to; empty means every language.
    pub languages: &'static [CodeLanguage],
}

const JS: &[CodeLanguage] = &[CodeLanguage::JavaScript, CodeLanguage::TypeScript];
const SCRIPTING: &[CodeLanguage] = &[
    CodeLanguage::JavaScript,
    CodeLanguage::TypeScript,
    CodeLanguage::Python,
];
const PY: &[CodeLanguage] = &[CodeLanguage::Python];
const SH: &[CodeLanguage] = &[CodeLanguage::Shell];
const ANY: &[CodeLanguage] = &[];

const fn weighted(severity: Severity, score: u8) -> Disposition {
    Disposition::Weighted { severity, score }
}

/// Built-in pattern table.
pub const DEFAULT_PATTERNS: &[PatternSpec] = &[
    // forbidden in tool bodies
    PatternSpec {
        id: "process_termination",
        pattern: r"\bprocess\s*\.\s*(?:exit|abort|kill|reallyExit)\s*\(",
        description: "Direct process termination",
        disposition: Disposition::Forbidden,
        languages: ANY,
    },
    PatternSpec {
        id: "require_call",
        pattern: r"\brequire\s*\(",
        description: "Dynamic module loading via require()",
        disposition: Disposition::Forbidden,
        languages: ANY,
    },
    PatternSpec {
        id: "dynamic_import",
        pattern: r"\bimport\s*\(",
        description: "Dynamic module loading via import()",
        disposition: Disposition::Forbidden,
        languages: ANY,
    },
    PatternSpec {
        id: "static_import",
        pattern: r#"(?m)^\s*import\s+(?:[\w*{][^;]*\bfrom\b|['"])"#,
        description: "Module imports are not available inside tool bodies",
        disposition: Disposition::Forbidden,
        languages: ANY,
    },
    PatternSpec {
        id: "proto_mutation",
        pattern: r"__proto__",
        description: "Prototype mutation via __proto__",
        disposition: Disposition::Forbidden,
        languages: ANY,
    },
    PatternSpec {
        id: "global_object",
        pattern: r"\bglobalThis\b",
        description: "Access to the global object",
        disposition: Disposition::Forbidden,
        languages: ANY,
    },
    // critical veto
    PatternSpec {
        id: "fork_bomb",
        pattern: r":\s*\(\s*\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:",
        description: "Fork bomb",
        disposition: Disposition::Critical,
        languages: ANY,
    },
    PatternSpec {
        id: "root_wipe",
        pattern: r"\brm\s+-[a-zA-Z]*(?:rf|fr)[a-zA-Z]*\s+/(?:\s|\*|$)",
        description: "Recursive deletion of the filesystem root",
        disposition: Disposition::Critical,
        languages: ANY,
    },
    PatternSpec {
        id: "constructor_escape",
        pattern: r#"constructor\s*(?:\.\s*constructor|\[\s*['"]constructor['"]\s*\])\s*\("#,
        description: "Sandbox escape through the Function constructor chain",
        disposition: Disposition::Critical,
        languages: ANY,
    },
    PatternSpec {
        id: "native_binding",
        pattern: r"\bprocess\s*\.\s*binding\s*\(",
        description: "Native binding access outside the sandbox",
        disposition: Disposition::Critical,
        languages: ANY,
    },
    PatternSpec {
        id: "disk_destruction",
        pattern: r"\bmkfs(?:\.\w+)?\s|\bdd\s+if=\S+\s+of=/dev/(?:sd|hd|nvme|xvd)",
        description: "Raw disk format or overwrite",
        disposition: Disposition::Critical,
        languages: ANY,
    },
    PatternSpec {
        id: "self_replication",
        pattern: r"(?i)\b(?:copy|write|append)\w*\s*\([^)]*\b__filename\b",
        description: "Self-replicating code that writes out its own source",
        disposition: Disposition::Critical,
        languages: ANY,
    },
    // weighted
    PatternSpec {
        id: "eval",
        pattern: r"\beval\s*\(",
        description: "Dynamic code evaluation",
        disposition: weighted(Severity::High, 30),
        languages: SCRIPTING,
    },
    PatternSpec {
        id: "function_constructor",
        pattern: r"\bnew\s+Function\s*\(",
        description: "Dynamic function construction",
        disposition: weighted(Severity::High, 30),
        languages: JS,
    },
    PatternSpec {
        id: "child_process",
        pattern: r"\bchild_process\b",
        description: "Process spawning through child_process",
        disposition: weighted(Severity::High, 35),
        languages: JS,
    },
    PatternSpec {
        id: "js_exec",
        pattern: r"\b(?:exec|execSync|spawn|spawnSync|execFile)\s*\(",
        description: "Command execution",
        disposition: weighted(Severity::Medium, 20),
        languages: JS,
    },
    PatternSpec {
        id: "js_fs_delete",
        pattern: r"\bfs\w*\s*\.\s*(?:unlink|rmdir|rm)(?:Sync)?\s*\(",
        description: "File deletion",
        disposition: weighted(Severity::Medium, 15),
        languages: JS,
    },
    PatternSpec {
        id: "js_fs_write",
        pattern: r"\bfs\w*\s*\.\s*(?:writeFile|appendFile|createWriteStream)(?:Sync)?\s*\(",
        description: "File write",
        disposition: weighted(Severity::Low, 10),
        languages: JS,
    },
    PatternSpec {
        id: "js_env",
        pattern: r"\bprocess\s*\.\s*env\b",
        description: "Environment variable access",
        disposition: weighted(Severity::Low, 10),
        languages: JS,
    },
    PatternSpec {
        id: "js_network",
        pattern: r"\bfetch\s*\(|\bXMLHttpRequest\b|\bhttps?\s*\.\s*request\s*\(",
        description: "Network request",
        disposition: weighted(Severity::Low, 5),
        languages: JS,
    },
    PatternSpec {
        id: "py_os_system",
        pattern: r"\bos\s*\.\s*(?:system|popen|exec\w*)\s*\(",
        description: "Shell command execution via os",
        disposition: weighted(Severity::High, 35),
        languages: PY,
    },
    PatternSpec {
        id: "py_subprocess",
        pattern: r"\bsubprocess\s*\.",
        description: "Process spawning through subprocess",
        disposition: weighted(Severity::High, 30),
        languages: PY,
    },
    PatternSpec {
        id: "py_exec",
        pattern: r"\bexec\s*\(",
        description: "Dynamic code execution",
        disposition: weighted(Severity::High, 30),
        languages: PY,
    },
    PatternSpec {
        id: "py_dunder_import",
        pattern: r"\b__import__\s*\(",
        description: "Dynamic module import",
        disposition: weighted(Severity::High, 30),
        languages: PY,
    },
    PatternSpec {
        id: "py_pickle",
        pattern: r"\b(?:pickle|marshal)\s*\.\s*loads?\s*\(",
        description: "Unsafe deserialization",
        disposition: weighted(Severity::Medium, 20),
        languages: PY,
    },
    PatternSpec {
        id: "py_rmtree",
        pattern: r"\bshutil\s*\.\s*rmtree\s*\(",
        description: "Recursive directory deletion",
        disposition: weighted(Severity::Medium, 20),
        languages: PY,
    },
    PatternSpec {
        id: "py_open",
        pattern: r"\bopen\s*\(",
        description: "File access",
        disposition: weighted(Severity::Low, 5),
        languages: PY,
    },
    PatternSpec {
        id: "py_network",
        pattern: r"\b(?:requests|urllib\w*|httpx|socket)\s*\.",
        description: "Network request",
        disposition: weighted(Severity::Low, 5),
        languages: PY,
    },
    PatternSpec {
        id: "sh_pipe_to_shell",
        pattern: r"\b(?:curl|wget)\b[^|\n]*\|\s*(?:ba|z)?sh\b",
        description: "Piping downloaded content into a shell",
        disposition: weighted(Severity::High, 40),
        languages: SH,
    },
    PatternSpec {
        id: "sh_sudo",
        pattern: r"\bsudo\b",
        description: "Privilege escalation",
        disposition: weighted(Severity::High, 30),
        languages: SH,
    },
    PatternSpec {
        id: "sh_recursive_delete",
        pattern: r"\brm\s+-[a-zA-Z]*r",
        description: "Recursive deletion",
        disposition: weighted(Severity::Medium, 20),
        languages: SH,
    },
    PatternSpec {
        id: "sh_world_writable",
        pattern: r"\bchmod\s+(?:-R\s+)?777\b",
        description: "World-writable permissions",
        disposition: weighted(Severity::Medium, 15),
        languages: SH,
    },
    PatternSpec {
        id: "obfuscation",
        pattern: r"\batob\s*\(|Buffer\s*\.\s*from\s*\([^)]*base64|\bb64decode\s*\(|base64\s+(?:-d|--decode)",
        description: "Base64 decoding, often used for obfuscation",
        disposition: weighted(Severity::Medium, 15),
        languages: ANY,
    },
    PatternSpec {
        id: "infinite_loop",
        pattern: r"\bwhile\s*\(\s*(?:true|1)\s*\)|\bwhile\s+True\s*:|\bfor\s*\(\s*;\s*;\s*\)",
        description: "Unbounded loop",
        disposition: weighted(Severity::Low, 10),
        languages: ANY,
    },
];

/// Pattern entry with its compiled regular expression.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    spec: PatternSpec,
    regex: Regex,
}

impl CompiledPattern {
    /// Compiles a pattern specification.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidPattern`] when the expression does not compile.
    pub fn compile(spec: PatternSpec) -> PolicyResult<Self> {
        let regex = Regex::new(spec.pattern).map_err(|err| PolicyError::InvalidPattern {
            id: spec.id,
            reason: err.to_string(),
        })?;
        Ok(Self { spec, regex })
    }

    /// Returns the declarative specification.
    #[must_use]
    pub fn spec(&self) -> &PatternSpec {
        &self.spec
    }

    /// Returns `true` if the entry applies to the language.
    #[must_use]
    pub fn applies_to(&self, language: CodeLanguage) -> bool {
        self.spec.languages.is_empty() || self.spec.languages.contains(&language)
    }

    /// Returns `true` if the code matches.
    #[must_use]
    pub fn is_match(&self, code: &str) -> bool {
        self.regex.is_match(code)
    }
}

/// Compiled, shareable pattern table.
#[derive(Debug, Clone)]
pub struct PatternTable {
    entries: Arc<[CompiledPattern]>,
}

impl PatternTable {
    /// Compiles a custom table.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidPattern`] for the first entry that fails to compile.
    pub fn compile(specs: &[PatternSpec]) -> PolicyResult<Self> {
        let entries = specs
            .iter()
            .copied()
            .map(CompiledPattern::compile)
            .collect::<PolicyResult<Vec<_>>>()?;
        Ok(Self {
            entries: entries.into(),
        })
    }

    /// Returns the process-wide compiled copy of [`DEFAULT_PATTERNS`].
    ///
    /// # Panics
    ///
    /// Panics if a built-in pattern fails to compile, which the test suite rules out.
    #[must_use]
    pub fn builtin() -> Self {
        static TABLE: OnceLock<PatternTable> = OnceLock::new();
        TABLE
            .get_or_init(|| {
                Self::compile(DEFAULT_PATTERNS).expect("built-in code patterns must compile")
            })
            .clone()
    }

    /// Iterates over every entry.
    pub fn iter(&self) -> impl Iterator<Item = &CompiledPattern> {
        self.entries.iter()
    }

    /// Entries rejected by code validation.
    pub fn blocking(&self) -> impl Iterator<Item = &CompiledPattern> {
        self.iter().filter(|entry| {
            matches!(
                entry.spec.disposition,
                Disposition::Forbidden | Disposition::Critical
            )
        })
    }
}

impl Default for PatternTable {
    fn default() -> Self {
        Self::builtin()
    }
}
