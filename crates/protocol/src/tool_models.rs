//! Verification tool result models.
//!
//! These records are the structured outcomes of the three external
//! verification tools: syntax validation, compilation and test execution.
//! All three tools are side-effect-free and idempotent for identical input.

use serde::{Deserialize, Serialize};

/// Outcome of a grammar-driven syntax check.
///
/// On failure, `line`/`column` point at the offending token (1-based) and
/// `expected_tokens` lists what the parser would have accepted there.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct SyntaxReport {
    pub valid: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expected_tokens: Vec<String>,

    #[serde(default)]
    pub message: String,
}

/// Outcome of a compiler run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct CompileResult {
    #[serde(default)]
    pub compiled: bool,

    #[serde(default)]
    pub info: String,

    #[serde(default)]
    pub warning: String,

    #[serde(default)]
    pub errors: String,
}

impl CompileResult {
    /// A failed result carrying only an error text.
    pub fn failed(errors: impl Into<String>) -> Self {
        Self {
            compiled: false,
            errors: errors.into(),
            ..Self::default()
        }
    }

    pub fn success(info: impl Into<String>) -> Self {
        Self {
            compiled: true,
            info: info.into(),
            ..Self::default()
        }
    }
}

/// Outcome of a test run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct TestResult {
    #[serde(default)]
    pub passed: bool,

    #[serde(default)]
    pub stdout: String,

    #[serde(default)]
    pub stderr: String,
}

impl TestResult {
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            passed: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// The verification tools exposed to the model.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    ValidateSyntax,
    Compile,
    RunTests,
}

impl ToolKind {
    /// Wire name used in tool specs and tool-call records.
    pub fn name(self) -> &'static str {
        match self {
            ToolKind::ValidateSyntax => "validate_syntax",
            ToolKind::Compile => "compile",
            ToolKind::RunTests => "run_tests",
        }
    }

    /// Resolve a tool-call name back to a kind.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "validate_syntax" => Some(ToolKind::ValidateSyntax),
            "compile" => Some(ToolKind::Compile),
            "run_tests" => Some(ToolKind::RunTests),
            _ => None,
        }
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
