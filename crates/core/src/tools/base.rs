//! Verifier trait, errors and result normalization.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use vk_protocol::tool_models::{CompileResult, SyntaxReport, TestResult, ToolKind};

/// Failure to obtain a verdict from a verification tool.
///
/// A rejected program is not an error: it is a result with
/// `compiled: false` or `passed: false`.
#[derive(Error, Debug)]
pub enum VerifierError {
    #[error("Verifier not available: {0}")]
    Unavailable(String),

    #[error("Transport error calling {tool}: {reason}")]
    Transport { tool: ToolKind, reason: String },

    #[error("{tool} did not answer within {after:?}")]
    Timeout { tool: ToolKind, after: Duration },

    #[error("Invalid response from {tool}: {reason}")]
    Decode { tool: ToolKind, reason: String },

    #[error("Failed to spawn verifier '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// The verification tool contract.
///
/// All three calls are side-effect-free and idempotent for identical input.
#[async_trait]
pub trait Verifier: Send + Sync {
    /// Identifier used in logs.
    fn name(&self) -> &str;

    /// Check whether the verifier can be reached.
    async fn check_availability(&self) -> bool;

    async fn validate_syntax(&self, source: &str) -> Result<SyntaxReport, VerifierError>;

    async fn compile(&self, source: &str) -> Result<CompileResult, VerifierError>;

    async fn run_tests(&self, source: &str, tests: &str) -> Result<TestResult, VerifierError>;
}

/// Decode a string payload that is itself JSON.
fn unwrap_json_text(value: Value) -> Value {
    match value {
        Value::String(text) => match serde_json::from_str::<Value>(text.trim()) {
            Ok(decoded @ Value::Object(_)) => decoded,
            _ => Value::String(text),
        },
        other => other,
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn field_text(map: &serde_json::Map<String, Value>, key: &str) -> String {
    map.get(key).map(text_of).unwrap_or_default()
}

fn field_bool(map: &serde_json::Map<String, Value>, keys: &[&str]) -> bool {
    keys.iter()
        .find_map(|key| map.get(*key).and_then(Value::as_bool))
        .unwrap_or(false)
}

/// Normalize a raw compiler payload.
///
/// Objects map field by field; anything else becomes a failed result whose
/// `errors` carries the payload text.
pub fn normalize_compile(value: Value) -> CompileResult {
    match unwrap_json_text(value) {
        Value::Object(map) => CompileResult {
            compiled: field_bool(&map, &["compiled"]),
            info: field_text(&map, "info"),
            warning: field_text(&map, "warning"),
            errors: field_text(&map, "errors"),
        },
        other => CompileResult::failed(text_of(&other)),
    }
}

/// Normalize a raw test-runner payload.
pub fn normalize_test(value: Value) -> TestResult {
    match unwrap_json_text(value) {
        Value::Object(map) => TestResult {
            passed: field_bool(&map, &["passed"]),
            stdout: field_text(&map, "stdout"),
            stderr: field_text(&map, "stderr"),
        },
        other => TestResult::failed(text_of(&other)),
    }
}

/// Normalize a raw syntax-checker payload. `passed` is accepted for `valid`.
pub fn normalize_syntax(value: Value) -> SyntaxReport {
    match unwrap_json_text(value) {
        Value::Object(map) => {
            let position = |key: &str| {
                map.get(key)
                    .and_then(Value::as_u64)
                    .and_then(|n| u32::try_from(n).ok())
            };
            let message = match map.get("message") {
                Some(message) => text_of(message),
                None => field_text(&map, "errors"),
            };
            SyntaxReport {
                valid: field_bool(&map, &["valid", "passed"]),
                line: position("line"),
                column: position("column"),
                expected_tokens: map
                    .get("expected_tokens")
                    .and_then(Value::as_array)
                    .map(|tokens| tokens.iter().map(text_of).collect())
                    .unwrap_or_default(),
                message,
            }
        }
        other => SyntaxReport {
            valid: false,
            message: text_of(&other),
            ..SyntaxReport::default()
        },
    }
}

/// Render a syntax report as feedback text for the model.
pub fn describe_syntax(report: &SyntaxReport) -> String {
    if report.valid {
        return "Syntax OK.".to_string();
    }
    let mut text = String::from("Syntax error");
    if let Some(line) = report.line {
        text.push_str(&format!(" at line {line}"));
        if let Some(column) = report.column {
            text.push_str(&format!(", column {column}"));
        }
    }
    text.push_str(&format!(": {}", report.message));
    if !report.expected_tokens.is_empty() {
        text.push_str(&format!("\nExpected one of: {}", report.expected_tokens.join(", ")));
    }
    text
}
