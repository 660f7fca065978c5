//! Scripted verifier implementations for deterministic testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use vk_core::tools::{Verifier, VerifierError};
use vk_protocol::tool_models::{CompileResult, SyntaxReport, TestResult, ToolKind};

/// Marker that makes [`ScriptedVerifier::validate_syntax`] report an error.
#[allow(dead_code)]
pub const SYNTAX_ERROR_MARKER: &str = "@@syntax-error@@";

/// A verifier that replays queued compile and test verdicts.
///
/// With an empty queue, compilation succeeds and tests pass. Sources
/// containing [`SYNTAX_ERROR_MARKER`] fail the syntax check.
#[derive(Clone, Default)]
pub struct ScriptedVerifier {
    compile_results: Arc<Mutex<VecDeque<CompileResult>>>,
    test_results: Arc<Mutex<VecDeque<TestResult>>>,
    calls: Arc<Mutex<Vec<(ToolKind, String)>>>,
}

impl ScriptedVerifier {
    #[allow(dead_code)]
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(dead_code)]
    pub fn with_compile_results(mut self, results: impl IntoIterator<Item = CompileResult>) -> Self {
        self.compile_results = Arc::new(Mutex::new(results.into_iter().collect()));
        self
    }

    #[allow(dead_code)]
    pub fn with_test_results(mut self, results: impl IntoIterator<Item = TestResult>) -> Self {
        self.test_results = Arc::new(Mutex::new(results.into_iter().collect()));
        self
    }

    /// Every call received so far: the tool and the source it was given.
    #[allow(dead_code)]
    pub async fn calls(&self) -> Vec<(ToolKind, String)> {
        self.calls.lock().await.clone()
    }

    #[allow(dead_code)]
    pub async fn count(&self, tool: ToolKind) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|(kind, _)| *kind == tool)
            .count()
    }

    async fn record(&self, tool: ToolKind, source: &str) {
        self.calls.lock().await.push((tool, source.to_string()));
    }
}

#[async_trait]
impl Verifier for ScriptedVerifier {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn check_availability(&self) -> bool {
        true
    }

    async fn validate_syntax(&self, source: &str) -> Result<SyntaxReport, VerifierError> {
        self.record(ToolKind::ValidateSyntax, source).await;
        if source.contains(SYNTAX_ERROR_MARKER) {
            return Ok(SyntaxReport {
                valid: false,
                line: Some(1),
                column: Some(1),
                expected_tokens: vec!["func".to_string(), "var".to_string()],
                message: "Unexpected token".to_string(),
            });
        }
        Ok(SyntaxReport {
            valid: true,
            ..SyntaxReport::default()
        })
    }

    async fn compile(&self, source: &str) -> Result<CompileResult, VerifierError> {
        self.record(ToolKind::Compile, source).await;
        Ok(self
            .compile_results
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| CompileResult::success("Compilation OK")))
    }

    async fn run_tests(&self, source: &str, _tests: &str) -> Result<TestResult, VerifierError> {
        self.record(ToolKind::RunTests, source).await;
        Ok(self.test_results.lock().await.pop_front().unwrap_or(TestResult {
            passed: true,
            stdout: "all tests passed".to_string(),
            stderr: String::new(),
        }))
    }
}

/// A verifier whose transport is down: every call fails.
#[allow(dead_code)]
pub struct UnreachableVerifier;

#[async_trait]
impl Verifier for UnreachableVerifier {
    fn name(&self) -> &str {
        "unreachable"
    }

    async fn check_availability(&self) -> bool {
        false
    }

    async fn validate_syntax(&self, _source: &str) -> Result<SyntaxReport, VerifierError> {
        Err(VerifierError::Transport {
            tool: ToolKind::ValidateSyntax,
            reason: "connection refused".to_string(),
        })
    }

    async fn compile(&self, _source: &str) -> Result<CompileResult, VerifierError> {
        Err(VerifierError::Transport {
            tool: ToolKind::Compile,
            reason: "connection refused".to_string(),
        })
    }

    async fn run_tests(&self, _source: &str, _tests: &str) -> Result<TestResult, VerifierError> {
        Err(VerifierError::Transport {
            tool: ToolKind::RunTests,
            reason: "connection refused".to_string(),
        })
    }
}
