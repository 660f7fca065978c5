//! Execute-and-await port for verifier calls.
//!
//! Every verifier call made by the pipeline goes through [`ExecutePort::run`],
//! which awaits the call to completion or fails with
//! [`VerifierError::Timeout`] after the configured duration. Callers get no
//! partial result either way.

use crate::tools::base::{Verifier, VerifierError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use vk_protocol::tool_models::{CompileResult, SyntaxReport, TestResult, ToolKind};

/// Default upper bound for one verifier call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
pub struct ExecutePort {
    timeout: Duration,
}

impl Default for ExecutePort {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl ExecutePort {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Await `call`, bounded by the port timeout.
    pub async fn run<T, F>(&self, tool: ToolKind, call: F) -> Result<T, VerifierError>
    where
        F: Future<Output = Result<T, VerifierError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(tool = %tool, timeout_ms = self.timeout.as_millis() as u64, "Verifier call timed out");
                Err(VerifierError::Timeout {
                    tool,
                    after: self.timeout,
                })
            }
        }
    }
}

/// A verifier reached through an [`ExecutePort`].
#[derive(Clone)]
pub struct VerificationPort {
    verifier: Arc<dyn Verifier>,
    port: ExecutePort,
}

impl VerificationPort {
    pub fn new(verifier: Arc<dyn Verifier>, port: ExecutePort) -> Self {
        Self { verifier, port }
    }

    pub fn verifier_name(&self) -> &str {
        self.verifier.name()
    }

    pub async fn check_availability(&self) -> bool {
        self.verifier.check_availability().await
    }

    pub async fn validate_syntax(&self, source: &str) -> Result<SyntaxReport, VerifierError> {
        debug!(tool = "validate_syntax", bytes = source.len(), "Calling verifier");
        self.port
            .run(ToolKind::ValidateSyntax, self.verifier.validate_syntax(source))
            .await
    }

    pub async fn compile(&self, source: &str) -> Result<CompileResult, VerifierError> {
        debug!(tool = "compile", bytes = source.len(), "Calling verifier");
        self.port
            .run(ToolKind::Compile, self.verifier.compile(source))
            .await
    }

    pub async fn run_tests(&self, source: &str, tests: &str) -> Result<TestResult, VerifierError> {
        debug!(tool = "run_tests", bytes = source.len(), "Calling verifier");
        self.port
            .run(ToolKind::RunTests, self.verifier.run_tests(source, tests))
            .await
    }
}
