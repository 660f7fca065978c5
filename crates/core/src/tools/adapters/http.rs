//! JSON-over-HTTP verifier: `POST {endpoint}/{tool}`.

use crate::tools::base::{
    normalize_compile, normalize_syntax, normalize_test, Verifier, VerifierError,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;
use vk_protocol::tool_models::{CompileResult, SyntaxReport, TestResult, ToolKind};

pub struct HttpVerifier {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpVerifier {
    /// # Errors
    ///
    /// Returns `VerifierError::Unavailable` if the HTTP client cannot be built.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, VerifierError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VerifierError::Unavailable(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, tool: ToolKind) -> String {
        format!("{}/{}", self.endpoint, tool.name())
    }

    async fn call(&self, tool: ToolKind, body: Value) -> Result<Value, VerifierError> {
        let url = self.url(tool);
        debug!(%url, "POST verifier");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| VerifierError::Transport {
                tool,
                reason: e.to_string(),
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| VerifierError::Transport {
            tool,
            reason: e.to_string(),
        })?;

        if status.is_server_error() {
            return Err(VerifierError::Transport {
                tool,
                reason: format!("HTTP {status}: {text}"),
            });
        }

        // A non-JSON body is still a verdict; normalization turns it into a failure.
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}

#[async_trait]
impl Verifier for HttpVerifier {
    fn name(&self) -> &str {
        &self.endpoint
    }

    async fn check_availability(&self) -> bool {
        match self.client.get(&self.endpoint).send().await {
            Ok(_) => true,
            Err(e) => {
                debug!(endpoint = %self.endpoint, error = %e, "Verifier health check failed");
                false
            }
        }
    }

    async fn validate_syntax(&self, source: &str) -> Result<SyntaxReport, VerifierError> {
        let raw = self
            .call(ToolKind::ValidateSyntax, json!({ "code": source }))
            .await?;
        Ok(normalize_syntax(raw))
    }

    async fn compile(&self, source: &str) -> Result<CompileResult, VerifierError> {
        let raw = self.call(ToolKind::Compile, json!({ "code": source })).await?;
        Ok(normalize_compile(raw))
    }

    async fn run_tests(&self, source: &str, tests: &str) -> Result<TestResult, VerifierError> {
        let raw = self
            .call(ToolKind::RunTests, json!({ "code": source, "tests": tests }))
            .await?;
        Ok(normalize_test(raw))
    }
}
