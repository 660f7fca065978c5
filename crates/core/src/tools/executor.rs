//! Tool surface exposed to the model.

use crate::model::base::ToolSpec;
use crate::tools::base::VerifierError;
use crate::tools::port::VerificationPort;
use serde_json::json;
use tracing::{debug, info};
use vk_protocol::message_models::{Message, ToolCall};
use vk_protocol::tool_models::{CompileResult, SyntaxReport, TestResult, ToolKind};

/// Describe the given tools for binding to the model.
pub fn tool_specs(kinds: &[ToolKind]) -> Vec<ToolSpec> {
    kinds.iter().map(|kind| spec_for(*kind)).collect()
}

fn spec_for(kind: ToolKind) -> ToolSpec {
    let code = json!({"type": "string", "description": "Complete program source code"});
    let (description, parameters) = match kind {
        ToolKind::ValidateSyntax => (
            "Check the program against the grammar and report the first syntax error.",
            json!({"type": "object", "properties": {"code": code}, "required": ["code"]}),
        ),
        ToolKind::Compile => (
            "Compile the program and return the compiled status with diagnostics.",
            json!({"type": "object", "properties": {"code": code}, "required": ["code"]}),
        ),
        ToolKind::RunTests => (
            "Run the test plan against the program and report pass/fail with output.",
            json!({
                "type": "object",
                "properties": {
                    "code": code,
                    "tests": {"type": "string", "description": "Test plan or test cases"}
                },
                "required": ["code", "tests"]
            }),
        ),
    };
    ToolSpec {
        name: kind.name().to_string(),
        description: description.to_string(),
        parameters,
    }
}

/// Result of executing one tool call.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    /// Tool-result message to append to the conversation.
    pub message: Message,
    /// `None` when the call named an unknown tool or lacked arguments.
    pub kind: Option<ToolKind>,
    pub code: Option<String>,
    pub tests: Option<String>,
    pub syntax: Option<SyntaxReport>,
    pub compile: Option<CompileResult>,
    pub test: Option<TestResult>,
}

impl ToolOutcome {
    fn new(message: Message, kind: Option<ToolKind>) -> Self {
        Self {
            message,
            kind,
            code: None,
            tests: None,
            syntax: None,
            compile: None,
            test: None,
        }
    }

    fn rejected(call: &ToolCall, reason: String) -> Self {
        Self::new(Message::tool_result(call, format!("Error: {reason}")), None)
    }

    /// True when the tool ran and reported success.
    pub fn ok(&self) -> bool {
        self.syntax.as_ref().is_some_and(|r| r.valid)
            || self.compile.as_ref().is_some_and(|r| r.compiled)
            || self.test.as_ref().is_some_and(|r| r.passed)
    }
}

/// Dispatches model tool calls to the verifier.
#[derive(Clone)]
pub struct ToolExecutor {
    port: VerificationPort,
}

impl ToolExecutor {
    pub fn new(port: VerificationPort) -> Self {
        Self { port }
    }

    pub fn port(&self) -> &VerificationPort {
        &self.port
    }

    /// Execute a tool call.
    ///
    /// Unknown tool names and missing arguments are malformed model output:
    /// they produce a tool-result message carrying the error text.
    ///
    /// # Errors
    ///
    /// Returns `VerifierError` only when the verifier itself cannot be
    /// reached or does not answer in time.
    pub async fn execute(&self, call: &ToolCall) -> Result<ToolOutcome, VerifierError> {
        let Some(kind) = ToolKind::from_name(&call.name) else {
            debug!(tool = %call.name, "Model called an unknown tool");
            return Ok(ToolOutcome::rejected(
                call,
                format!(
                    "unknown tool '{}'. Available tools: validate_syntax, compile, run_tests.",
                    call.name
                ),
            ));
        };

        let Some(code) = call.arg_str("code").map(str::to_string) else {
            return Ok(ToolOutcome::rejected(
                call,
                format!("tool '{kind}' requires a string argument 'code'."),
            ));
        };

        let mut outcome = ToolOutcome::new(Message::tool_result(call, ""), Some(kind));
        outcome.code = Some(code.clone());

        let payload = match kind {
            ToolKind::ValidateSyntax => {
                let report = self.port.validate_syntax(&code).await?;
                let payload = json!(report);
                outcome.syntax = Some(report);
                payload
            }
            ToolKind::Compile => {
                let result = self.port.compile(&code).await?;
                let payload = json!(result);
                outcome.compile = Some(result);
                payload
            }
            ToolKind::RunTests => {
                let tests = call.arg_str("tests").unwrap_or_default().to_string();
                let result = self.port.run_tests(&code, &tests).await?;
                let payload = json!(result);
                outcome.tests = Some(tests);
                outcome.test = Some(result);
                payload
            }
        };

        info!(tool = %kind, ok = outcome.ok(), "Tool executed");
        outcome.message = Message::tool_result(call, payload.to_string());
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_specs_names_and_required_args() {
        let specs = tool_specs(&[ToolKind::Compile, ToolKind::RunTests]);
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].name, "compile");
        assert_eq!(specs[1].parameters["required"], json!(["code", "tests"]));
    }
}
