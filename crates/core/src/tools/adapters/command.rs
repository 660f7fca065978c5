//! Subprocess verifier.
//!
//! Runs `<program> <args...> <tool>` once per call, writes the JSON request
//! (`{"code": ..., "tests": ...}`) to stdin and reads the verdict as the last
//! JSON line printed on stdout.

use crate::tools::base::{
    normalize_compile, normalize_syntax, normalize_test, Verifier, VerifierError,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::io::ErrorKind;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;
use vk_protocol::tool_models::{CompileResult, SyntaxReport, TestResult, ToolKind};

pub struct CommandVerifier {
    program: String,
    args: Vec<String>,
}

impl CommandVerifier {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    async fn call(&self, tool: ToolKind, request: Value) -> Result<Value, VerifierError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(tool.name())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| VerifierError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let mut stdin = child.stdin.take().ok_or_else(|| VerifierError::Transport {
            tool,
            reason: "Failed to capture stdin".to_string(),
        })?;
        // Feed stdin while stdout and stderr are drained, so neither side can
        // block on a full pipe.
        let request = request.to_string();
        let writer = tokio::spawn(async move {
            let written = stdin.write_all(request.as_bytes()).await;
            drop(stdin);
            written
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| VerifierError::Transport {
                tool,
                reason: e.to_string(),
            })?;

        match writer.await {
            Ok(Ok(())) => {}
            // The program answered without reading all of its input.
            Ok(Err(e)) if e.kind() == ErrorKind::BrokenPipe => {}
            Ok(Err(e)) => {
                return Err(VerifierError::Transport {
                    tool,
                    reason: format!("Failed to write request: {e}"),
                })
            }
            Err(e) => {
                return Err(VerifierError::Transport {
                    tool,
                    reason: format!("Request writer failed: {e}"),
                })
            }
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!(
            program = %self.program,
            tool = %tool,
            status = ?output.status.code(),
            "Verifier process finished"
        );

        let verdict = stdout
            .lines()
            .rev()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .find_map(|line| serde_json::from_str::<Value>(line).ok());

        match verdict {
            Some(value) => Ok(value),
            None if output.status.success() => Err(VerifierError::Decode {
                tool,
                reason: format!("no JSON object on stdout: {}", stdout.trim()),
            }),
            // A failing process with no verdict is reported as its stderr text.
            None => Ok(Value::String(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            )),
        }
    }
}

#[async_trait]
impl Verifier for CommandVerifier {
    fn name(&self) -> &str {
        &self.program
    }

    async fn check_availability(&self) -> bool {
        which::which(&self.program).is_ok()
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

#[cfg(test)]
mod tests {
    use super::*;

    fn shell(script: &str) -> CommandVerifier {
        CommandVerifier::new("sh", vec!["-c".to_string(), script.to_string()])
    }

    #[tokio::test]
    async fn test_tool_name_passed_and_last_json_line_used() {
        // `sh -c script name` binds the appended tool name to $0.
        let verifier = shell(
            r#"cat > /dev/null; echo 'progress...'; echo '{"compiled": false}'; echo "{\"compiled\": true, \"info\": \"$0\"}""#,
        );

        let result = verifier.compile("func void -> main() {}").await.expect("verdict");
        assert!(result.compiled);
        assert_eq!(result.info, "compile");
    }

    #[tokio::test]
    async fn test_request_is_written_to_stdin() {
        let verifier = shell(r#"grep -q '"tests":"t1"' && echo '{"passed": true}' || echo '{"passed": false}'"#);

        let result = verifier.run_tests("code", "t1").await.expect("verdict");
        assert!(result.passed);
    }

    #[tokio::test]
    async fn test_failing_process_without_json_reports_stderr() {
        let verifier = shell("cat > /dev/null; echo 'parse error near }' >&2; exit 2");

        let result = verifier.compile("func").await.expect("verdict");
        assert!(!result.compiled);
        assert_eq!(result.errors, "parse error near }");
    }

    #[tokio::test]
    async fn test_large_request_with_chatty_verifier() {
        // Fills the stdout pipe before reading any of its input.
        let verifier = shell(
            r#"head -c 300000 /dev/zero | tr '\0' 'x'; echo; cat > /dev/null; echo '{"compiled": true}'"#,
        );
        let source = "var int: x;\n".repeat(100_000);

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(20),
            verifier.compile(&source),
        )
        .await
        .expect("verifier call finishes")
        .expect("verdict");
        assert!(result.compiled);
    }

    #[tokio::test]
    async fn test_missing_program() {
        let verifier = CommandVerifier::new("definitely-not-a-real-verifier-binary", vec![]);
        assert!(!verifier.check_availability().await);
        assert!(matches!(
            verifier.compile("x").await,
            Err(VerifierError::Spawn { .. })
        ));
    }
}
