//! The Generate-Validate-Repair loop shared by every stage.
//!
//! A stage describes itself with a [`StageProfile`] (persona, attempt budget,
//! tools, what to check) and hands [`run_loop`] a task payload. The loop
//! drafts, runs tool calls, validates, and feeds failures back until the
//! candidate verifies or a budget runs out. Budgets are:
//!
//! - `max_iterations`: Generate entries for this stage
//! - `max_global_iterations`: Generate entries across the turn
//! - `attempt_budget`: failed validations before giving up
//!
//! Verification failures are values, not errors. Only a fatal model or
//! verifier failure ends the loop with `Err`.

use crate::config::models::MAX_ATTEMPT_BUDGET;
use crate::error::TurnResult;
use crate::extract::ArtifactExtractor;
use crate::model::resilient::{ResilientModel, StreamEvent};
use crate::report::Report;
use crate::repair::machine::{LoopMachine, LoopState};
use crate::state::turn::emit;
use crate::tools::base::describe_syntax;
use crate::tools::executor::{tool_specs, ToolExecutor};
use tokio::sync::mpsc::Sender;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};
use vk_protocol::ipc::Event;
use vk_protocol::message_models::{Message, ModelResponse, Role};
use vk_protocol::state_models::{PipelineState, Stage};
use vk_protocol::tool_models::{CompileResult, TestResult, ToolKind};

/// Error logged when a draft is empty or implausibly short.
pub const NO_CODE_ERROR: &str = "No code generated.";

/// Directive sent after an empty draft.
pub const NO_CODE_DIRECTIVE: &str =
    "Error: No code found. Please output the full program source, not a description of it.";

/// What the loop validates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    /// Syntax check, then compile the extracted artifact.
    Compile,
    /// Require a `run_tests` tool call and validate its verdict.
    Tests,
}

/// How the artifact is read from the model's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactMode {
    /// Source code, recovered with the [`ArtifactExtractor`].
    Source,
    /// A labelled report; only its body is verified.
    Report,
}

/// Static description of one stage's loop.
#[derive(Debug, Clone)]
pub struct StageProfile {
    pub stage: Stage,
    pub persona: String,
    pub attempt_budget: u32,
    pub tools: Vec<ToolKind>,
    pub check: Check,
    pub artifact: ArtifactMode,
    /// Stream output as `OutputChunk` events. Streaming calls bind no tools.
    pub stream: bool,
    /// Appended to every repair message.
    pub repair_reminder: Option<String>,
}

impl StageProfile {
    pub fn new(stage: Stage, persona: impl Into<String>) -> Self {
        Self {
            stage,
            persona: persona.into(),
            attempt_budget: 3,
            tools: Vec::new(),
            check: Check::Compile,
            artifact: ArtifactMode::Source,
            stream: false,
            repair_reminder: None,
        }
    }

    /// Set the attempt budget, clamped to `1..=5`.
    pub fn with_attempt_budget(mut self, budget: u32) -> Self {
        self.attempt_budget = budget.clamp(1, MAX_ATTEMPT_BUDGET);
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolKind>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_check(mut self, check: Check) -> Self {
        self.check = check;
        self
    }

    pub fn with_artifact(mut self, artifact: ArtifactMode) -> Self {
        self.artifact = artifact;
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_repair_reminder(mut self, reminder: impl Into<String>) -> Self {
        self.repair_reminder = Some(reminder.into());
        self
    }
}

/// Why a loop stopped without verifying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExhaustReason {
    IterationBudget,
    GlobalCeiling,
    AttemptBudget,
    /// A tests loop got a response without a tool call.
    NoToolCall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopTerminal {
    Verified,
    Exhausted(ExhaustReason),
}

/// Everything a finished loop knows.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    pub terminal: LoopTerminal,
    /// Last candidate: extracted source, or the full report text.
    pub artifact: String,
    /// Text of the last response without tool calls.
    pub raw_output: String,
    /// Tests from the last `run_tests` call.
    pub tests: Option<String>,
    /// Failed-or-passed validations performed.
    pub attempts: u32,
    pub compile_result: Option<CompileResult>,
    pub test_result: Option<TestResult>,
    /// One entry per failed validation.
    pub error_log: Vec<String>,
    pub iterations: u32,
    pub global_iterations: u32,
    /// Messages exchanged inside the loop, starting with the payload.
    pub transcript: Vec<Message>,
    pub path: Vec<LoopState>,
}

impl LoopOutcome {
    pub fn verified(&self) -> bool {
        self.terminal == LoopTerminal::Verified
    }
}

/// Collaborators of a running loop.
#[derive(Clone, Copy)]
pub struct LoopContext<'a> {
    pub model: &'a ResilientModel,
    pub tools: &'a ToolExecutor,
    pub extractor: &'a ArtifactExtractor,
    pub events: &'a Sender<Event>,
}

enum Validation {
    Passed,
    Failed { error: String, feedback: String },
}

/// Run one stage's Generate-Validate-Repair loop.
///
/// Counters start from `state.iteration_count` and
/// `state.global_iteration_count`; the caller resets the per-stage counter
/// on stage entry.
///
/// # Errors
///
/// Returns `TurnError` for fatal model or verifier failures.
pub async fn run_loop(
    ctx: LoopContext<'_>,
    state: &PipelineState,
    profile: &StageProfile,
    payload: impl Into<String>,
) -> TurnResult<LoopOutcome> {
    let stage = profile.stage;
    let specs = if profile.stream {
        Vec::new()
    } else {
        tool_specs(&profile.tools)
    };
    let history: Vec<Message> = state
        .messages
        .iter()
        .filter(|m| m.role != Role::System)
        .cloned()
        .collect();

    let mut machine = LoopMachine::new();
    let mut outcome = LoopOutcome {
        terminal: LoopTerminal::Exhausted(ExhaustReason::IterationBudget),
        artifact: String::new(),
        raw_output: String::new(),
        tests: None,
        attempts: 0,
        compile_result: None,
        test_result: None,
        error_log: Vec::new(),
        iterations: state.iteration_count,
        global_iterations: state.global_iteration_count,
        transcript: vec![Message::user(payload.into())],
        path: Vec::new(),
    };

    let terminal = loop {
        // Generate
        if outcome.iterations >= state.max_iterations {
            break LoopTerminal::Exhausted(ExhaustReason::IterationBudget);
        }
        if outcome.global_iterations >= state.max_global_iterations {
            break LoopTerminal::Exhausted(ExhaustReason::GlobalCeiling);
        }
        outcome.iterations += 1;
        outcome.global_iterations += 1;
        machine.set_iteration(outcome.iterations);
        debug!(
            stage = %stage,
            iteration = outcome.iterations,
            global_iteration = outcome.global_iterations,
            "Generating"
        );
        emit(
            ctx.events,
            Event::Iteration {
                stage,
                iteration: outcome.iterations,
                max_iterations: state.max_iterations,
            },
        )
        .await;

        let mut conversation = Vec::with_capacity(history.len() + outcome.transcript.len() + 1);
        conversation.push(Message::system(profile.persona.clone()));
        conversation.extend(history.iter().cloned());
        conversation.extend(outcome.transcript.iter().cloned());

        let response = if profile.stream {
            stream_response(ctx, stage, &conversation).await?
        } else {
            ctx.model.invoke(&conversation, &specs).await?
        };
        let text = response.content.normalize();
        let tool_calls = response.tool_calls.clone();
        outcome.transcript.push(response.into_message());

        let validation = if !tool_calls.is_empty() {
            machine.advance(LoopState::ToolCall)?;
            let mut test_verdict = None;
            for call in &tool_calls {
                let executed = ctx.tools.execute(call).await?;
                if let Some(kind) = executed.kind {
                    emit(
                        ctx.events,
                        Event::ToolInvoked {
                            tool: kind,
                            ok: executed.ok(),
                        },
                    )
                    .await;
                }
                if let Some(result) = executed.test.clone() {
                    if let Some(code) = executed.code.clone() {
                        outcome.artifact = code;
                    }
                    outcome.tests = executed.tests.clone();
                    test_verdict = Some(result);
                }
                outcome.transcript.push(executed.message);
            }

            match (profile.check, test_verdict) {
                (Check::Tests, Some(result)) => {
                    machine.advance(LoopState::Validate)?;
                    outcome.attempts += 1;
                    outcome.test_result = Some(result.clone());
                    emit(
                        ctx.events,
                        Event::TestAttempt {
                            attempt: outcome.attempts,
                            passed: result.passed,
                        },
                    )
                    .await;
                    if result.passed {
                        Validation::Passed
                    } else {
                        Validation::Failed {
                            error: test_error_text(&result),
                            feedback: format!(
                                "Tests failed. Fix the program or the tests and call run_tests again.\nstdout:\n{}\nstderr:\n{}",
                                result.stdout, result.stderr
                            ),
                        }
                    }
                }
                _ => {
                    machine.advance(LoopState::Generate)?;
                    continue;
                }
            }
        } else {
            if profile.check == Check::Tests {
                debug!(stage = %stage, "No tool call in tests loop");
                outcome.raw_output = text;
                break LoopTerminal::Exhausted(ExhaustReason::NoToolCall);
            }
            machine.advance(LoopState::Validate)?;
            outcome.raw_output = text.clone();
            outcome.artifact = match profile.artifact {
                ArtifactMode::Source => ctx.extractor.extract(&text),
                ArtifactMode::Report => text.clone(),
            };
            let source = match profile.artifact {
                ArtifactMode::Source => outcome.artifact.clone(),
                ArtifactMode::Report => Report::parse(&outcome.artifact).body,
            };
            let validation = validate_source(ctx, &source, &mut outcome).await?;
            emit(
                ctx.events,
                Event::CompileAttempt {
                    stage,
                    attempt: outcome.attempts,
                    compiled: matches!(validation, Validation::Passed),
                },
            )
            .await;
            validation
        };

        match validation {
            Validation::Passed => {
                machine.advance(LoopState::Verified)?;
                info!(stage = %stage, attempts = outcome.attempts, "Candidate verified");
                break LoopTerminal::Verified;
            }
            Validation::Failed { error, feedback } => {
                outcome.error_log.push(error);
                if outcome.attempts >= profile.attempt_budget {
                    break LoopTerminal::Exhausted(ExhaustReason::AttemptBudget);
                }
                machine.advance(LoopState::Repair)?;
                let feedback = match &profile.repair_reminder {
                    Some(reminder) => format!("{feedback}\n\n{reminder}"),
                    None => feedback,
                };
                outcome.transcript.push(Message::user(feedback));
                machine.advance(LoopState::Generate)?;
            }
        }
    };

    if let LoopTerminal::Exhausted(reason) = terminal {
        machine.advance(LoopState::Exhausted)?;
        warn!(
            stage = %stage,
            ?reason,
            attempts = outcome.attempts,
            iterations = outcome.iterations,
            "Loop exhausted"
        );
    }
    outcome.terminal = terminal;
    outcome.path = machine.path();
    Ok(outcome)
}

/// Syntax-check then compile `source`, updating counters and results.
async fn validate_source(
    ctx: LoopContext<'_>,
    source: &str,
    outcome: &mut LoopOutcome,
) -> TurnResult<Validation> {
    outcome.attempts += 1;

    if ctx.extractor.is_implausible(source) {
        debug!(bytes = source.len(), "Skipping verification of empty draft");
        outcome.compile_result = Some(CompileResult::failed(
            "No code generated or code too short.",
        ));
        return Ok(Validation::Failed {
            error: NO_CODE_ERROR.to_string(),
            feedback: NO_CODE_DIRECTIVE.to_string(),
        });
    }

    let syntax = ctx.tools.port().validate_syntax(source).await?;
    emit(
        ctx.events,
        Event::ToolInvoked {
            tool: ToolKind::ValidateSyntax,
            ok: syntax.valid,
        },
    )
    .await;
    if !syntax.valid {
        let description = describe_syntax(&syntax);
        outcome.compile_result = Some(CompileResult::failed(description.clone()));
        return Ok(Validation::Failed {
            feedback: format!("Syntax check failed. Fix the code and try again.\n{description}"),
            error: description,
        });
    }

    let result = ctx.tools.port().compile(source).await?;
    emit(
        ctx.events,
        Event::ToolInvoked {
            tool: ToolKind::Compile,
            ok: result.compiled,
        },
    )
    .await;
    outcome.compile_result = Some(result.clone());

    if result.compiled {
        return Ok(Validation::Passed);
    }
    let errors = match result.errors.trim() {
        "" => "(no details)".to_string(),
        errors => errors.to_string(),
    };
    Ok(Validation::Failed {
        feedback: format!("Compilation failed. Fix the code and try again.\nErrors:\n{errors}"),
        error: errors,
    })
}

fn test_error_text(result: &TestResult) -> String {
    let stderr = result.stderr.trim();
    if stderr.is_empty() {
        result.stdout.trim().to_string()
    } else {
        stderr.to_string()
    }
}

/// Stream one response, forwarding chunks and restarts as events.
async fn stream_response(
    ctx: LoopContext<'_>,
    stage: Stage,
    conversation: &[Message],
) -> TurnResult<ModelResponse> {
    let mut stream = ctx.model.stream(conversation);
    let mut text = String::new();
    while let Some(event) = stream.next().await {
        match event? {
            StreamEvent::Chunk(chunk) => {
                text.push_str(&chunk);
                emit(ctx.events, Event::OutputChunk { stage, text: chunk }).await;
            }
            StreamEvent::Restarted { attempt } => {
                text.clear();
                emit(ctx.events, Event::StreamRestarted { stage, attempt }).await;
            }
        }
    }
    Ok(ModelResponse::text(text))
}
