//! Terminal rendering of trace events and turn answers.

use colored::Colorize;
use std::fmt;
use std::str::FromStr;
use vk_protocol::ipc::Event;
use vk_protocol::turn_models::TurnOutput;

/// How much of the trace the console prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraceLevel {
    Off,
    #[default]
    Basic,
    Debug,
}

impl FromStr for TraceLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "basic" => Ok(Self::Basic),
            "debug" => Ok(Self::Debug),
            other => Err(format!(
                "Unknown trace level '{other}'. Use off, basic or debug."
            )),
        }
    }
}

impl fmt::Display for TraceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Off => "off",
            Self::Basic => "basic",
            Self::Debug => "debug",
        };
        f.write_str(name)
    }
}

/// One trace line for `event`, or `None` when `level` hides it.
pub fn render_event(event: &Event, level: TraceLevel) -> Option<String> {
    if level == TraceLevel::Off {
        return None;
    }
    let debug = level == TraceLevel::Debug;

    let line = match event {
        Event::Routed {
            route,
            needs_testing,
            fallback,
        } => {
            let source = if *fallback { " (fallback)" } else { "" };
            format!("route: {route}{source}, testing: {needs_testing}")
                .cyan()
                .to_string()
        }
        Event::StageEntered {
            stage,
            global_iteration,
        } => format!("-> {stage} (global {global_iteration})")
            .cyan()
            .to_string(),
        Event::CeilingReached {
            stage,
            global_iteration,
            max_global_iterations,
        } => format!(
            "iteration ceiling reached in {stage} ({global_iteration}/{max_global_iterations})"
        )
        .yellow()
        .to_string(),
        Event::StreamRestarted { stage, attempt } => {
            format!("{stage} stream restarted (attempt {attempt}), discarding partial output")
                .yellow()
                .to_string()
        }
        Event::TurnFailed { error } => format!("turn failed: {error}").red().to_string(),

        Event::StageCompleted { stage } if debug => format!("<- {stage}").dimmed().to_string(),
        Event::Iteration {
            stage,
            iteration,
            max_iterations,
        } if debug => format!("   {stage} iteration {iteration}/{max_iterations}")
            .dimmed()
            .to_string(),
        Event::ToolInvoked { tool, ok } if debug => {
            let status = if *ok { "ok" } else { "error" };
            format!("   tool {tool}: {status}").dimmed().to_string()
        }
        Event::CompileAttempt {
            stage,
            attempt,
            compiled,
        } if debug => {
            let status = if *compiled { "compiled" } else { "failed" };
            format!("   {stage} compile attempt {attempt}: {status}")
                .dimmed()
                .to_string()
        }
        Event::TestAttempt { attempt, passed } if debug => {
            let status = if *passed { "passed" } else { "failed" };
            format!("   test attempt {attempt}: {status}")
                .dimmed()
                .to_string()
        }
        Event::OutputChunk { text, .. } if debug => text.dimmed().to_string(),
        Event::Log { message } if debug => message.dimmed().to_string(),
        Event::TurnStarted { session_id } if debug => {
            format!("turn started ({session_id})").dimmed().to_string()
        }
        Event::TurnCompleted {
            suspended,
            compiled,
        } if debug => format!("turn completed (suspended: {suspended}, compiled: {compiled})")
            .dimmed()
            .to_string(),
        _ => return None,
    };
    Some(line)
}

/// The answer printed after a turn.
///
/// A suspended turn shows the approval prompt. Otherwise the summary and
/// safety notes come first, then the artifact; with no artifact the last
/// assistant message is shown instead.
pub fn render_answer(output: &TurnOutput) -> String {
    if output.suspended || output.final_artifact.trim().is_empty() {
        return output.reply.clone();
    }

    let mut sections = Vec::new();
    if !output.validation_summary.is_empty() {
        sections.push(format!(
            "{} {}",
            "SUMMARY:".bold(),
            output.validation_summary
        ));
    }
    if !output.safety_notes.is_empty() {
        sections.push(format!("{} {}", "SAFETY:".bold(), output.safety_notes));
    }
    if !output.compiled() {
        sections.push("The artifact did not compile.".yellow().to_string());
    }
    sections.push(output.final_artifact.clone());
    sections.join("\n")
}
