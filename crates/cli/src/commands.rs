//! Console command parsing.
//!
//! Lines starting with `:` (and the bare word `exit`) are console commands;
//! everything else is a message for the pipeline.

use crate::render::TraceLevel;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    /// Leave the console.
    Quit,
    /// Start a fresh session.
    NewSession,
    /// Delete the current session's checkpoint and start a fresh one.
    ForgetSession,
    /// Change how much of the trace is printed.
    SetTrace(TraceLevel),
    /// A command the console does not know, with a hint for the user.
    Invalid(String),
    /// A user message for the next turn.
    Message(String),
    /// Blank line.
    Empty,
}

pub fn parse_input(line: &str) -> ConsoleInput {
    let line = line.trim();
    if line.is_empty() {
        return ConsoleInput::Empty;
    }
    if line.eq_ignore_ascii_case("exit") {
        return ConsoleInput::Quit;
    }
    if !line.starts_with(':') {
        return ConsoleInput::Message(line.to_string());
    }

    let parts: Vec<&str> = line.split_whitespace().collect();
    match parts.first().copied() {
        Some(":quit") | Some(":q") => ConsoleInput::Quit,
        Some(":new") => ConsoleInput::NewSession,
        Some(":forget") => ConsoleInput::ForgetSession,
        Some(":trace") => match parts.get(1) {
            None => ConsoleInput::SetTrace(TraceLevel::Basic),
            Some(level) => match level.parse::<TraceLevel>() {
                Ok(level) => ConsoleInput::SetTrace(level),
                Err(e) => ConsoleInput::Invalid(e),
            },
        },
        Some(other) => ConsoleInput::Invalid(format!(
            "Unknown command {other}. Try :quit, :new, :forget or :trace [off|basic|debug]."
        )),
        None => ConsoleInput::Empty,
    }
}
