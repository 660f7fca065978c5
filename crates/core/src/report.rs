//! Labelled final report.
//!
//! The evaluator answers in a line-oriented format:
//!
//! ```text
//! SUMMARY: <text>
//! TESTS: <text>        (or ERRORS: <text>)
//! SAFETY: <text>       (optional)
//! <artifact body>
//! ```
//!
//! Labels are recognised on any line and removed from the body. Parsing stops
//! at the first line that echoes the grammar specification.

use crate::extract::fenced_block;
use std::fmt;

/// Lines starting with any of these begin an echoed grammar specification.
const GRAMMAR_ECHO_MARKERS: &[&str] = &[
    "GRAMMAR SPECIFICATION:",
    "GRAMMO SPECIFICATION:",
    "// ===",
    "start: program",
];

const SUMMARY: &str = "SUMMARY:";
const TESTS: &str = "TESTS:";
const ERRORS: &str = "ERRORS:";
const SAFETY: &str = "SAFETY:";

/// Which label carried the test/error notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotesLabel {
    Tests,
    Errors,
}

impl NotesLabel {
    fn label(self) -> &'static str {
        match self {
            NotesLabel::Tests => TESTS,
            NotesLabel::Errors => ERRORS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Report {
    pub summary: String,
    pub notes: Option<(NotesLabel, String)>,
    pub safety: Option<String>,
    pub body: String,
}

fn label_value<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    line.strip_prefix(label).map(str::trim)
}

/// Drop whitespace-only lines before and after `body`. Content lines keep
/// their indentation and line endings.
fn trim_blank_lines(body: &str) -> &str {
    let start = body
        .split_inclusive('\n')
        .take_while(|line| line.trim().is_empty())
        .map(str::len)
        .sum::<usize>();
    let rest = &body[start..];

    let mut end = 0;
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        offset += line.len();
        if !line.trim().is_empty() {
            end = offset;
        }
    }
    &rest[..end]
}

impl Report {
    pub fn parse(text: &str) -> Self {
        let mut report = Report::default();
        let mut body = String::new();

        for line in text.split_inclusive('\n') {
            let stripped = line.trim();
            if let Some(value) = label_value(stripped, SUMMARY) {
                report.summary = value.to_string();
            } else if let Some(value) = label_value(stripped, TESTS) {
                report.notes = Some((NotesLabel::Tests, value.to_string()));
            } else if let Some(value) = label_value(stripped, ERRORS) {
                report.notes = Some((NotesLabel::Errors, value.to_string()));
            } else if let Some(value) = label_value(stripped, SAFETY) {
                report.safety = Some(value.to_string());
            } else if GRAMMAR_ECHO_MARKERS
                .iter()
                .any(|marker| stripped.starts_with(marker))
            {
                break;
            } else {
                body.push_str(line);
            }
        }

        let body = trim_blank_lines(&body);
        report.body = if body.contains("```") {
            fenced_block(body).unwrap_or(body).to_string()
        } else {
            body.to_string()
        };
        report
    }

    /// Text of the `TESTS:`/`ERRORS:` label, or empty.
    pub fn notes_text(&self) -> &str {
        self.notes.as_ref().map_or("", |(_, text)| text.as_str())
    }

    pub fn safety_text(&self) -> &str {
        self.safety.as_deref().unwrap_or("")
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{SUMMARY} {}", self.summary)?;
        if let Some((label, text)) = &self.notes {
            writeln!(f, "{} {text}", label.label())?;
        }
        if let Some(safety) = &self.safety {
            writeln!(f, "{SAFETY} {safety}")?;
        }
        f.write_str(&self.body)
    }
}
