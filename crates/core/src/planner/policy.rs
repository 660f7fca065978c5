//! Replaceable planner policies.
//!
//! - [`PlanPolicy`]: turns raw planner output into a usable plan
//! - [`ApprovalPolicy`]: classifies the user's reply to a proposed plan

use crate::extract::clean_json_text;
use serde_json::Value;

/// Upper bound on plan length.
pub const MAX_PLAN_STEPS: usize = 6;

/// The user's reply to a proposed plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalReply {
    Approve,
    Reject,
    Unrecognized,
}

/// Decides what plan the pipeline actually executes.
pub trait PlanPolicy: Send + Sync {
    /// Parse the planner's raw output into ordered subtasks.
    fn parse(&self, text: &str) -> Vec<String> {
        parse_plan(text)
    }

    /// Accept, trim or replace a parsed plan for `task`.
    fn review(&self, task: &str, plan: Vec<String>) -> Vec<String>;
}

/// Default plan policy.
///
/// Keeps at most `max_steps` items and replaces a degenerate plan (empty, or
/// a single step whose length is within `similarity` of the task's length)
/// with a generic phased decomposition.
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultPlanPolicy {
    pub max_steps: usize,
    pub similarity: f64,
}

impl Default for DefaultPlanPolicy {
    fn default() -> Self {
        Self {
            max_steps: MAX_PLAN_STEPS,
            similarity: 0.2,
        }
    }
}

impl PlanPolicy for DefaultPlanPolicy {
    fn review(&self, task: &str, mut plan: Vec<String>) -> Vec<String> {
        plan.retain(|step| !step.trim().is_empty());
        plan.truncate(self.max_steps.max(1));

        let degenerate = match plan.as_slice() {
            [] => true,
            [only] => {
                let task_len = task.trim().chars().count() as f64;
                let step_len = only.trim().chars().count() as f64;
                (task_len - step_len).abs() <= task_len * self.similarity
            }
            _ => false,
        };

        if degenerate {
            generic_plan(task)
        } else {
            plan
        }
    }
}

/// A phased decomposition usable for any request.
pub fn generic_plan(task: &str) -> Vec<String> {
    vec![
        format!("Define the global variables and data needed for: {}", task.trim()),
        "Implement the helper functions with their core logic".to_string(),
        "Handle input, output and edge cases".to_string(),
        "Write the main function that ties everything together".to_string(),
    ]
}

/// Parse planner output: a JSON list of strings, else a bulleted or
/// numbered list, one step per line.
pub fn parse_plan(text: &str) -> Vec<String> {
    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(clean_json_text(text)) {
        let steps: Vec<String> = items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .filter(|s| !s.is_empty())
            .collect();
        if !steps.is_empty() {
            return steps;
        }
    }

    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("```"))
        .collect();
    let any_marked = lines.iter().any(|line| has_list_marker(line));

    lines
        .into_iter()
        .filter(|line| !any_marked || has_list_marker(line))
        .map(strip_list_marker)
        .filter(|step| !step.is_empty())
        .map(str::to_string)
        .collect()
}

fn has_list_marker(line: &str) -> bool {
    strip_list_marker(line).len() < line.trim().len()
}

fn strip_list_marker(line: &str) -> &str {
    let line = line.trim().trim_start_matches(['-', '•', '*']).trim_start();
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(stripped) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            return stripped.trim();
        }
    }
    line.trim()
}

/// Classifies approval replies.
pub trait ApprovalPolicy: Send + Sync {
    fn classify(&self, reply: &str) -> ApprovalReply;
}

/// Token-set approval policy.
///
/// Matching is case-insensitive on whole words (or consecutive words for
/// multi-word phrases). A reply that opens with a negative token, or that
/// negates before its first affirmative token ("not okay"), is a rejection.
/// Otherwise any affirmative token approves.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenApprovalPolicy {
    pub affirmative: Vec<String>,
    pub negative: Vec<String>,
    /// Words that turn a following affirmative token into a rejection.
    pub negations: Vec<String>,
}

impl Default for TokenApprovalPolicy {
    fn default() -> Self {
        let list = |tokens: &[&str]| tokens.iter().map(|t| t.to_string()).collect();
        Self {
            affirmative: list(&[
                "yes", "y", "ok", "okay", "sure", "proceed", "go ahead", "confirm", "approved",
                "si", "sì",
            ]),
            negative: list(&["no", "n", "nope", "change", "modify", "revise"]),
            negations: list(&["no", "not", "don't", "dont", "never"]),
        }
    }
}

impl TokenApprovalPolicy {
    /// Word index of the earliest match of any token.
    fn first_match(words: &[String], tokens: &[String]) -> Option<usize> {
        tokens
            .iter()
            .filter_map(|token| {
                let phrase: Vec<String> =
                    token.split_whitespace().map(str::to_lowercase).collect();
                if phrase.is_empty() {
                    return None;
                }
                words.windows(phrase.len()).position(|window| window == phrase)
            })
            .min()
    }
}

impl ApprovalPolicy for TokenApprovalPolicy {
    fn classify(&self, reply: &str) -> ApprovalReply {
        let words: Vec<String> = reply
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric() && c != '\'')
            .filter(|w| !w.is_empty())
            .map(str::to_string)
            .collect();

        let affirmative = Self::first_match(&words, &self.affirmative);
        let negative = Self::first_match(&words, &self.negative);
        let negation = Self::first_match(&words, &self.negations);

        match (affirmative, negative) {
            (_, Some(0)) => ApprovalReply::Reject,
            (Some(a), _) if negation.is_some_and(|n| n < a) => ApprovalReply::Reject,
            (Some(_), _) => ApprovalReply::Approve,
            (None, Some(_)) => ApprovalReply::Reject,
            (None, None) => ApprovalReply::Unrecognized,
        }
    }
}
