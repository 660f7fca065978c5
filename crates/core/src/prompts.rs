//! Persona and payload text for each stage.

use vk_protocol::tool_models::TestResult;

pub fn router_persona() -> String {
    "You are a router for a code generation pipeline.\n\
     Decide whether the request can be written directly (\"generate\") or needs to be \
     broken into steps first (\"plan\"), and whether the user wants the program tested.\n\
     Return ONLY JSON: {\"route\": \"generate\" | \"plan\", \"needs_testing\": true | false}."
        .to_string()
}

pub fn generator_persona(language: &str) -> String {
    format!(
        "You are an expert {language} programmer.\n\
         Write complete, compilable {language} code for the task.\n\
         You may call validate_syntax or compile to check your work.\n\
         Output only the code, in a single fenced block."
    )
}

pub fn integrator_persona(language: &str) -> String {
    format!(
        "You are a {language} integration engineer.\n\
         Merge the given parts into ONE complete program: remove duplicate declarations, \
         keep a single entry point, and resolve naming conflicts.\n\
         Output only the merged code, in a single fenced block."
    )
}

pub fn tester_persona(language: &str) -> String {
    format!(
        "You are a {language} test engineer.\n\
         Write tests for the program and run them by calling run_tests with the program \
         (`code`) and the tests (`tests`). If tests fail, fix the program or the tests and \
         call run_tests again. Always respond with a run_tests tool call."
    )
}

pub fn evaluator_persona(language: &str) -> String {
    format!(
        "You are a {language} reviewer and debugger.\n\
         Check the program against the task, fix any remaining bug, and answer in this \
         exact format:\n\
         SUMMARY: <one paragraph on what the program does>\n\
         TESTS: <test outcome, or ERRORS: <remaining problems>>\n\
         SAFETY: <any safety concern, or none>\n\
         <the complete final code>\n\
         Do not repeat the grammar or these instructions."
    )
}

pub const EVALUATOR_REMINDER: &str =
    "Return strict format:\nSUMMARY: ...\nTESTS: ...\nSAFETY: ...\n<code>";

pub fn planner_persona() -> String {
    "You are the technical lead. Break the request into small, implementation-ready \
     coding steps.\n\
     Do not just repeat the task. Split it into 2-6 logical phases.\n\
     Return ONLY a JSON list of strings."
        .to_string()
}

pub fn revise_plan_persona() -> String {
    "You are the technical lead. The user rejected the previous plan.\n\
     Create a NEW plan considering the user's feedback.\n\
     Return ONLY a JSON list of strings."
        .to_string()
}

pub fn revise_plan_payload(original: &str, previous: &[String], feedback: &str) -> String {
    format!(
        "Original request: {original}\nPrevious plan:\n{}\nFeedback: {feedback}",
        numbered(previous)
    )
}

pub fn numbered(items: &[String]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {item}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn ask_approval_message(plan: &[String]) -> String {
    format!(
        "Here is the proposed plan:\n{}\n\nIs this okay? Reply with yes to proceed, or no and tell me what to change.",
        numbered(plan)
    )
}

pub fn clarify_approval_message(plan: &[String]) -> String {
    format!(
        "I did not understand your reply. The plan is:\n{}\n\nPlease answer yes to proceed, or no and describe what to change.",
        numbered(plan)
    )
}

fn code_block(code: &str) -> String {
    format!("```\n{code}\n```")
}

pub fn generate_payload(task: &str, current: &str, errors: &[String], language: &str) -> String {
    let mut payload = format!("Task:\n{task}\n");
    if !current.trim().is_empty() {
        payload.push_str(&format!("\nCurrent code:\n{}\n", code_block(current)));
    }
    if !errors.is_empty() {
        payload.push_str(&format!("\nPrevious errors:\n{}\n", errors.join("\n---\n")));
    }
    payload.push_str(&format!("\nOutput the complete {language} program."));
    payload
}

pub fn integrate_payload(original_task: &str, plan: &[String], parts: &[String]) -> String {
    let mut payload = format!("Original request:\n{original_task}\n\nParts to merge:\n");
    for (i, part) in parts.iter().enumerate() {
        let step = plan.get(i).map(String::as_str).unwrap_or("additional part");
        payload.push_str(&format!("\n// Part {}: {step}\n{}\n", i + 1, code_block(part)));
    }
    payload.push_str("\nMerge all parts into one complete program.");
    payload
}

pub fn test_payload(task: &str, code: &str) -> String {
    format!(
        "Task:\n{task}\n\nProgram:\n{}\n\nWrite tests for this program and call run_tests.",
        code_block(code)
    )
}

pub fn evaluate_payload(
    task: &str,
    code: &str,
    test_result: Option<&TestResult>,
    errors: &[String],
) -> String {
    let mut payload = format!("Task:\n{task}\n\nProgram:\n{}\n", code_block(code));
    if let Some(result) = test_result {
        payload.push_str(&format!(
            "\nTest run: {}\nstdout:\n{}\nstderr:\n{}\n",
            if result.passed { "passed" } else { "failed" },
            result.stdout,
            result.stderr
        ));
    }
    if !errors.is_empty() {
        payload.push_str(&format!("\nKnown compile errors:\n{}\n", errors.join("\n---\n")));
    }
    payload.push_str("\nReview, fix if needed, and answer in the required format.");
    payload
}
