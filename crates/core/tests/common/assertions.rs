//! Custom assertion helpers over trace events.

use vk_protocol::ipc::Event;
use vk_protocol::state_models::Stage;

/// Stages entered, in order.
#[allow(dead_code)]
pub fn stages_entered(events: &[Event]) -> Vec<Stage> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::StageEntered { stage, .. } => Some(*stage),
            _ => None,
        })
        .collect()
}

/// Whether the turn was cut short by the global ceiling.
#[allow(dead_code)]
pub fn has_ceiling_reached(events: &[Event]) -> bool {
    events
        .iter()
        .any(|e| matches!(e, Event::CeilingReached { .. }))
}

/// Number of compile attempts reported for `stage`.
#[allow(dead_code)]
pub fn count_compile_attempts(events: &[Event], stage: Stage) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, Event::CompileAttempt { stage: s, .. } if *s == stage))
        .count()
}

/// Assert the event stream is bracketed by `TurnStarted` and a terminal event.
#[allow(dead_code)]
pub fn assert_turn_bracketed(events: &[Event]) {
    assert!(!events.is_empty(), "Event sequence is empty");
    assert!(
        matches!(events[0], Event::TurnStarted { .. }),
        "First event should be TurnStarted, got: {:?}",
        events[0]
    );
    let last = &events[events.len() - 1];
    assert!(
        matches!(last, Event::TurnCompleted { .. } | Event::TurnFailed { .. }),
        "Last event should be TurnCompleted or TurnFailed, got: {last:?}"
    );
}

/// Assert that a string contains a substring (case-insensitive).
#[allow(dead_code)]
pub fn assert_contains_ci(haystack: &str, needle: &str) {
    assert!(
        haystack.to_lowercase().contains(&needle.to_lowercase()),
        "Expected '{haystack}' to contain '{needle}' (case-insensitive)"
    );
}
