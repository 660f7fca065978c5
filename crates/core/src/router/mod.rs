//! Route selection for a new request.
//!
//! A single classification call asks the model for a route label and a
//! "needs testing" flag. When its answer cannot be parsed, the
//! [`RoutePolicy`] decides instead. The user's explicit testing signal
//! overrides the model's flag either way.

pub mod policy;

pub use policy::{LengthRoutePolicy, RoutePolicy};

use crate::error::TurnResult;
use crate::extract::clean_json_text;
use crate::model::ResilientModel;
use crate::prompts;
use serde::Deserialize;
use tracing::{debug, info};
use vk_protocol::message_models::Message;
use vk_protocol::state_models::Route;

/// The router's verdict for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteDecision {
    pub route: Route,
    pub needs_testing: bool,
    /// True when the policy decided because the model's answer was unusable.
    pub fallback: bool,
}

#[derive(Deserialize)]
struct RawDecision {
    route: String,
    #[serde(default)]
    needs_testing: Option<serde_json::Value>,
}

fn parse_route(label: &str) -> Option<Route> {
    match label.trim().to_lowercase().as_str() {
        "generate" | "coder" | "code" | "direct" => Some(Route::Generate),
        "plan" | "planner" | "decompose" => Some(Route::Plan),
        _ => None,
    }
}

fn parse_flag(value: Option<serde_json::Value>) -> bool {
    match value {
        Some(serde_json::Value::Bool(flag)) => flag,
        Some(serde_json::Value::String(text)) => {
            matches!(text.trim().to_lowercase().as_str(), "true" | "yes")
        }
        _ => false,
    }
}

/// Parse the classification answer into a route and the model's testing flag.
pub fn parse_decision(text: &str) -> Option<(Route, bool)> {
    let raw: RawDecision = serde_json::from_str(clean_json_text(text)).ok()?;
    let route = parse_route(&raw.route)?;
    Some((route, parse_flag(raw.needs_testing)))
}

/// Classify `message`.
///
/// # Errors
///
/// Returns `TurnError::Model` when the classification call fails fatally.
/// An unparsable answer is not an error.
pub async fn route_request(
    model: &ResilientModel,
    policy: &dyn RoutePolicy,
    message: &str,
) -> TurnResult<RouteDecision> {
    let conversation = [
        Message::system(prompts::router_persona()),
        Message::user(message),
    ];
    let response = model.invoke(&conversation, &[]).await?;
    let answer = response.content.normalize();
    let explicit = policy.explicit_testing(message);

    let decision = match parse_decision(&answer) {
        Some((route, model_flag)) => RouteDecision {
            route,
            needs_testing: explicit.unwrap_or(model_flag),
            fallback: false,
        },
        None => {
            debug!(answer = %answer, "Unparsable routing answer, using fallback policy");
            RouteDecision {
                route: policy.route(message),
                needs_testing: explicit.unwrap_or(false),
                fallback: true,
            }
        }
    };

    info!(
        route = %decision.route,
        needs_testing = decision.needs_testing,
        fallback = decision.fallback,
        "Request routed"
    );
    Ok(decision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ResilientModel, RetryPolicy, ScriptedModel, ScriptedReply};
    use std::sync::Arc;

    fn model(reply: &str) -> ResilientModel {
        let scripted = ScriptedModel::new([ScriptedReply::text(reply)]);
        ResilientModel::new(Arc::new(scripted), RetryPolicy::default())
    }

    #[test]
    fn test_parse_decision_accepts_synonyms() {
        assert_eq!(
            parse_decision("```json\n{\"route\": \"coder\", \"needs_testing\": true}\n```"),
            Some((Route::Generate, true))
        );
        assert_eq!(
            parse_decision("{\"route\": \"planner\"}"),
            Some((Route::Plan, false))
        );
        assert_eq!(parse_decision("{\"route\": \"elsewhere\"}"), None);
        assert_eq!(parse_decision("plan, probably"), None);
    }

    #[tokio::test]
    async fn test_model_decision_with_explicit_override() {
        let model = model("{\"route\": \"generate\", \"needs_testing\": true}");
        let decision = route_request(&model, &LengthRoutePolicy::default(), "write fact, no tests")
            .await
            .expect("routing succeeds");

        assert_eq!(decision.route, Route::Generate);
        assert!(!decision.needs_testing);
        assert!(!decision.fallback);
    }

    #[tokio::test]
    async fn test_fallback_on_unparsable_answer() {
        let model = model("I think you should plan this.");
        let long_request = "write a program ".repeat(20);
        let decision = route_request(&model, &LengthRoutePolicy::default(), &long_request)
            .await
            .expect("routing succeeds");

        assert_eq!(decision.route, Route::Plan);
        assert!(!decision.needs_testing);
        assert!(decision.fallback);
    }
}
