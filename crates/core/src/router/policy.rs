//! Fallback routing policy.

use crate::config::models::RouterConfig;
use vk_protocol::state_models::Route;

/// Deterministic routing used when the classification call is unusable, and
/// the source of the user's explicit testing signal.
pub trait RoutePolicy: Send + Sync {
    /// Route a request without the model.
    fn route(&self, message: &str) -> Route;

    /// `Some(true)` or `Some(false)` when the user's own words ask for or
    /// against testing; `None` when they say nothing about it.
    fn explicit_testing(&self, message: &str) -> Option<bool>;
}

/// Routes by message length and matches testing keywords.
#[derive(Debug, Clone, PartialEq)]
pub struct LengthRoutePolicy {
    pub length_threshold: usize,
    pub test_keywords: Vec<String>,
    pub skip_test_keywords: Vec<String>,
}

impl Default for LengthRoutePolicy {
    fn default() -> Self {
        Self::from(&RouterConfig::default())
    }
}

impl From<&RouterConfig> for LengthRoutePolicy {
    fn from(config: &RouterConfig) -> Self {
        Self {
            length_threshold: config.length_threshold,
            test_keywords: config.test_keywords.clone(),
            skip_test_keywords: config.skip_test_keywords.clone(),
        }
    }
}

fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn mentions(words: &[String], keyword: &str) -> bool {
    let phrase: Vec<String> = keyword.split_whitespace().map(str::to_lowercase).collect();
    !phrase.is_empty() && words.windows(phrase.len()).any(|window| window == phrase)
}

impl RoutePolicy for LengthRoutePolicy {
    fn route(&self, message: &str) -> Route {
        if message.trim().chars().count() < self.length_threshold {
            Route::Generate
        } else {
            Route::Plan
        }
    }

    fn explicit_testing(&self, message: &str) -> Option<bool> {
        let words = words(message);
        if self.skip_test_keywords.iter().any(|k| mentions(&words, k)) {
            Some(false)
        } else if self.test_keywords.iter().any(|k| mentions(&words, k)) {
            Some(true)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_by_length() {
        let policy = LengthRoutePolicy {
            length_threshold: 20,
            ..LengthRoutePolicy::default()
        };
        assert_eq!(policy.route("write fact"), Route::Generate);
        assert_eq!(
            policy.route("write a calculator with a parser and an evaluator"),
            Route::Plan
        );
    }

    #[test]
    fn test_explicit_testing_signal() {
        let policy = LengthRoutePolicy::default();
        assert_eq!(policy.explicit_testing("write fact and test it"), Some(true));
        assert_eq!(policy.explicit_testing("write fact, no tests"), Some(false));
        assert_eq!(policy.explicit_testing("don't test, just write it"), Some(false));
        assert_eq!(policy.explicit_testing("write the latest version"), None);
    }
}
