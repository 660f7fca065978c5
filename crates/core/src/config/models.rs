//! Configuration models for `.verikit/config.toml`.
//!
//! Every section is optional; missing sections and fields take the defaults
//! defined here.
//!
//! # Example
//!
//! ```toml
//! [model]
//! name = "gemma3:27b"
//! supports_system_role = false
//! supports_tool_calls = false
//!
//! [budget]
//! max_iterations = 6
//! evaluate_attempts = 5
//!
//! [verifier]
//! kind = "command"
//! program = "grammo-verify"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use vk_protocol::state_models::{DEFAULT_MAX_GLOBAL_ITERATIONS, DEFAULT_MAX_ITERATIONS};

use crate::config::error::{ConfigError, ConfigResult};

/// Largest attempt budget any repair loop may be configured with.
pub const MAX_ATTEMPT_BUDGET: u32 = 5;

/// Unified application configuration.
///
/// Passed explicitly to the orchestrator at construction time.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub model: ModelConfig,
    pub retry: RetryConfig,
    pub budget: BudgetConfig,
    pub verifier: VerifierConfig,
    pub router: RouterConfig,
    pub artifact: ArtifactConfig,
    pub checkpoint: CheckpointConfig,
}

impl AppConfig {
    /// Check cross-field consistency.
    pub fn validate(&self) -> ConfigResult<()> {
        let budget = &self.budget;
        if budget.max_iterations == 0 {
            return Err(ConfigError::InvalidConfig {
                reason: "budget.max_iterations must be at least 1".to_string(),
            });
        }
        if budget.max_global_iterations < budget.max_iterations {
            return Err(ConfigError::InvalidConfig {
                reason: format!(
                    "budget.max_global_iterations ({}) must be >= budget.max_iterations ({})",
                    budget.max_global_iterations, budget.max_iterations
                ),
            });
        }
        for (name, value) in [
            ("generate_attempts", budget.generate_attempts),
            ("integrate_attempts", budget.integrate_attempts),
            ("evaluate_attempts", budget.evaluate_attempts),
            ("test_attempts", budget.test_attempts),
        ] {
            if !(1..=MAX_ATTEMPT_BUDGET).contains(&value) {
                return Err(ConfigError::InvalidConfig {
                    reason: format!(
                        "budget.{name} must be between 1 and {MAX_ATTEMPT_BUDGET}, got {value}"
                    ),
                });
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidConfig {
                reason: "retry.max_attempts must be at least 1".to_string(),
            });
        }
        if self.artifact.declaration_prefixes.is_empty() {
            return Err(ConfigError::InvalidConfig {
                reason: "artifact.declaration_prefixes must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// The generative model and what it supports.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    /// Model name sent to the endpoint.
    pub name: String,

    /// Base URL of an Ollama-compatible chat endpoint.
    pub endpoint: String,

    /// Whether the model accepts a distinct system role.
    pub supports_system_role: bool,

    /// Whether the model accepts native tool/function bindings.
    pub supports_tool_calls: bool,

    pub request_timeout_secs: u64,

    /// Stream the integration stage's output to the front end.
    pub stream_integration: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: "gpt-oss:20b".to_string(),
            endpoint: "http://127.0.0.1:11434".to_string(),
            supports_system_role: true,
            supports_tool_calls: true,
            request_timeout_secs: 300,
            stream_integration: false,
        }
    }
}

impl ModelConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Retry policy for transient (rate-limit) failures.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub floor_secs: f64,
    pub multiplier: f64,
    pub cap_secs: f64,
    /// Added to a server-suggested delay.
    pub buffer_secs: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 12,
            floor_secs: 2.0,
            multiplier: 2.0,
            cap_secs: 60.0,
            buffer_secs: 1.0,
        }
    }
}

/// Iteration and attempt budgets.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct BudgetConfig {
    /// Per-stage generation budget.
    pub max_iterations: u32,

    /// Cross-stage ceiling for one turn.
    pub max_global_iterations: u32,

    pub generate_attempts: u32,
    pub integrate_attempts: u32,
    pub evaluate_attempts: u32,
    pub test_attempts: u32,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_global_iterations: DEFAULT_MAX_GLOBAL_ITERATIONS,
            generate_attempts: 3,
            integrate_attempts: 3,
            evaluate_attempts: 5,
            test_attempts: 3,
        }
    }
}

/// Transport used to reach the verification tools.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum VerifierKind {
    /// JSON over HTTP: `POST {endpoint}/{tool}`.
    #[default]
    Http,
    /// A local program reading a JSON request on stdin.
    Command,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct VerifierConfig {
    pub kind: VerifierKind,
    pub endpoint: String,
    pub program: Option<String>,
    pub args: Vec<String>,
    /// Upper bound for a single verifier call.
    pub timeout_secs: u64,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            kind: VerifierKind::Http,
            endpoint: "http://127.0.0.1:8000".to_string(),
            program: None,
            args: Vec::new(),
            timeout_secs: 60,
        }
    }
}

impl VerifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Inputs to the fallback routing policy.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RouterConfig {
    /// Requests shorter than this (in characters) go straight to generation.
    pub length_threshold: usize,

    /// Words in the user's request that force testing on.
    pub test_keywords: Vec<String>,

    /// Phrases in the user's request that force testing off.
    pub skip_test_keywords: Vec<String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            length_threshold: 140,
            test_keywords: ["test", "tests", "testing", "unit test", "verify", "validate"]
                .into_iter()
                .map(String::from)
                .collect(),
            skip_test_keywords: ["no tests", "without tests", "skip tests", "don't test"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// How candidate artifacts are recognized in model output.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ArtifactConfig {
    /// Display name of the target language, used in instructions.
    pub language: String,

    /// Line prefixes that start a top-level declaration.
    pub declaration_prefixes: Vec<String>,

    /// Candidates shorter than this skip verification.
    pub min_length: usize,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            language: "Grammo".to_string(),
            declaration_prefixes: vec!["func".to_string(), "var".to_string()],
            min_length: 10,
        }
    }
}

/// Where session checkpoints live. `None` keeps them in memory.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct CheckpointConfig {
    pub dir: Option<PathBuf>,
}
