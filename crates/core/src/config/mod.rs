//! Configuration loading and management.
//!
//! This module loads the explicit [`models::AppConfig`] object from
//! `.verikit/config.toml` and applies environment overrides.

pub mod error;
pub mod loader;
pub mod models;

pub use error::{ConfigError, ConfigResult};
pub use loader::load_config;
pub use models::AppConfig;
