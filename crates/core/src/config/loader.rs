//! Configuration file loader for the `.verikit/` directory.
//!
//! Settings come from three layers, later layers winning:
//! - built-in defaults
//! - `.verikit/config.toml`
//! - `VERIKIT_*` environment variables

use crate::config::error::ConfigError;
use crate::config::error::ConfigResult;
use crate::config::models::AppConfig;
use std::path::Path;
use std::str::FromStr;

/// Name of the per-project configuration directory.
pub const CONFIG_DIR: &str = ".verikit";

/// Loads configuration from the `.verikit/` directory under `root`.
///
/// # Arguments
///
/// * `root` - Root directory containing the `.verikit/` folder
///
/// # Returns
///
/// The merged `AppConfig`. A missing directory or `config.toml` yields the
/// defaults (plus environment overrides) rather than an error.
///
/// # Errors
///
/// Returns `ConfigError` if:
/// - `config.toml` exists but cannot be read or parsed
/// - an environment override is not a valid number
/// - the merged configuration fails validation
///
/// # Example
///
/// ```rust,no_run
/// use vk_core::config::loader::load_config;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new(".")).await?;
/// println!("Using model {}", config.model.name);
/// # Ok(())
/// # }
/// ```
pub async fn load_config(root: &Path) -> ConfigResult<AppConfig> {
    load_config_with_env(root, |key| std::env::var(key).ok()).await
}

/// Same as [`load_config`] with an injectable environment lookup.
pub async fn load_config_with_env<F>(root: &Path, env: F) -> ConfigResult<AppConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = load_file(root)?;
    apply_env_overrides(&mut config, env)?;
    config.validate()?;
    Ok(config)
}

/// Reads `config.toml`, falling back to defaults when it is absent.
fn load_file(root: &Path) -> ConfigResult<AppConfig> {
    let config_path = root.join(CONFIG_DIR).join("config.toml");

    if !config_path.exists() {
        return Ok(AppConfig::default());
    }

    let content =
        std::fs::read_to_string(&config_path).map_err(|source| ConfigError::FileRead {
            path: config_path.clone(),
            source,
        })?;

    toml::from_str(&content).map_err(|source| ConfigError::TomlParse {
        path: config_path,
        source,
    })
}

/// Applies `VERIKIT_*` overrides on top of file settings.
pub fn apply_env_overrides<F>(config: &mut AppConfig, env: F) -> ConfigResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(name) = env("VERIKIT_MODEL") {
        config.model.name = name;
    }
    if let Some(url) = env("VERIKIT_MODEL_URL") {
        config.model.endpoint = url;
    }
    if let Some(url) = env("VERIKIT_VERIFIER_URL") {
        config.verifier.endpoint = url;
    }
    if let Some(raw) = env("VERIKIT_MAX_ITERATIONS") {
        config.budget.max_iterations = parse_override("VERIKIT_MAX_ITERATIONS", &raw)?;
    }
    if let Some(raw) = env("VERIKIT_MAX_GLOBAL_ITERATIONS") {
        config.budget.max_global_iterations =
            parse_override("VERIKIT_MAX_GLOBAL_ITERATIONS", &raw)?;
    }
    Ok(())
}

fn parse_override<T>(key: &str, raw: &str) -> ConfigResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::models::VerifierKind;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::tempdir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[tokio::test]
    async fn test_load_config_full_file() {
        let dir = tempdir().expect("Failed to create temp dir");
        let root = dir.path();
        let vk_dir = root.join(CONFIG_DIR);
        fs::create_dir_all(&vk_dir).expect("Failed to create .verikit");

        let config_toml = r#"
[model]
name = "gemma3:27b"
supports_system_role = false
supports_tool_calls = false

[budget]
max_iterations = 6
max_global_iterations = 30
evaluate_attempts = 4

[verifier]
kind = "command"
program = "grammo-verify"
args = ["--json"]
timeout_secs = 15

[artifact]
declaration_prefixes = ["func", "var", "const"]
"#;
        fs::write(vk_dir.join("config.toml"), config_toml).expect("Failed to write config.toml");

        let config = load_config_with_env(root, no_env)
            .await
            .expect("Failed to load config");

        assert_eq!(config.model.name, "gemma3:27b");
        assert!(!config.model.supports_system_role);
        assert!(!config.model.supports_tool_calls);
        assert_eq!(config.budget.max_iterations, 6);
        assert_eq!(config.budget.max_global_iterations, 30);
        assert_eq!(config.budget.evaluate_attempts, 4);
        assert_eq!(config.budget.generate_attempts, 3, "Unset fields keep defaults");
        assert_eq!(config.verifier.kind, VerifierKind::Command);
        assert_eq!(config.verifier.program.as_deref(), Some("grammo-verify"));
        assert_eq!(config.verifier.timeout_secs, 15);
        assert_eq!(config.artifact.declaration_prefixes.len(), 3);
        assert_eq!(config.retry.max_attempts, 12);
    }

    #[tokio::test]
    async fn test_load_config_empty_directory() {
        let dir = tempdir().expect("Failed to create temp dir");

        let config = load_config_with_env(dir.path(), no_env)
            .await
            .expect("Should handle missing .verikit");

        assert_eq!(config, AppConfig::default());
    }

    #[tokio::test]
    async fn test_load_config_invalid_toml() {
        let dir = tempdir().expect("Failed to create temp dir");
        let vk_dir = dir.path().join(CONFIG_DIR);
        fs::create_dir_all(&vk_dir).expect("Failed to create .verikit");
        fs::write(vk_dir.join("config.toml"), "[budget\nmax_iterations = ")
            .expect("Failed to write config.toml");

        let result = load_config_with_env(dir.path(), no_env).await;

        if let Err(ConfigError::TomlParse { path, .. }) = result {
            assert!(path.ends_with("config.toml"));
        } else {
            panic!("Expected TomlParse error");
        }
    }

    #[tokio::test]
    async fn test_env_overrides_win_over_file() {
        let dir = tempdir().expect("Failed to create temp dir");
        let vk_dir = dir.path().join(CONFIG_DIR);
        fs::create_dir_all(&vk_dir).expect("Failed to create .verikit");
        fs::write(vk_dir.join("config.toml"), "[model]\nname = \"from-file\"\n")
            .expect("Failed to write config.toml");

        let env: HashMap<&str, &str> = [
            ("VERIKIT_MODEL", "from-env"),
            ("VERIKIT_MAX_GLOBAL_ITERATIONS", "30"),
        ]
        .into_iter()
        .collect();

        let config = load_config_with_env(dir.path(), |k| env.get(k).map(|v| v.to_string()))
            .await
            .expect("Failed to load config");

        assert_eq!(config.model.name, "from-env");
        assert_eq!(config.budget.max_global_iterations, 30);
    }

    #[tokio::test]
    async fn test_env_override_not_a_number() {
        let dir = tempdir().expect("Failed to create temp dir");

        let result = load_config_with_env(dir.path(), |k| {
            (k == "VERIKIT_MAX_ITERATIONS").then(|| "eight".to_string())
        })
        .await;

        match result {
            Err(ConfigError::InvalidValue { key, value, .. }) => {
                assert_eq!(key, "VERIKIT_MAX_ITERATIONS");
                assert_eq!(value, "eight");
            }
            other => panic!("Expected InvalidValue, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_budget_rejected() {
        let dir = tempdir().expect("Failed to create temp dir");
        let vk_dir = dir.path().join(CONFIG_DIR);
        fs::create_dir_all(&vk_dir).expect("Failed to create .verikit");
        fs::write(vk_dir.join("config.toml"), "[budget]\ngenerate_attempts = 9\n")
            .expect("Failed to write config.toml");

        let result = load_config_with_env(dir.path(), no_env).await;
        assert!(matches!(result, Err(ConfigError::InvalidConfig { .. })));
    }
}
