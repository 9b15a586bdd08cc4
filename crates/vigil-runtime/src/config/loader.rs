//! Configuration loader with hierarchical merging.
//!
//! # Load Order
//!
//! 1. Default values (compile-time)
//! 2. Global config (`~/.vigil/config.toml`)
//! 3. Project config (`<root>/.vigil/config.toml`)
//! 4. Environment variables (`VIGIL_*`)
//!
//! Each layer overrides the previous.

use super::{default_config_path, ConfigError, VigilConfig, PROJECT_CONFIG_DIR, PROJECT_CONFIG_FILE};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Helper macro for parsing boolean environment variables.
macro_rules! parse_env_bool {
    ($field:expr, $var:literal) => {
        if let Ok(val) = std::env::var($var) {
            $field = parse_bool(&val)
                .ok_or_else(|| ConfigError::invalid_env_var($var, "expected bool"))?;
        }
    };
}

/// Configuration loader with builder pattern.
///
/// # Example
///
/// ```no_run
/// use vigil_runtime::config::ConfigLoader;
///
/// let config = ConfigLoader::new()
///     .with_project_root("/srv/control-center")
///     .skip_env_vars()
///     .load()?;
/// # Ok::<(), vigil_runtime::config::ConfigError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    /// Global config file path (defaults to ~/.vigil/config.toml).
    global_config_path: Option<PathBuf>,

    /// Project root directory.
    project_root: Option<PathBuf>,

    /// Skip environment variable loading.
    skip_env: bool,

    /// Skip global config loading.
    skip_global: bool,

    /// Skip project config loading.
    skip_project: bool,
}

impl ConfigLoader {
    /// Creates a new loader with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a custom global config path.
    #[must_use]
    pub fn with_global_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.global_config_path = Some(path.into());
        self
    }

    /// Sets the project root directory.
    ///
    /// Project config will be loaded from `<project_root>/.vigil/config.toml`.
    #[must_use]
    pub fn with_project_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.project_root = Some(path.into());
        self
    }

    /// Skips environment variable loading.
    #[must_use]
    pub fn skip_env_vars(mut self) -> Self {
        self.skip_env = true;
        self
    }

    /// Skips global config loading.
    #[must_use]
    pub fn skip_global_config(mut self) -> Self {
        self.skip_global = true;
        self
    }

    /// Skips project config loading.
    #[must_use]
    pub fn skip_project_config(mut self) -> Self {
        self.skip_project = true;
        self
    }

    /// Loads and merges configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if any config file exists but cannot be parsed,
    /// or an environment variable holds an invalid value.
    /// Missing config files are silently ignored.
    pub fn load(&self) -> Result<VigilConfig, ConfigError> {
        let mut config = VigilConfig::default();

        if !self.skip_global {
            let global_path = self
                .global_config_path
                .clone()
                .unwrap_or_else(default_config_path);

            if let Some(global_config) = load_file(&global_path)? {
                debug!(path = %global_path.display(), "Loaded global config");
                config.merge(&global_config);
            }
        }

        if !self.skip_project {
            if let Some(ref project_root) = self.project_root {
                let project_config_path = project_root
                    .join(PROJECT_CONFIG_DIR)
                    .join(PROJECT_CONFIG_FILE);

                if let Some(project_config) = load_file(&project_config_path)? {
                    debug!(
                        path = %project_config_path.display(),
                        project = %project_root.display(),
                        "Loaded project config"
                    );
                    config.merge(&project_config);
                }
            }
        }

        if !self.skip_env {
            apply_env_vars(&mut config)?;
        }

        Ok(config)
    }
}

/// Loads a config file, returning None if it doesn't exist.
fn load_file(path: &Path) -> Result<Option<VigilConfig>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
    let config = VigilConfig::from_toml(&content).map_err(|e| ConfigError::parse_toml(path, e))?;

    Ok(Some(config))
}

/// Applies environment variable overrides.
fn apply_env_vars(config: &mut VigilConfig) -> Result<(), ConfigError> {
    parse_env_bool!(config.debug, "VIGIL_DEBUG");
    parse_env_bool!(config.audit.enabled, "VIGIL_AUDIT_ENABLED");

    if let Ok(val) = std::env::var("VIGIL_INVARIANT_MODE") {
        config.auth.invariant_mode = val
            .parse()
            .map_err(|msg: String| ConfigError::invalid_env_var("VIGIL_INVARIANT_MODE", msg))?;
    }

    if let Ok(val) = std::env::var("VIGIL_OPEN_TIMEOUT_MS") {
        config.realtime.open_timeout_ms = val.trim().parse().map_err(|_| {
            ConfigError::invalid_env_var("VIGIL_OPEN_TIMEOUT_MS", "expected milliseconds")
        })?;
    }

    if let Ok(val) = std::env::var("VIGIL_AUDIT_ORIGIN") {
        config.audit.origin = val;
    }

    Ok(())
}

/// Parses a boolean from string.
///
/// Accepts: "true", "false", "1", "0", "yes", "no", "on", "off" (case-insensitive).
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use vigil_auth::InvariantMode;

    fn create_config_file(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join("config.toml");
        std::fs::write(&path, content).expect("write config");
        path
    }

    #[test]
    fn load_defaults_only() {
        let config = ConfigLoader::new()
            .skip_global_config()
            .skip_project_config()
            .skip_env_vars()
            .load()
            .expect("load");

        assert_eq!(config, VigilConfig::default());
    }

    #[test]
    fn load_global_config() {
        let temp = TempDir::new().expect("tempdir");
        let config_path = create_config_file(
            temp.path(),
            r#"
debug = true

[audit]
origin = "state-hq"
"#,
        );

        let config = ConfigLoader::new()
            .with_global_config(&config_path)
            .skip_project_config()
            .skip_env_vars()
            .load()
            .expect("load");

        assert!(config.debug);
        assert_eq!(config.audit.origin, "state-hq");
    }

    #[test]
    fn load_project_overrides_global() {
        let global_temp = TempDir::new().expect("tempdir");
        let project_temp = TempDir::new().expect("tempdir");

        let vigil_dir = project_temp.path().join(".vigil");
        std::fs::create_dir_all(&vigil_dir).expect("mkdir");

        let global_path = create_config_file(
            global_temp.path(),
            r#"
debug = true

[realtime]
open_timeout_ms = 4000
backoff_max_ms = 8000
"#,
        );

        create_config_file(
            &vigil_dir,
            r#"
[auth]
invariant_mode = "panic"

[realtime]
open_timeout_ms = 1500
"#,
        );

        let config = ConfigLoader::new()
            .with_global_config(&global_path)
            .with_project_root(project_temp.path())
            .skip_env_vars()
            .load()
            .expect("load");

        assert!(config.debug);
        assert_eq!(config.realtime.backoff_max_ms, 8000);
        assert_eq!(config.realtime.open_timeout_ms, 1500);
        assert_eq!(config.auth.invariant_mode, InvariantMode::Panic);
    }

    #[test]
    fn missing_config_files_ok() {
        let config = ConfigLoader::new()
            .with_global_config("/nonexistent/path/config.toml")
            .with_project_root("/nonexistent/project")
            .skip_env_vars()
            .load()
            .expect("load");

        assert_eq!(config, VigilConfig::default());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let temp = TempDir::new().expect("tempdir");
        let path = create_config_file(temp.path(), "[realtime\nopen_timeout_ms = ");

        let err = ConfigLoader::new()
            .with_global_config(&path)
            .skip_project_config()
            .skip_env_vars()
            .load()
            .expect_err("malformed toml");
        assert!(matches!(err, ConfigError::ParseToml { .. }));
    }

    #[test]
    fn parse_bool_values() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("1"), Some(true));
        assert_eq!(parse_bool("yes"), Some(true));
        assert_eq!(parse_bool("on"), Some(true));

        assert_eq!(parse_bool("false"), Some(false));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("no"), Some(false));
        assert_eq!(parse_bool("off"), Some(false));

        assert_eq!(parse_bool("maybe"), None);
    }
}
