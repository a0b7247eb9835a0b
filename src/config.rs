//! Configuration for the real process executor
//!
//! Values are layered: built-in defaults, then an optional TOML document,
//! then `CMDEXEC_*` environment variables.
//!
//! ```toml
//! default_timeout = "30s"
//! preserve_env = ["PATH", "HOME"]
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const ENV_DEFAULT_TIMEOUT: &str = "CMDEXEC_DEFAULT_TIMEOUT";
pub const ENV_PRESERVE_ENV: &str = "CMDEXEC_PRESERVE_ENV";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {var}: {message}")]
    InvalidEnv { var: &'static str, message: String },
}

/// Settings applied by [`TokioExecutor`](crate::TokioExecutor) to every
/// command it creates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecConfig {
    /// Timeout for commands that did not set one explicitly
    #[serde(with = "humantime_serde")]
    pub default_timeout: Option<Duration>,

    /// Parent environment variables kept when a command's environment is
    /// replaced through `set_environ`
    pub preserve_env: Vec<String>,
}

impl ExecConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Load a TOML file and apply environment overrides on top.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&contents)?.with_env_overrides()
    }

    /// Defaults with environment overrides applied.
    ///
    /// Invalid values are logged and ignored so that a bad variable never
    /// prevents commands from running.
    pub fn from_env() -> Self {
        match Self::default().with_env_overrides() {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Ignoring executor environment configuration: {}", e);
                Self::default()
            }
        }
    }

    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides_from(|var| std::env::var(var).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_DEFAULT_TIMEOUT) {
            let raw = raw.trim();
            self.default_timeout = if raw.is_empty() || raw == "none" {
                None
            } else {
                let timeout = humantime_serde::re::humantime::parse_duration(raw).map_err(|e| {
                    ConfigError::InvalidEnv {
                        var: ENV_DEFAULT_TIMEOUT,
                        message: e.to_string(),
                    }
                })?;
                Some(timeout)
            };
        }

        if let Some(raw) = lookup(ENV_PRESERVE_ENV) {
            self.preserve_env = raw
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(String::from)
                .collect();
        }

        Ok(self)
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    pub fn with_preserved_env<I, S>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.preserve_env = vars.into_iter().map(|s| s.as_ref().to_string()).collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ExecConfig::default();
        assert_eq!(config.default_timeout, None);
        assert!(config.preserve_env.is_empty());
    }

    #[test]
    fn test_from_toml_str() {
        let config = ExecConfig::from_toml_str(
            r#"
            default_timeout = "1m 30s"
            preserve_env = ["PATH", "HOME"]
            "#,
        )
        .unwrap();

        assert_eq!(config.default_timeout, Some(Duration::from_secs(90)));
        assert_eq!(config.preserve_env, vec!["PATH", "HOME"]);
    }

    #[test]
    fn test_from_toml_str_partial() {
        let config = ExecConfig::from_toml_str(r#"preserve_env = ["PATH"]"#).unwrap();
        assert_eq!(config.default_timeout, None);
        assert_eq!(config.preserve_env, vec!["PATH"]);
    }

    #[test]
    fn test_from_toml_str_invalid_duration() {
        let result = ExecConfig::from_toml_str(r#"default_timeout = "soon""#);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_env_overrides_take_precedence() {
        let config = ExecConfig::default()
            .with_default_timeout(Duration::from_secs(5))
            .with_overrides_from(lookup(&[
                (ENV_DEFAULT_TIMEOUT, "250ms"),
                (ENV_PRESERVE_ENV, "PATH, LANG,,"),
            ]))
            .unwrap();

        assert_eq!(config.default_timeout, Some(Duration::from_millis(250)));
        assert_eq!(config.preserve_env, vec!["PATH", "LANG"]);
    }

    #[test]
    fn test_env_override_none_clears_timeout() {
        let config = ExecConfig::default()
            .with_default_timeout(Duration::from_secs(5))
            .with_overrides_from(lookup(&[(ENV_DEFAULT_TIMEOUT, "none")]))
            .unwrap();
        assert_eq!(config.default_timeout, None);
    }

    #[test]
    fn test_invalid_env_override() {
        let result =
            ExecConfig::default().with_overrides_from(lookup(&[(ENV_DEFAULT_TIMEOUT, "later")]));
        match result {
            Err(ConfigError::InvalidEnv { var, .. }) => assert_eq!(var, ENV_DEFAULT_TIMEOUT),
            other => panic!("Expected InvalidEnv, got {:?}", other),
        }
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"default_timeout = "2s""#).unwrap();

        let config = ExecConfig::load(file.path()).unwrap();
        // CMDEXEC_DEFAULT_TIMEOUT is never set by the test suite
        assert_eq!(config.default_timeout, Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_load_missing_file() {
        let result = ExecConfig::load(Path::new("/nonexistent/cmdexec.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
