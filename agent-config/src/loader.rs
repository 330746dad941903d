//! Configuration loading from TOML files and environment overrides.

use std::path::Path;
use std::str::FromStr;

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::schema::ToolkitConfig;

/// Prefix shared by every environment override.
pub const ENV_PREFIX: &str = "AGENT_TOOLKIT_";

impl ToolkitConfig {
    /// Parses a TOML document; missing sections fall back to defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed TOML.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Reads, parses and validates a TOML file, then applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&text)?;
        config.apply_env()?;
        config.validate()?;
        debug!(path = %path.display(), "loaded toolkit config");
        Ok(config)
    }

    /// Applies `AGENT_TOOLKIT_*` overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] for unparsable values.
    pub fn apply_env(&mut self) -> ConfigResult<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] for unparsable values.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |suffix: &str| {
            let key = format!("{ENV_PREFIX}{suffix}");
            lookup(&key).map(|value| (key, value))
        };

        if let Some(entry) = get("MAX_ARGUMENT_CHARS") {
            self.limits.max_argument_chars = parse_env(entry)?;
        }
        if let Some(entry) = get("MAX_BATCH_CALLS") {
            self.limits.max_batch_calls = parse_env(entry)?;
        }
        if let Some(entry) = get("MAX_SUGGESTIONS") {
            self.limits.max_suggestions = parse_env(entry)?;
        }
        if let Some(entry) = get("AUDIT_WINDOW") {
            self.limits.audit_window = parse_env(entry)?;
        }
        if let Some(entry) = get("SANDBOX_TIMEOUT_MS") {
            self.limits.sandbox_timeout_ms = parse_env(entry)?;
        }
        if let Some((_, value)) = get("PROTECTED_ROOTS") {
            self.path_guard.protected_roots = std::env::split_paths(&value).collect();
        }
        if let Some((_, value)) = get("LOG") {
            self.logging.filter = value;
        }
        Ok(())
    }
}

fn parse_env<T: FromStr>((key, value): (String, String)) -> ConfigResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { key, value })
}
