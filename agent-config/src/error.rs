//! Configuration errors.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        /// File that failed to load.
        path: PathBuf,
        /// Source I/O error.
        source: std::io::Error,
    },
    /// The file is not valid TOML for the schema.
    #[error("failed to parse config: {source}")]
    Parse {
        /// Source TOML error.
        #[from]
        source: toml::de::Error,
    },
    /// An environment override could not be parsed.
    #[error("invalid value `{value}` for {key}")]
    InvalidEnv {
        /// Variable name.
        key: String,
        /// Rejected value.
        value: String,
    },
    /// A field holds a value outside its permitted range.
    #[error("invalid config field `{field}`: {reason}")]
    Invalid {
        /// Dotted field path.
        field: &'static str,
        /// Human-readable explanation.
        reason: String,
    },
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
