use std::io;
use thiserror::Error;

/// Why a configuration could not be produced.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A config layer exists but could not be read.
    #[error("cannot read config layer {path}: {source}")]
    ReadError {
        /// Layer path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A config layer is not valid TOML, or has a value of the wrong shape.
    #[error("cannot parse config layer {path}: {source}")]
    ParseError {
        /// Layer path.
        path: String,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// The merged config is inconsistent.
    #[error("invalid {field}: {message}")]
    ValidationError {
        /// Dotted field name, e.g. `providers.order`.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// A `PLUGSYNC_*` override could not be applied.
    #[error("invalid value in ${var_name}: {message}")]
    EnvError {
        /// Variable name.
        var_name: String,
        /// What is wrong with it.
        message: String,
    },

    /// No platform data directory for the default cache location.
    #[error("no home directory to place the plugin cache under")]
    NoHomeDir,
}

/// Result of config loading and validation.
pub type ConfigResult<T> = Result<T, ConfigError>;
