#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! Layered configuration for plugsync.
//!
//! # Configuration Precedence
//!
//! From highest to lowest priority:
//!
//! 1. **Explicit file** (`plugsyncd --config <path>`)
//! 2. **User** (`~/.plugsync/config.toml`)
//! 3. **System** (`/etc/plugsync/config.toml`)
//! 4. **Environment variables** (`PLUGSYNC_*`), fallback only
//! 5. **Embedded defaults** (`defaults.toml` compiled into the binary)
//!
//! This crate depends on no other plugsync crate. Conversion into domain
//! types happens where the daemon wires components together.

/// Environment variable fallbacks.
pub mod env;
/// Configuration error types.
pub mod error;
/// Configuration file discovery and loading.
pub mod loader;
/// Deep merging of TOML layers.
pub mod merge;
/// Configuration struct definitions.
pub mod types;
/// Configuration validation rules.
pub mod validate;

use std::path::{Path, PathBuf};

pub use error::{ConfigError, ConfigResult};
pub use types::*;

impl Config {
    /// Load configuration with the full precedence chain.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if any config file is malformed or the final
    /// configuration fails validation.
    pub fn load(explicit: Option<&Path>) -> ConfigResult<Self> {
        loader::load(explicit, None)
    }

    /// Load a single file on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read, parsed, or fails
    /// validation.
    pub fn load_file(path: &Path) -> ConfigResult<Self> {
        loader::load_file(path)
    }

    /// The plugin cache root: `cache.dir`, or the platform data directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoHomeDir`] if no data directory can be found.
    pub fn cache_dir(&self) -> ConfigResult<PathBuf> {
        if let Some(dir) = &self.cache.dir {
            return Ok(dir.clone());
        }
        directories::ProjectDirs::from("io", "plugsync", "plugsync")
            .map(|d| d.data_dir().join("plugins"))
            .ok_or(ConfigError::NoHomeDir)
    }
}
