//! Config file discovery and layered loading.
//!
//! 1. Parse the embedded `defaults.toml`
//! 2. Merge `/etc/plugsync/config.toml` (system)
//! 3. Merge `~/.plugsync/config.toml` (user)
//! 4. Merge the explicit `--config` file, which must exist
//! 5. Apply `PLUGSYNC_*` env var fallbacks for fields no file set
//! 6. Deserialize and validate

use std::collections::HashMap;
use std::hash::BuildHasher;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::env::{apply_env_fallbacks, collect_env_vars};
use crate::error::{ConfigError, ConfigResult};
use crate::merge::{SetFields, deep_merge};
use crate::types::Config;
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Maximum allowed config file size (1 MiB).
const MAX_CONFIG_FILE_SIZE: usize = 1_048_576;

/// System-wide config file.
const SYSTEM_CONFIG: &str = "/etc/plugsync/config.toml";

/// Load configuration with the full precedence chain.
///
/// `home_override` replaces the user's home directory for discovering
/// `~/.plugsync/config.toml`.
///
/// # Errors
///
/// Returns a [`ConfigError`] if a config file is malformed, the explicit
/// file is missing, or the merged configuration fails validation.
pub fn load(explicit: Option<&Path>, home_override: Option<&Path>) -> ConfigResult<Config> {
    let home = match home_override {
        Some(h) => h.to_path_buf(),
        None => home_directory()?,
    };
    let layers = [
        PathBuf::from(SYSTEM_CONFIG),
        home.join(".plugsync").join("config.toml"),
    ];
    load_layers(&layers, explicit, &collect_env_vars())
}

/// Load from explicit layer paths and an explicit environment.
///
/// Missing `layers` are skipped; a missing `explicit` file is an error.
///
/// # Errors
///
/// See [`load`].
pub fn load_layers<S: BuildHasher>(
    layers: &[PathBuf],
    explicit: Option<&Path>,
    env_vars: &HashMap<String, String, S>,
) -> ConfigResult<Config> {
    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
            path: "<embedded defaults>".to_owned(),
            source: e,
        })?;
    let mut set_by_files = SetFields::new();

    for path in layers {
        if let Some(overlay) = try_load_file(path)? {
            deep_merge(&mut merged, &overlay, "", &mut set_by_files);
            info!(path = %path.display(), "loaded config layer");
        }
    }

    if let Some(path) = explicit {
        let overlay = read_toml(path)?;
        deep_merge(&mut merged, &overlay, "", &mut set_by_files);
        info!(path = %path.display(), "loaded config file");
    }

    let env_count = apply_env_fallbacks(&mut merged, &set_by_files, env_vars)?;
    if env_count > 0 {
        debug!(count = env_count, "applied environment variable fallbacks");
    }

    let config: Config =
        merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError {
                path: "<merged config>".to_owned(),
                source: e,
            })?;

    validate::validate(&config)?;
    Ok(config)
}

/// Load a single file on top of the defaults (no layering, no env).
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read, parsed, or fails
/// validation.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    load_layers(&[], Some(path), &HashMap::<String, String>::new())
}

/// Try to load a file, returning `None` if it doesn't exist.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    match read_toml(path) {
        Ok(v) => Ok(Some(v)),
        Err(ConfigError::ReadError { source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            debug!(path = %path.display(), "config file not found, skipping");
            Ok(None)
        },
        Err(e) => Err(e),
    }
}

fn read_toml(path: &Path) -> ConfigResult<toml::Value> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.display().to_string(),
        source: e,
    })?;

    if content.len() > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!(
                "config file is {} bytes, exceeding the {MAX_CONFIG_FILE_SIZE} byte limit",
                content.len(),
            ),
        });
    }

    toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })
}

fn home_directory() -> ConfigResult<PathBuf> {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .ok_or(ConfigError::NoHomeDir)
}
