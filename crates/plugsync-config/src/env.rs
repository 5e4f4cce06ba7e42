//! Environment variable fallbacks.
//!
//! Environment variables never override a config file. They only fill in
//! fields that no file layer set.

use std::collections::HashMap;
use std::hash::BuildHasher;

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::merge::SetFields;

/// Prefix shared by every recognised variable.
pub const ENV_PREFIX: &str = "PLUGSYNC_";

#[derive(Clone, Copy)]
enum EnvKind {
    Str,
    Int,
    /// Comma-separated list.
    List,
}

struct EnvMapping {
    var_name: &'static str,
    field_path: &'static str,
    kind: EnvKind,
}

const ENV_MAPPINGS: &[EnvMapping] = &[
    EnvMapping {
        var_name: "PLUGSYNC_NODE_NAME",
        field_path: "node.name",
        kind: EnvKind::Str,
    },
    EnvMapping {
        var_name: "PLUGSYNC_NAMESPACE",
        field_path: "node.namespace",
        kind: EnvKind::Str,
    },
    EnvMapping {
        var_name: "PLUGSYNC_CACHE_DIR",
        field_path: "cache.dir",
        kind: EnvKind::Str,
    },
    EnvMapping {
        var_name: "PLUGSYNC_PROVIDERS",
        field_path: "providers.order",
        kind: EnvKind::List,
    },
    EnvMapping {
        var_name: "PLUGSYNC_CORE_PLUGINS_DIR",
        field_path: "providers.core_dir",
        kind: EnvKind::Str,
    },
    EnvMapping {
        var_name: "PLUGSYNC_CATALOG_URL",
        field_path: "providers.catalog.api_base",
        kind: EnvKind::Str,
    },
    EnvMapping {
        var_name: "PLUGSYNC_CLOUD_URL",
        field_path: "providers.cloud.api_base",
        kind: EnvKind::Str,
    },
    EnvMapping {
        var_name: "PLUGSYNC_DOWNLOAD_URL",
        field_path: "downloads.base_url",
        kind: EnvKind::Str,
    },
    EnvMapping {
        var_name: "PLUGSYNC_RECONCILE_TIMEOUT_SECS",
        field_path: "reconcile.timeout_secs",
        kind: EnvKind::Int,
    },
    EnvMapping {
        var_name: "PLUGSYNC_LOG_LEVEL",
        field_path: "logging.level",
        kind: EnvKind::Str,
    },
    EnvMapping {
        var_name: "PLUGSYNC_LOG_FORMAT",
        field_path: "logging.format",
        kind: EnvKind::Str,
    },
];

/// Snapshot of the `PLUGSYNC_*` variables in the process environment.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars()
        .filter(|(k, _)| k.starts_with(ENV_PREFIX))
        .collect()
}

/// Apply environment fallbacks to fields not in `set_by_files`.
///
/// Returns the number of variables applied.
///
/// # Errors
///
/// Returns [`ConfigError::EnvError`] if a numeric variable does not parse.
pub fn apply_env_fallbacks<S: BuildHasher>(
    merged: &mut toml::Value,
    set_by_files: &SetFields,
    env_vars: &HashMap<String, String, S>,
) -> ConfigResult<usize> {
    let mut count: usize = 0;

    for mapping in ENV_MAPPINGS {
        if set_by_files.contains(mapping.field_path) {
            continue;
        }
        let Some(raw) = env_vars.get(mapping.var_name) else {
            continue;
        };

        debug!(
            var = mapping.var_name,
            field = mapping.field_path,
            "applying env var fallback"
        );
        let value = coerce(mapping, raw)?;
        set_field(merged, mapping.field_path, value);
        count = count.saturating_add(1);
    }

    Ok(count)
}

fn coerce(mapping: &EnvMapping, raw: &str) -> ConfigResult<toml::Value> {
    match mapping.kind {
        EnvKind::Str => Ok(toml::Value::String(raw.to_owned())),
        EnvKind::Int => raw
            .trim()
            .parse::<i64>()
            .map(toml::Value::Integer)
            .map_err(|e| ConfigError::EnvError {
                var_name: mapping.var_name.to_owned(),
                message: format!("expected an integer: {e}"),
            }),
        EnvKind::List => Ok(toml::Value::Array(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| toml::Value::String(s.to_owned()))
                .collect(),
        )),
    }
}

/// Set a dotted path in the tree, creating intermediate tables.
fn set_field(root: &mut toml::Value, path: &str, value: toml::Value) {
    let mut current = root;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        let Some(table) = current.as_table_mut() else {
            return;
        };
        if segments.peek().is_none() {
            table.insert(segment.to_owned(), value);
            return;
        }
        current = table
            .entry(segment.to_owned())
            .or_insert(toml::Value::Table(toml::map::Map::new()));
    }
}
