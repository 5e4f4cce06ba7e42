//! Plugin identity types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Build the lookup key for a plugin+version pair: `{id}:{version}`.
///
/// Empty inputs are allowed and produce a degenerate but deterministic key.
#[must_use]
pub fn cache_key(plugin_id: &str, version: &str) -> String {
    format!("{plugin_id}:{version}")
}

/// A plugin and version pair.
///
/// An empty `version` means "whatever the latest published version is".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PluginRef {
    /// Plugin identifier (e.g. `grafana-clock-panel`).
    pub id: String,
    /// Version string, possibly empty.
    #[serde(default)]
    pub version: String,
}

impl PluginRef {
    /// Create a new plugin reference.
    #[must_use]
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
        }
    }

    /// Create a reference to the latest version of a plugin.
    #[must_use]
    pub fn latest(id: impl Into<String>) -> Self {
        Self::new(id, String::new())
    }

    /// Whether this reference leaves the version unspecified.
    #[must_use]
    pub fn is_latest(&self) -> bool {
        self.version.is_empty() || self.version == "latest"
    }

    /// The `{id}:{version}` cache key for this reference.
    #[must_use]
    pub fn cache_key(&self) -> String {
        cache_key(&self.id, &self.version)
    }

    /// The versioned cache directory name: `{id}-{version}`.
    #[must_use]
    pub fn dir_name(&self) -> String {
        format!("{}-{}", self.id, self.version)
    }
}

impl fmt::Display for PluginRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.version.is_empty() {
            write!(f, "{}", self.id)
        } else {
            write!(f, "{}@{}", self.id, self.version)
        }
    }
}

/// Where a plugin comes from, which decides how much it is trusted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginClass {
    /// Bundled with the host.
    Core,
    /// Installed from the catalog or a URL.
    #[default]
    External,
    /// Served from the plugin CDN.
    Cdn,
}

impl PluginClass {
    /// Lowercase wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::External => "external",
            Self::Cdn => "cdn",
        }
    }
}

impl fmt::Display for PluginClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PluginClass {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "core" => Ok(Self::Core),
            "external" => Ok(Self::External),
            "cdn" => Ok(Self::Cdn),
            other => Err(CoreError::InvalidValue {
                kind: "plugin class",
                value: other.to_string(),
            }),
        }
    }
}
