//! Configuration types for plugsync.
//!
//! Every struct implements [`Default`] matching `defaults.toml`, so a bare
//! `[section]` header produces a working configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Identity of this node.
    pub node: NodeSection,
    /// Plugin artifact cache.
    pub cache: CacheSection,
    /// Metadata provider chain.
    pub providers: ProvidersSection,
    /// Artifact downloads.
    pub downloads: DownloadsSection,
    /// Install reconciliation.
    pub reconcile: ReconcileSection,
    /// Logging level, format, and per-crate directives.
    pub logging: LoggingSection,
    /// Plugins to make available at startup.
    pub preinstall: Vec<PreinstallEntry>,
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// Identity of this node within the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    /// Node name. Keys this node's entry in install record status.
    pub name: String,
    /// Namespace install records are read from and written to.
    pub namespace: String,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            name: "plugsync-0".to_owned(),
            namespace: "default".to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Plugin artifact cache location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    /// Cache root. `None` uses the platform data directory.
    pub dir: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

/// Names accepted in [`ProvidersSection::order`].
pub const PROVIDER_NAMES: &[&str] = &["local", "core", "cloud", "catalog"];

/// Metadata provider chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersSection {
    /// Providers to consult, in order.
    pub order: Vec<String>,
    /// How often expired metadata cache entries are swept.
    pub sweep_interval_secs: u64,
    /// Directory of bundled core plugins. Required when `core` is in `order`.
    pub core_dir: Option<PathBuf>,
    /// TTL of answers from the local registry.
    pub local_ttl_secs: u64,
    /// Public catalog API.
    pub catalog: CatalogSection,
    /// Cloud stack inventory API.
    pub cloud: CloudSection,
}

impl Default for ProvidersSection {
    fn default() -> Self {
        Self {
            order: vec!["local".to_owned(), "catalog".to_owned()],
            sweep_interval_secs: 600,
            core_dir: None,
            local_ttl_secs: 3600,
            catalog: CatalogSection::default(),
            cloud: CloudSection::default(),
        }
    }
}

impl ProvidersSection {
    /// Sweep interval as a [`Duration`].
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Public catalog API settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSection {
    /// API base URL; requests go to `{api_base}/{id}/versions/{version}`.
    pub api_base: String,
    /// TTL of catalog answers.
    pub ttl_secs: u64,
    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl Default for CatalogSection {
    fn default() -> Self {
        Self {
            api_base: "https://grafana.com/api/plugins".to_owned(),
            ttl_secs: 3600,
            timeout_secs: 10,
        }
    }
}

/// Cloud stack inventory settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudSection {
    /// Inventory API base URL. Required when `cloud` is in `order`.
    pub api_base: Option<String>,
    /// How long one inventory snapshot is trusted.
    pub ttl_secs: u64,
    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl Default for CloudSection {
    fn default() -> Self {
        Self {
            api_base: None,
            ttl_secs: 300,
            timeout_secs: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// Downloads
// ---------------------------------------------------------------------------

/// Artifact download settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadsSection {
    /// Base URL; archives come from `{base_url}/{id}/versions/{version}/download`.
    pub base_url: String,
    /// Largest archive accepted, in bytes.
    pub max_archive_bytes: u64,
    /// Whole-download timeout.
    pub timeout_secs: u64,
}

impl Default for DownloadsSection {
    fn default() -> Self {
        Self {
            base_url: "https://grafana.com/api/plugins".to_owned(),
            max_archive_bytes: 536_870_912,
            timeout_secs: 300,
        }
    }
}

// ---------------------------------------------------------------------------
// Reconcile
// ---------------------------------------------------------------------------

/// Install reconciliation knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileSection {
    /// Deadline for handling a single event.
    pub timeout_secs: u64,
    /// Attempts at writing node status before giving up.
    pub status_retries: u32,
    /// Requeue delay after a failed removal.
    pub delete_requeue_secs: u64,
    /// Requeue delay after a failed child registration.
    pub child_requeue_secs: u64,
}

impl Default for ReconcileSection {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            status_retries: 3,
            delete_requeue_secs: 30,
            child_requeue_secs: 10,
        }
    }
}

impl ReconcileSection {
    /// Event deadline as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Base level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Output format (`pretty`, `compact`, `json`).
    pub format: String,
    /// Extra filter directives (e.g. `plugsync_meta=debug`).
    pub directives: Vec<String>,
    /// Write rotated log files here instead of stderr.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "pretty".to_owned(),
            directives: Vec::new(),
            directory: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Preinstall
// ---------------------------------------------------------------------------

/// A plugin to make available at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreinstallEntry {
    /// Plugin ID.
    pub id: String,
    /// Version; empty for latest.
    pub version: String,
    /// Custom archive URL.
    pub url: Option<String>,
}
