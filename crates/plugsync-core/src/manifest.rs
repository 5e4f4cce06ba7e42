//! On-disk plugin manifest (`plugin.json`).
//!
//! Every cached plugin directory carries a manifest. Only a handful of
//! fields matter for acquisition: the ID, `info.version`, and declared
//! plugin dependencies. Unknown fields are ignored.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::plugin::PluginRef;

/// Standard plugin manifest file name.
pub const MANIFEST_FILE_NAME: &str = "plugin.json";

/// A plugin manifest loaded from `plugin.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Plugin identifier.
    pub id: String,
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    /// Plugin type.
    #[serde(default, rename = "type")]
    pub plugin_type: String,
    /// Version and descriptive info.
    #[serde(default)]
    pub info: ManifestInfo,
    /// Declared dependencies.
    #[serde(default)]
    pub dependencies: ManifestDependencies,
}

/// The `info` block of a manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestInfo {
    /// Plugin version.
    #[serde(default)]
    pub version: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// The `dependencies` block of a manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestDependencies {
    /// Other plugins that must be installed alongside this one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<PluginRef>,
}

impl PluginManifest {
    /// Minimal manifest with an ID and version.
    #[must_use]
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            info: ManifestInfo {
                version: version.into(),
                description: None,
            },
            ..Self::default()
        }
    }

    /// Add a plugin dependency.
    #[must_use]
    pub fn with_dependency(mut self, dep: PluginRef) -> Self {
        self.dependencies.plugins.push(dep);
        self
    }

    /// Version declared in `info.version`.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.info.version
    }

    /// Whether this manifest declares exactly the given ID and version.
    #[must_use]
    pub fn matches(&self, plugin_id: &str, version: &str) -> bool {
        self.id == plugin_id && self.info.version == version
    }

    /// Read the manifest from `{dir}/plugin.json`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ManifestRead`] if the file cannot be read and
    /// [`CoreError::ManifestParse`] if it is not a valid manifest.
    pub fn load_from_dir(dir: &Path) -> CoreResult<Self> {
        Self::load(&dir.join(MANIFEST_FILE_NAME))
    }

    /// Read a manifest file.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ManifestRead`] if the file cannot be read and
    /// [`CoreError::ManifestParse`] if it is not a valid manifest.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read(path).map_err(|e| CoreError::ManifestRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(path, &content)
    }

    /// Write the manifest as `{dir}/plugin.json`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ManifestRead`] wrapping the I/O failure.
    pub fn write_to_dir(&self, dir: &Path) -> CoreResult<()> {
        let path = dir.join(MANIFEST_FILE_NAME);
        let json = serde_json::to_vec_pretty(self).map_err(|e| CoreError::ManifestParse {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&path, json).map_err(|e| CoreError::ManifestRead { path, source: e })
    }

    fn parse(path: &Path, content: &[u8]) -> CoreResult<Self> {
        let manifest: Self =
            serde_json::from_slice(content).map_err(|e| CoreError::ManifestParse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        if manifest.id.is_empty() {
            return Err(CoreError::ManifestParse {
                path: path.to_path_buf(),
                message: "manifest has an empty id".to_string(),
            });
        }
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_grafana_style_manifest() {
        let json = r#"{
            "id": "grafana-clock-panel",
            "type": "panel",
            "name": "Clock",
            "info": { "version": "2.1.0", "description": "Clock panel", "author": {"name": "x"} },
            "dependencies": {
                "grafanaDependency": ">=10.0.0",
                "plugins": [{ "id": "grafana-piechart-panel", "version": "1.6.0", "type": "panel" }]
            }
        }"#;
        let m: PluginManifest = serde_json::from_str(json).unwrap();
        assert_eq!(m.id, "grafana-clock-panel");
        assert_eq!(m.version(), "2.1.0");
        assert_eq!(m.plugin_type, "panel");
        assert_eq!(
            m.dependencies.plugins,
            vec![PluginRef::new("grafana-piechart-panel", "1.6.0")]
        );
    }

    #[test]
    fn write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let m = PluginManifest::new("p", "1.0.0").with_dependency(PluginRef::latest("dep"));
        m.write_to_dir(dir.path()).unwrap();

        let loaded = PluginManifest::load_from_dir(dir.path()).unwrap();
        assert_eq!(loaded, m);
        assert!(loaded.matches("p", "1.0.0"));
        assert!(!loaded.matches("p", "1.0.1"));
    }

    #[test]
    fn missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = PluginManifest::load_from_dir(dir.path()).unwrap_err();
        assert!(matches!(err, CoreError::ManifestRead { .. }));
    }

    #[test]
    fn malformed_or_empty_id_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE_NAME), b"{not json").unwrap();
        assert!(matches!(
            PluginManifest::load_from_dir(dir.path()).unwrap_err(),
            CoreError::ManifestParse { .. }
        ));

        std::fs::write(dir.path().join(MANIFEST_FILE_NAME), br#"{"id":""}"#).unwrap();
        assert!(matches!(
            PluginManifest::load_from_dir(dir.path()).unwrap_err(),
            CoreError::ManifestParse { .. }
        ));
    }
}
