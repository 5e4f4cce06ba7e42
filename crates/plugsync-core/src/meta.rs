//! Plugin metadata document.
//!
//! [`PluginMeta`] is what a metadata provider answers with: enough to decide
//! how to install a plugin (CDN location, signature) and what it brings
//! along (children, dependencies) without downloading it.

use serde::{Deserialize, Serialize};

use crate::manifest::PluginManifest;
use crate::plugin::{PluginClass, PluginRef};

/// Metadata describing one plugin version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginMeta {
    /// Plugin identifier.
    pub id: String,
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    /// Plugin type (`panel`, `datasource`, `app`, ...).
    #[serde(default, rename = "type")]
    pub plugin_type: String,
    /// Concrete version.
    #[serde(default)]
    pub version: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Class the plugin would be loaded as.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<PluginClass>,
    /// IDs of plugins bundled inside this one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
    /// ID of the bundling plugin, if this is a child.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Base URL of the plugin assets on the CDN.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cdn_url: Option<String>,
    /// Signature details, if the plugin is signed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignatureInfo>,
    /// Other plugins this one requires.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<PluginDependency>,
}

impl PluginMeta {
    /// Minimal metadata with only an ID and version.
    #[must_use]
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            ..Self::default()
        }
    }

    /// Set the declared children.
    #[must_use]
    pub fn with_children<I, S>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.children = children.into_iter().map(Into::into).collect();
        self
    }

    /// Set the parent plugin ID.
    #[must_use]
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Set the class.
    #[must_use]
    pub fn with_class(mut self, class: PluginClass) -> Self {
        self.class = Some(class);
        self
    }

    /// Build metadata from an on-disk manifest.
    #[must_use]
    pub fn from_manifest(manifest: &PluginManifest) -> Self {
        Self {
            id: manifest.id.clone(),
            name: manifest.name.clone(),
            plugin_type: manifest.plugin_type.clone(),
            version: manifest.info.version.clone(),
            description: manifest.info.description.clone(),
            class: None,
            children: Vec::new(),
            parent_id: None,
            cdn_url: None,
            signature: None,
            dependencies: manifest
                .dependencies
                .plugins
                .iter()
                .map(|d| PluginDependency {
                    id: d.id.clone(),
                    version: d.version.clone(),
                })
                .collect(),
        }
    }

    /// This metadata's plugin reference.
    #[must_use]
    pub fn plugin_ref(&self) -> PluginRef {
        PluginRef::new(self.id.clone(), self.version.clone())
    }
}

/// A plugin dependency declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDependency {
    /// Required plugin ID.
    pub id: String,
    /// Required version, empty for latest.
    #[serde(default)]
    pub version: String,
}

/// Signature information published with a plugin version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureInfo {
    /// Signature type (`grafana`, `commercial`, `community`, `private`).
    #[serde(default)]
    pub signature_type: String,
    /// Signing organisation.
    #[serde(default)]
    pub signature_org: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_minimal() {
        let meta: PluginMeta = serde_json::from_str(r#"{"id":"p"}"#).unwrap();
        assert_eq!(meta.id, "p");
        assert!(meta.version.is_empty());
        assert!(meta.children.is_empty());
        assert!(meta.parent_id.is_none());
    }

    #[test]
    fn serialize_uses_camel_case() {
        let meta = PluginMeta::new("app", "1.0.0").with_parent("bundle");
        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains("\"parentId\":\"bundle\""));
        assert!(!json.contains("cdnUrl"));
    }

    #[test]
    fn builder_helpers() {
        let meta = PluginMeta::new("app", "1.0.0")
            .with_children(["a", "b"])
            .with_class(PluginClass::Cdn);
        assert_eq!(meta.children, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(meta.class, Some(PluginClass::Cdn));
        assert_eq!(meta.plugin_ref(), PluginRef::new("app", "1.0.0"));
    }
}
