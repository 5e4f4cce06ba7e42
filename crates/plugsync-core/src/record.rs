//! The declarative install record.
//!
//! An [`InstallRecord`] is the versioned resource stored in the shared
//! record store: "this plugin at this version should be present". Its
//! `resource_version` is the compare-and-swap token for writes.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::install::{PluginInstall, SourceTag};
use crate::plugin::{PluginClass, PluginRef};
use crate::status::InstallStatus;

/// Annotation key recording which source declared a record.
pub const SOURCE_ANNOTATION: &str = "plugsync.io/install-source";

/// Namespaced record identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    /// Namespace the record lives in.
    pub namespace: String,
    /// Record name, unique within the namespace.
    pub name: String,
}

impl ResourceKey {
    /// Create a new key.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Record metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Record name.
    pub name: String,
    /// Record namespace.
    pub namespace: String,
    /// Opaque concurrency token, assigned by the store.
    #[serde(default)]
    pub resource_version: String,
    /// Free-form annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// How a record's plugin should be fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// From the plugin catalog.
    Catalog,
    /// From the plugin CDN.
    Cdn,
    /// From an explicit archive URL.
    Url,
}

impl SourceType {
    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Catalog => "catalog",
            Self::Cdn => "cdn",
            Self::Url => "url",
        }
    }

    /// Pick the source type implied by an install declaration.
    #[must_use]
    pub fn for_install(install: &PluginInstall) -> Self {
        if install.url.is_some() {
            Self::Url
        } else if install.class == PluginClass::Cdn {
            Self::Cdn
        } else {
            Self::Catalog
        }
    }
}

impl FromStr for SourceType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "catalog" => Ok(Self::Catalog),
            "cdn" => Ok(Self::Cdn),
            "url" => Ok(Self::Url),
            other => Err(CoreError::InvalidValue {
                kind: "install source type",
                value: other.to_string(),
            }),
        }
    }
}

/// Desired state carried by a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallSpec {
    /// Plugin identifier.
    pub id: String,
    /// Desired version, empty for latest.
    #[serde(default)]
    pub version: String,
    /// Custom archive URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Class to install as.
    #[serde(default)]
    pub class: PluginClass,
    /// Bundling parent, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Raw source type string (`catalog`, `cdn`, `url`). Kept as a string so
    /// that a record with an unknown type still deserializes and can be
    /// reported as failed.
    #[serde(default)]
    pub source_type: String,
}

impl InstallSpec {
    /// Parsed source type.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidValue`] for an unrecognised type.
    pub fn source_type(&self) -> Result<SourceType, CoreError> {
        self.source_type.parse()
    }

    /// Whether this record declares a (non-empty) parent.
    #[must_use]
    pub fn has_parent(&self) -> bool {
        self.parent_id.as_deref().is_some_and(|p| !p.is_empty())
    }
}

/// A declarative install record with its per-node status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallRecord {
    /// Identity and concurrency metadata.
    pub metadata: ObjectMeta,
    /// Desired state.
    pub spec: InstallSpec,
    /// Observed state, written by nodes.
    #[serde(default)]
    pub status: InstallStatus,
}

impl InstallRecord {
    /// Build a new (unstored) record from an install declaration.
    #[must_use]
    pub fn from_install(namespace: impl Into<String>, install: &PluginInstall) -> Self {
        let mut annotations = BTreeMap::new();
        annotations.insert(SOURCE_ANNOTATION.to_string(), install.source.to_string());
        Self {
            metadata: ObjectMeta {
                name: install.id.clone(),
                namespace: namespace.into(),
                resource_version: String::new(),
                annotations,
            },
            spec: InstallSpec {
                id: install.id.clone(),
                version: install.version.clone(),
                url: install.url.clone(),
                class: install.class,
                parent_id: install.parent_id.clone(),
                source_type: SourceType::for_install(install).as_str().to_string(),
            },
            status: InstallStatus::default(),
        }
    }

    /// The record's key.
    #[must_use]
    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(self.metadata.namespace.clone(), self.metadata.name.clone())
    }

    /// Source that declared this record.
    #[must_use]
    pub fn source(&self) -> SourceTag {
        self.metadata
            .annotations
            .get(SOURCE_ANNOTATION)
            .map_or(SourceTag::Unknown, |s| SourceTag::parse(s))
    }

    /// The plugin reference this record asks for.
    #[must_use]
    pub fn plugin_ref(&self) -> PluginRef {
        PluginRef::new(self.spec.id.clone(), self.spec.version.clone())
    }
}
