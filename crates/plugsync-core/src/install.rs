//! Desired install declarations.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::plugin::{PluginClass, PluginRef};

/// Why an install record exists.
///
/// Stored on the record as the [`SOURCE_ANNOTATION`](crate::SOURCE_ANNOTATION)
/// annotation. A record is owned by the source that created it; other
/// sources never overwrite or delete it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum SourceTag {
    /// Declared through the plugin store (API or UI).
    PluginStore,
    /// Registered by the child reconciler on behalf of a parent plugin.
    ChildReconciler,
    /// Origin not recorded.
    Unknown,
    /// Any other declaring actor.
    Other(String),
}

impl SourceTag {
    /// Annotation value for this tag.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::PluginStore => "plugin-store",
            Self::ChildReconciler => "child-reconciler",
            Self::Unknown => "unknown",
            Self::Other(s) => s,
        }
    }

    /// Parse an annotation value. Never fails: unrecognised values become
    /// [`SourceTag::Other`], an empty value is [`SourceTag::Unknown`].
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "plugin-store" => Self::PluginStore,
            "child-reconciler" => Self::ChildReconciler,
            "" | "unknown" => Self::Unknown,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<SourceTag> for String {
    fn from(tag: SourceTag) -> Self {
        tag.as_str().to_string()
    }
}

impl From<String> for SourceTag {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

/// A request to have a plugin installed, as handed to the registrar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginInstall {
    /// Plugin identifier.
    pub id: String,
    /// Desired version, empty for latest.
    #[serde(default)]
    pub version: String,
    /// Custom download URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Class to install the plugin as.
    #[serde(default)]
    pub class: PluginClass,
    /// Who declared this install.
    pub source: SourceTag,
    /// Bundling parent, for child installs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl PluginInstall {
    /// Create an external-class install with no URL or parent.
    #[must_use]
    pub fn new(id: impl Into<String>, version: impl Into<String>, source: SourceTag) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            url: None,
            class: PluginClass::External,
            source,
            parent_id: None,
        }
    }

    /// Set a custom download URL.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the class.
    #[must_use]
    pub fn with_class(mut self, class: PluginClass) -> Self {
        self.class = class;
        self
    }

    /// Set the parent plugin.
    #[must_use]
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// The plugin reference for this install.
    #[must_use]
    pub fn plugin_ref(&self) -> PluginRef {
        PluginRef::new(self.id.clone(), self.version.clone())
    }

    /// Whether the version is left unspecified.
    #[must_use]
    pub fn wants_latest(&self) -> bool {
        self.plugin_ref().is_latest()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_tag_roundtrip() {
        for tag in [
            SourceTag::PluginStore,
            SourceTag::ChildReconciler,
            SourceTag::Unknown,
            SourceTag::Other("config".into()),
        ] {
            assert_eq!(SourceTag::parse(tag.as_str()), tag);
        }
        assert_eq!(SourceTag::parse(""), SourceTag::Unknown);
    }

    #[test]
    fn install_serializes_source_as_string() {
        let install = PluginInstall::new("p", "1.0.0", SourceTag::PluginStore);
        let json = serde_json::to_value(&install).unwrap();
        assert_eq!(json["source"], "plugin-store");
        assert_eq!(json["class"], "external");
        let back: PluginInstall = serde_json::from_value(json).unwrap();
        assert_eq!(back, install);
    }

    #[test]
    fn wants_latest() {
        assert!(PluginInstall::new("p", "", SourceTag::Unknown).wants_latest());
        assert!(!PluginInstall::new("p", "1.0.0", SourceTag::Unknown).wants_latest());
    }
}
