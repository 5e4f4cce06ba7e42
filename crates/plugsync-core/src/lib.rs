//! Plugsync Core - Foundation types and traits for plugin acquisition.
//!
//! This crate provides:
//! - Plugin identity ([`PluginRef`], [`PluginClass`]) and cache keys
//! - The plugin metadata document ([`PluginMeta`]) and on-disk manifest
//!   ([`PluginManifest`])
//! - Desired-state install types ([`PluginInstall`], [`InstallRecord`])
//! - Per-node and aggregate install status ([`NodeStatus`], [`AggregateStatus`])
//! - The [`PluginRegistry`] trait for querying locally loaded plugins

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod error;
pub mod install;
pub mod manifest;
pub mod meta;
pub mod plugin;
pub mod record;
pub mod registry;
pub mod status;

pub use error::{CoreError, CoreResult};
pub use install::{PluginInstall, SourceTag};
pub use manifest::{MANIFEST_FILE_NAME, ManifestDependencies, ManifestInfo, PluginManifest};
pub use meta::{PluginDependency, PluginMeta, SignatureInfo};
pub use plugin::{PluginClass, PluginRef, cache_key};
pub use record::{InstallRecord, InstallSpec, ObjectMeta, ResourceKey, SOURCE_ANNOTATION, SourceType};
pub use registry::{InstalledPlugin, PluginRegistry};
pub use status::{AggregatePhase, AggregateStatus, InstallStatus, NodePhase, NodeStatus};
