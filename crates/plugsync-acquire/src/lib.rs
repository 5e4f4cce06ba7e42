//! Plugsync Acquire - Getting plugin artifacts onto the node.
//!
//! This crate provides:
//! - [`CacheStore`]: validated lookups in the on-disk plugin cache
//! - [`VersionResolver`]: "latest" downloads filed under their concrete
//!   version, safe against concurrent resolvers
//! - [`DownloadOrchestrator`]: traced, metered downloads and dependency
//!   fan-out
//! - [`AcquisitionSource`]: a [`PluginSource`] that ensures declared
//!   installs are cached and hands them to [`LocalDiscovery`]
//! - Reference implementations: [`HttpDownloader`], [`FsDiscovery`] and
//!   [`CacheInstaller`]
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use plugsync_acquire::{
//!     AcquisitionContext, AcquisitionSource, FsDiscovery, HttpDownloader, PluginSource,
//! };
//! use plugsync_core::{PluginClass, PluginInstall, SourceTag};
//!
//! # async fn example() -> Result<(), plugsync_acquire::AcquireError> {
//! let downloader = HttpDownloader::new("https://grafana.com/api/plugins")?;
//! let ctx = AcquisitionContext::new("/var/lib/plugsync", Arc::new(downloader), Arc::new(FsDiscovery));
//! let installs = vec![PluginInstall::new("grafana-clock-panel", "", SourceTag::PluginStore)];
//! let source = AcquisitionSource::new(ctx, installs, PluginClass::External);
//! for bundle in source.discover().await? {
//!     println!("{} {}", bundle.id(), bundle.version());
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod cache;
pub mod discovery;
pub mod downloader;
pub mod error;
pub mod extract;
pub mod http;
pub mod installer;
pub mod loader;
pub mod metrics;
pub mod orchestrator;
pub mod resolver;
pub mod source;
pub mod staging;
pub mod version_cache;

pub use cache::CacheStore;
pub use discovery::{FoundBundle, FoundPlugin, FsDiscovery, LocalDiscovery};
pub use downloader::{DownloadOptions, Downloader, ExtractedArchive};
pub use error::{AcquireError, AcquireResult};
pub use http::HttpDownloader;
pub use installer::{CacheInstaller, InstallOptions, PluginInstaller};
pub use loader::{LoadedPlugin, Loader};
pub use metrics::{DownloadMetrics, MetricsSnapshot};
pub use orchestrator::DownloadOrchestrator;
pub use resolver::VersionResolver;
pub use source::{AcquisitionContext, AcquisitionSource, MAX_DEPENDENCY_DEPTH, PluginSource};
pub use staging::TEMP_DIR_PREFIX;
pub use version_cache::VersionCache;
