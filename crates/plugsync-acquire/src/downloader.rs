//! The artifact download contract.

use std::path::PathBuf;

use async_trait::async_trait;
use plugsync_core::PluginRef;

use crate::error::AcquireResult;

/// Per-download options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadOptions {
    /// Custom archive URL, bypassing the default download location.
    pub url: Option<String>,
    /// Directory the plugin is extracted into.
    pub target_dir: PathBuf,
}

impl DownloadOptions {
    /// Options with a target directory and no custom URL.
    #[must_use]
    pub fn new(target_dir: impl Into<PathBuf>) -> Self {
        Self {
            url: None,
            target_dir: target_dir.into(),
        }
    }

    /// Set a custom archive URL.
    #[must_use]
    pub fn with_url(mut self, url: Option<String>) -> Self {
        self.url = url;
        self
    }
}

/// A plugin that has been downloaded and extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedArchive {
    /// Plugin ID from the extracted manifest.
    pub plugin_id: String,
    /// Concrete version from the extracted manifest.
    pub version: String,
    /// Directory holding the extracted plugin.
    pub path: PathBuf,
    /// Plugin dependencies declared by the manifest.
    pub dependencies: Vec<PluginRef>,
}

/// Fetches and extracts plugin archives.
///
/// Implementations deduplicate concurrent equivalent requests by returning
/// [`AcquireError::Duplicate`](crate::AcquireError::Duplicate) to all but
/// the first caller.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Download `plugin_id` at `version` (empty for latest) and extract it
    /// into `opts.target_dir`.
    async fn download(
        &self,
        plugin_id: &str,
        version: &str,
        opts: &DownloadOptions,
    ) -> AcquireResult<ExtractedArchive>;
}
