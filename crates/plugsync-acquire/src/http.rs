//! HTTP archive downloader.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::StreamExt;
use plugsync_core::PluginManifest;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use crate::downloader::{DownloadOptions, Downloader, ExtractedArchive};
use crate::error::{AcquireError, AcquireResult};
use crate::extract::extract_tar_gz;
use crate::staging::{TempDirGuard, temp_dir_path};

/// Default archive size limit (512 MiB).
pub const DEFAULT_MAX_ARCHIVE_BYTES: u64 = 536_870_912;

/// Default whole-request timeout.
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Marks a download as in flight for as long as it is alive.
struct InFlight {
    key: String,
    map: Arc<DashMap<String, ()>>,
}

impl InFlight {
    fn acquire(map: &Arc<DashMap<String, ()>>, key: String) -> Option<Self> {
        match map.entry(key.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(());
                Some(Self {
                    key,
                    map: Arc::clone(map),
                })
            },
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.map.remove(&self.key);
    }
}

/// [`Downloader`] fetching `.tar.gz` archives over HTTP.
///
/// Archives come from `{base_url}/{id}/versions/{version}/download`
/// (`latest` when the version is empty) unless the caller supplies a URL.
#[derive(Clone)]
pub struct HttpDownloader {
    client: reqwest::Client,
    base_url: Url,
    max_size: u64,
    in_flight: Arc<DashMap<String, ()>>,
}

impl std::fmt::Debug for HttpDownloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpDownloader")
            .field("base_url", &self.base_url.as_str())
            .field("max_size", &self.max_size)
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

impl HttpDownloader {
    /// Create a downloader for `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::Http`] if the URL is invalid or the client
    /// cannot be built.
    pub fn new(base_url: &str) -> AcquireResult<Self> {
        let base_url = Url::parse(base_url).map_err(|e| AcquireError::Http {
            url: base_url.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            client: build_client(DEFAULT_DOWNLOAD_TIMEOUT, base_url.as_str())?,
            base_url,
            max_size: DEFAULT_MAX_ARCHIVE_BYTES,
            in_flight: Arc::new(DashMap::new()),
        })
    }

    /// Set the archive size limit.
    #[must_use]
    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    /// Set the whole-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::Http`] if the client cannot be rebuilt.
    pub fn with_timeout(mut self, timeout: Duration) -> AcquireResult<Self> {
        self.client = build_client(timeout, self.base_url.as_str())?;
        Ok(self)
    }

    /// Download URL for a plugin version.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::Http`] if the base URL cannot carry a path.
    pub fn archive_url(&self, plugin_id: &str, version: &str) -> AcquireResult<Url> {
        let version = if version.is_empty() { "latest" } else { version };
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| AcquireError::Http {
                url: self.base_url.to_string(),
                message: "base URL cannot be a base".to_string(),
            })?
            .pop_if_empty()
            .extend([plugin_id, "versions", version, "download"]);
        Ok(url)
    }

    async fn fetch(&self, url: &Url) -> AcquireResult<Vec<u8>> {
        let http_err = |message: String| AcquireError::Http {
            url: url.to_string(),
            message,
        };

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| http_err(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(http_err(format!("server answered {status}")));
        }
        if let Some(len) = response.content_length()
            && len > self.max_size
        {
            return Err(AcquireError::ArchiveTooLarge {
                size: len,
                limit: self.max_size,
            });
        }

        let capacity = usize::try_from(response.content_length().unwrap_or(0).min(self.max_size))
            .unwrap_or(0);
        let mut bytes = Vec::with_capacity(capacity);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| http_err(e.to_string()))?;
            bytes.extend_from_slice(&chunk);
            let size = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
            if size > self.max_size {
                return Err(AcquireError::ArchiveTooLarge {
                    size,
                    limit: self.max_size,
                });
            }
        }
        Ok(bytes)
    }
}

fn build_client(timeout: Duration, url: &str) -> AcquireResult<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("plugsync/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(10))
        .timeout(timeout)
        .build()
        .map_err(|e| AcquireError::Http {
            url: url.to_string(),
            message: format!("failed to create HTTP client: {e}"),
        })
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(
        &self,
        plugin_id: &str,
        version: &str,
        opts: &DownloadOptions,
    ) -> AcquireResult<ExtractedArchive> {
        if opts.target_dir.as_os_str().is_empty() {
            return Err(AcquireError::Extraction {
                message: format!("no target directory for {plugin_id}"),
            });
        }

        let key = match &opts.url {
            Some(url) if !url.is_empty() => url.clone(),
            _ => plugsync_core::cache_key(plugin_id, version),
        };
        let Some(_guard) = InFlight::acquire(&self.in_flight, key) else {
            return Err(AcquireError::Duplicate {
                plugin_id: plugin_id.to_string(),
                version: version.to_string(),
            });
        };

        let url = match &opts.url {
            Some(custom) if !custom.is_empty() => {
                Url::parse(custom).map_err(|e| AcquireError::Http {
                    url: custom.clone(),
                    message: e.to_string(),
                })?
            },
            _ => self.archive_url(plugin_id, version)?,
        };

        debug!(plugin_id, version, url = %url, "downloading plugin archive");
        let bytes = self.fetch(&url).await?;

        // The blocking task outlives a dropped future; tell it to give up.
        let cancel = CancellationToken::new();
        let _abort = cancel.clone().drop_guard();
        let target = opts.target_dir.clone();
        let (id, requested) = (plugin_id.to_string(), version.to_string());
        let manifest = tokio::task::spawn_blocking(move || {
            unpack(&bytes, &target, &id, &requested, &cancel)
        })
        .await
        .map_err(|e| AcquireError::Extraction {
            message: format!("extraction task failed: {e}"),
        })??;

        info!(
            plugin_id,
            version = %manifest.version(),
            dir = %opts.target_dir.display(),
            "plugin archive extracted"
        );
        Ok(ExtractedArchive {
            version: manifest.version().to_string(),
            plugin_id: manifest.id,
            path: opts.target_dir.clone(),
            dependencies: manifest.dependencies.plugins,
        })
    }
}

/// Unpack `data` into a `.tmp-` sibling of `target`, check its manifest and
/// rename it onto `target`. On any error, or once `cancel` fires, the
/// sibling is removed and `target` is left untouched.
fn unpack(
    data: &[u8],
    target: &Path,
    plugin_id: &str,
    version: &str,
    cancel: &CancellationToken,
) -> AcquireResult<PluginManifest> {
    let parent = target.parent().unwrap_or(target);
    std::fs::create_dir_all(parent).map_err(|e| AcquireError::io(parent, e))?;
    let mut staged = TempDirGuard::new(temp_dir_path(parent, plugin_id));

    extract_tar_gz(data, staged.path())?;
    let manifest = PluginManifest::load_from_dir(staged.path())?;
    if manifest.id != plugin_id {
        return Err(AcquireError::ManifestMismatch {
            expected: plugin_id.to_string(),
            found: manifest.id,
        });
    }
    if !version.is_empty() && manifest.version() != version {
        return Err(AcquireError::VersionMismatch {
            plugin_id: plugin_id.to_string(),
            expected: version.to_string(),
            found: manifest.version().to_string(),
        });
    }
    if cancel.is_cancelled() {
        return Err(AcquireError::Extraction {
            message: format!("download of {plugin_id} was cancelled"),
        });
    }

    std::fs::rename(staged.path(), target).map_err(|e| AcquireError::io(target, e))?;
    staged.disarm();
    Ok(manifest)
}

#[cfg(test)]
#[allow(clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    #[test]
    fn archive_url_layout() {
        let d = HttpDownloader::new("https://grafana.com/api/plugins/").unwrap();
        assert_eq!(
            d.archive_url("clock", "2.1.0").unwrap().as_str(),
            "https://grafana.com/api/plugins/clock/versions/2.1.0/download"
        );
        assert_eq!(
            d.archive_url("clock", "").unwrap().as_str(),
            "https://grafana.com/api/plugins/clock/versions/latest/download"
        );
    }

    #[test]
    fn invalid_base_url() {
        assert!(matches!(
            HttpDownloader::new("not a url").unwrap_err(),
            AcquireError::Http { .. }
        ));
    }

    #[test]
    fn in_flight_guard_is_exclusive_until_dropped() {
        let map = Arc::new(DashMap::new());
        let first = InFlight::acquire(&map, "p:1.0.0".into()).unwrap();
        assert!(InFlight::acquire(&map, "p:1.0.0".into()).is_none());
        assert!(InFlight::acquire(&map, "q:1.0.0".into()).is_some());
        drop(first);
        assert!(InFlight::acquire(&map, "p:1.0.0".into()).is_some());
    }

    fn archive(id: &str, version: &str) -> Vec<u8> {
        use std::io::Write;

        let json = serde_json::to_vec(&PluginManifest::new(id, version)).unwrap();
        let mut header = tar::Header::new_gnu();
        header.set_path(format!("{id}/plugin.json")).unwrap();
        header.set_size(json.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        let mut builder = tar::Builder::new(Vec::new());
        builder.append(&header, json.as_slice()).unwrap();

        let mut gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::fast());
        gz.write_all(&builder.into_inner().unwrap()).unwrap();
        gz.finish().unwrap()
    }

    fn names(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn unpack_files_plugin_into_target() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("clock-1.0.0");
        let manifest = unpack(
            &archive("clock", "1.0.0"),
            &target,
            "clock",
            "1.0.0",
            &CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(manifest.version(), "1.0.0");
        assert_eq!(names(tmp.path()), vec!["clock-1.0.0".to_string()]);
    }

    #[test]
    fn cancelled_unpack_leaves_nothing_behind() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("clock-1.0.0");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = unpack(&archive("clock", "1.0.0"), &target, "clock", "1.0.0", &cancel)
            .unwrap_err();
        assert!(matches!(err, AcquireError::Extraction { .. }));
        assert!(names(tmp.path()).is_empty());
    }

    #[test]
    fn wrong_version_is_rejected_before_filing() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("clock-1.0.0");
        let err = unpack(
            &archive("clock", "2.0.0"),
            &target,
            "clock",
            "1.0.0",
            &CancellationToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, AcquireError::VersionMismatch { .. }));
        assert!(names(tmp.path()).is_empty());
    }

    #[tokio::test]
    async fn empty_target_dir_is_rejected() {
        let d = HttpDownloader::new("http://127.0.0.1:9").unwrap();
        let err = d
            .download("p", "1.0.0", &DownloadOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AcquireError::Extraction { .. }));
    }
}
