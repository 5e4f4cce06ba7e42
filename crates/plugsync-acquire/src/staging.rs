//! Staged writes into the plugin cache.
//!
//! Downloads are unpacked into a hidden `.tmp-` directory next to their
//! slot and renamed into place only once complete. A cache slot therefore
//! holds either a whole plugin or nothing, whichever way the download ends.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use crate::cache::CacheStore;
use crate::error::{AcquireError, AcquireResult};

/// Prefix of in-progress download directories inside the cache root.
pub const TEMP_DIR_PREFIX: &str = ".tmp-";

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// A fresh `.tmp-` path under `root` for `plugin_id`.
pub(crate) fn temp_dir_path(root: &Path, plugin_id: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos());
    let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
    root.join(format!("{TEMP_DIR_PREFIX}{plugin_id}-{nanos}-{seq}"))
}

/// Removes a directory on drop unless disarmed.
///
/// Covers early returns, errors and cancellation of the owning future.
pub(crate) struct TempDirGuard {
    path: PathBuf,
    armed: bool,
}

impl TempDirGuard {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempDirGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed temp download dir"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to remove temp download dir");
            },
        }
    }
}

/// Move a complete download from `staged` into the cache slot `target`.
///
/// A slot that already holds `plugin_id` at `version` wins and the staged
/// copy is discarded. A slot holding anything else is moved aside to a
/// `.tmp-` name first and removed afterwards, so a valid copy is never
/// deleted in place.
pub(crate) async fn promote(
    staged: &mut TempDirGuard,
    target: &Path,
    plugin_id: &str,
    version: &str,
) -> AcquireResult<PathBuf> {
    if CacheStore::holds(target, plugin_id, version) {
        debug!(plugin_id, version, "version already cached, discarding download");
        return Ok(target.to_path_buf());
    }

    let first = match tokio::fs::rename(staged.path(), target).await {
        Ok(()) => {
            staged.disarm();
            info!(plugin_id, version, dir = %target.display(), "plugin filed into cache");
            return Ok(target.to_path_buf());
        },
        Err(_) if CacheStore::holds(target, plugin_id, version) => {
            debug!(plugin_id, version, "lost rename race, using existing copy");
            return Ok(target.to_path_buf());
        },
        Err(e) => e,
    };
    if !tokio::fs::try_exists(target).await.unwrap_or(false) {
        return Err(AcquireError::io(target, first));
    }

    let root = target.parent().unwrap_or(target);
    let aside = TempDirGuard::new(temp_dir_path(root, plugin_id));
    if let Err(e) = tokio::fs::rename(target, aside.path()).await {
        if CacheStore::holds(target, plugin_id, version) {
            return Ok(target.to_path_buf());
        }
        return Err(AcquireError::io(target, e));
    }
    // Someone filed a good copy between the check and the move.
    if CacheStore::holds(aside.path(), plugin_id, version) {
        return restore(aside, target, plugin_id, version).await;
    }
    warn!(dir = %target.display(), "replacing invalid cache directory");

    match tokio::fs::rename(staged.path(), target).await {
        Ok(()) => {
            staged.disarm();
            info!(plugin_id, version, dir = %target.display(), "plugin filed into cache");
            Ok(target.to_path_buf())
        },
        Err(_) if CacheStore::holds(target, plugin_id, version) => Ok(target.to_path_buf()),
        Err(e) => Err(AcquireError::io(target, e)),
    }
}

async fn restore(
    mut aside: TempDirGuard,
    target: &Path,
    plugin_id: &str,
    version: &str,
) -> AcquireResult<PathBuf> {
    match tokio::fs::rename(aside.path(), target).await {
        Ok(()) => {
            aside.disarm();
            Ok(target.to_path_buf())
        },
        Err(_) if CacheStore::holds(target, plugin_id, version) => Ok(target.to_path_buf()),
        Err(e) => Err(AcquireError::io(target, e)),
    }
}

#[cfg(test)]
mod tests {
    use plugsync_core::PluginManifest;

    use super::*;

    fn write(dir: &Path, id: &str, version: &str) {
        std::fs::create_dir_all(dir).unwrap();
        PluginManifest::new(id, version).write_to_dir(dir).unwrap();
    }

    fn leftovers(root: &Path) -> Vec<String> {
        std::fs::read_dir(root)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with(TEMP_DIR_PREFIX))
            .collect()
    }

    #[test]
    fn temp_paths_are_unique_and_hidden() {
        let root = Path::new("/cache");
        let a = temp_dir_path(root, "p");
        let b = temp_dir_path(root, "p");
        assert_ne!(a, b);
        assert!(
            a.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with(".tmp-p-")
        );
    }

    #[test]
    fn guard_removes_unless_disarmed() {
        let tmp = tempfile::tempdir().unwrap();
        let doomed = tmp.path().join("doomed");
        let kept = tmp.path().join("kept");
        std::fs::create_dir_all(&doomed).unwrap();
        std::fs::create_dir_all(&kept).unwrap();

        drop(TempDirGuard::new(doomed.clone()));
        let mut guard = TempDirGuard::new(kept.clone());
        guard.disarm();
        drop(guard);

        assert!(!doomed.exists());
        assert!(kept.exists());
    }

    #[tokio::test]
    async fn promote_into_empty_slot() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("clock-1.0.0");
        let mut staged = TempDirGuard::new(temp_dir_path(tmp.path(), "clock"));
        write(staged.path(), "clock", "1.0.0");

        let path = promote(&mut staged, &target, "clock", "1.0.0").await.unwrap();
        drop(staged);

        assert_eq!(path, target);
        assert!(CacheStore::holds(&target, "clock", "1.0.0"));
        assert!(leftovers(tmp.path()).is_empty());
    }

    #[tokio::test]
    async fn valid_slot_is_kept_and_staged_copy_discarded() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("clock-1.0.0");
        write(&target, "clock", "1.0.0");
        std::fs::write(target.join("module.js"), "winner").unwrap();

        let mut staged = TempDirGuard::new(temp_dir_path(tmp.path(), "clock"));
        write(staged.path(), "clock", "1.0.0");
        let path = promote(&mut staged, &target, "clock", "1.0.0").await.unwrap();
        drop(staged);

        assert_eq!(path, target);
        assert_eq!(std::fs::read_to_string(target.join("module.js")).unwrap(), "winner");
        assert!(leftovers(tmp.path()).is_empty());
    }

    #[tokio::test]
    async fn invalid_slot_is_moved_aside_and_replaced() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("clock-1.0.0");
        write(&target, "clock", "0.9.0");

        let mut staged = TempDirGuard::new(temp_dir_path(tmp.path(), "clock"));
        write(staged.path(), "clock", "1.0.0");
        let path = promote(&mut staged, &target, "clock", "1.0.0").await.unwrap();
        drop(staged);

        assert_eq!(path, target);
        assert!(CacheStore::holds(&target, "clock", "1.0.0"));
        assert!(leftovers(tmp.path()).is_empty());
    }

    #[tokio::test]
    async fn good_copy_moved_aside_is_put_back() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("clock-1.0.0");
        let aside = TempDirGuard::new(temp_dir_path(tmp.path(), "clock"));
        write(aside.path(), "clock", "1.0.0");

        let path = restore(aside, &target, "clock", "1.0.0").await.unwrap();
        assert_eq!(path, target);
        assert!(CacheStore::holds(&target, "clock", "1.0.0"));
        assert!(leftovers(tmp.path()).is_empty());
    }
}
