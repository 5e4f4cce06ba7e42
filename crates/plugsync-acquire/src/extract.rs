//! `.tar.gz` plugin archive extraction.
//!
//! Plugin archives usually wrap everything in a single `{id}/` directory.
//! A first pass over the entries detects that wrapper so the plugin lands
//! directly in the target directory; the second pass unpacks.
//!
//! Entries are rejected when they:
//! - are absolute or contain `..`, root or prefix components
//! - are links, devices, FIFOs or sparse files
//! - push the entry count or unpacked size past fixed limits

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::{Archive, EntryType};

use crate::error::{AcquireError, AcquireResult};

/// Maximum number of entries in one archive.
pub const MAX_ENTRIES: usize = 10_000;

/// Maximum total unpacked size (2 GiB).
pub const MAX_UNPACKED_BYTES: u64 = 2_147_483_648;

fn extraction(message: impl Into<String>) -> AcquireError {
    AcquireError::Extraction {
        message: message.into(),
    }
}

/// Unpack a gzip-compressed tarball into `dest`, stripping a single
/// top-level directory if every entry sits below one.
///
/// # Errors
///
/// Returns [`AcquireError::PathTraversal`] or [`AcquireError::UnsafeEntry`]
/// for hostile entries and [`AcquireError::Extraction`] for corrupt, empty
/// or oversized archives.
pub fn extract_tar_gz(data: &[u8], dest: &Path) -> AcquireResult<()> {
    let strip = common_root(data)?;

    std::fs::create_dir_all(dest).map_err(|e| AcquireError::io(dest, e))?;

    let mut archive = Archive::new(GzDecoder::new(data));
    archive.set_preserve_permissions(false);
    archive.set_overwrite(true);

    let mut total: u64 = 0;
    for entry in archive
        .entries()
        .map_err(|e| extraction(format!("failed to read archive: {e}")))?
    {
        let mut entry = entry.map_err(|e| extraction(format!("failed to read entry: {e}")))?;
        let path = entry
            .path()
            .map_err(|e| extraction(format!("failed to read entry path: {e}")))?
            .into_owned();

        let entry_type = entry.header().entry_type();
        if !is_allowed(entry_type) {
            return Err(AcquireError::UnsafeEntry {
                entry_type: format!("{entry_type:?}"),
                path: path.display().to_string(),
            });
        }
        if !matches!(entry_type, EntryType::Regular | EntryType::Directory) {
            continue;
        }

        let size = entry
            .header()
            .size()
            .map_err(|e| extraction(format!("failed to read entry size: {e}")))?;
        total = total.saturating_add(size);
        if total > MAX_UNPACKED_BYTES {
            return Err(extraction(format!(
                "archive unpacks to more than {MAX_UNPACKED_BYTES} bytes"
            )));
        }

        validate_path(&path)?;
        let relative = relative_path(&path, strip.as_deref());
        if relative.as_os_str().is_empty() {
            continue;
        }

        let target = dest.join(&relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AcquireError::io(parent, e))?;
        }
        entry
            .unpack(&target)
            .map_err(|e| extraction(format!("failed to unpack {}: {e}", path.display())))?;
    }

    Ok(())
}

/// The single top-level directory shared by every entry, if any.
fn common_root(data: &[u8]) -> AcquireResult<Option<OsString>> {
    let mut archive = Archive::new(GzDecoder::new(data));
    let mut root: Option<OsString> = None;
    let mut shared = true;
    let mut count = 0usize;

    for entry in archive
        .entries()
        .map_err(|e| extraction(format!("failed to read archive: {e}")))?
    {
        let entry = entry.map_err(|e| extraction(format!("failed to read entry: {e}")))?;
        count = count.saturating_add(1);
        if count > MAX_ENTRIES {
            return Err(extraction(format!(
                "archive has more than {MAX_ENTRIES} entries"
            )));
        }

        let path = entry
            .path()
            .map_err(|e| extraction(format!("failed to read entry path: {e}")))?
            .into_owned();
        validate_path(&path)?;
        if !shared {
            continue;
        }

        let mut components = path.components().filter(|c| !matches!(c, Component::CurDir));
        let Some(first) = components.next() else {
            continue;
        };
        let nested = components.next().is_some();
        let is_top_level_file = !nested && entry.header().entry_type() != EntryType::Directory;

        match &root {
            _ if is_top_level_file => shared = false,
            None => root = Some(first.as_os_str().to_owned()),
            Some(r) if r.as_os_str() != first.as_os_str() => shared = false,
            Some(_) => {},
        }
    }

    if count == 0 {
        return Err(extraction("archive is empty"));
    }
    Ok(if shared { root } else { None })
}

fn is_allowed(entry_type: EntryType) -> bool {
    matches!(
        entry_type,
        EntryType::Regular
            | EntryType::Directory
            | EntryType::GNULongName
            | EntryType::XHeader
            | EntryType::XGlobalHeader
    )
}

fn validate_path(path: &Path) -> AcquireResult<()> {
    let escapes = path.is_absolute()
        || path.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
    if escapes {
        return Err(AcquireError::PathTraversal {
            path: path.display().to_string(),
        });
    }
    Ok(())
}

fn relative_path(path: &Path, strip: Option<&std::ffi::OsStr>) -> PathBuf {
    let mut components = path
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .peekable();
    if let Some(root) = strip
        && components.peek().is_some_and(|c| c.as_os_str() == root)
    {
        components.next();
    }
    components.collect()
}

#[cfg(test)]
#[allow(clippy::arithmetic_side_effects)]
mod tests {
    use std::io::Write;

    use super::*;

    fn gzip(tar: Vec<u8>) -> Vec<u8> {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::fast());
        encoder.write_all(&tar).unwrap();
        encoder.finish().unwrap()
    }

    fn tarball(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for &(path, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_path(path).unwrap();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append(&header, data).unwrap();
        }
        gzip(builder.into_inner().unwrap())
    }

    /// Writes the raw name bytes, bypassing the tar crate's path checks.
    fn raw_tarball(name: &[u8], entry_type: EntryType) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.as_old_mut().name[..name.len()].copy_from_slice(name);
        header.set_entry_type(entry_type);
        header.set_size(if entry_type == EntryType::Regular { 2 } else { 0 });
        header.set_mode(0o644);
        header.set_cksum();
        let data: &[u8] = if entry_type == EntryType::Regular { b"hi" } else { b"" };
        builder.append(&header, data).unwrap();
        gzip(builder.into_inner().unwrap())
    }

    #[test]
    fn strips_single_top_level_dir() {
        let data = tarball(&[
            ("clock/plugin.json", br#"{"id":"clock"}"#),
            ("clock/img/logo.svg", b"<svg/>"),
        ]);
        let dest = tempfile::tempdir().unwrap();
        extract_tar_gz(&data, dest.path()).unwrap();
        assert!(dest.path().join("plugin.json").is_file());
        assert!(dest.path().join("img/logo.svg").is_file());
        assert!(!dest.path().join("clock").exists());
    }

    #[test]
    fn keeps_layout_without_common_root() {
        let data = tarball(&[("plugin.json", b"{}"), ("module.js", b"x")]);
        let dest = tempfile::tempdir().unwrap();
        extract_tar_gz(&data, dest.path()).unwrap();
        assert!(dest.path().join("plugin.json").is_file());
        assert!(dest.path().join("module.js").is_file());

        let data = tarball(&[("a/plugin.json", b"{}"), ("b/plugin.json", b"{}")]);
        let dest = tempfile::tempdir().unwrap();
        extract_tar_gz(&data, dest.path()).unwrap();
        assert!(dest.path().join("a/plugin.json").is_file());
        assert!(dest.path().join("b/plugin.json").is_file());
    }

    #[test]
    fn rejects_parent_components() {
        let data = raw_tarball(b"../evil.txt", EntryType::Regular);
        let dest = tempfile::tempdir().unwrap();
        let err = extract_tar_gz(&data, dest.path()).unwrap_err();
        assert!(matches!(err, AcquireError::PathTraversal { .. }));
    }

    #[test]
    fn rejects_absolute_paths() {
        let data = raw_tarball(b"/etc/evil", EntryType::Regular);
        let dest = tempfile::tempdir().unwrap();
        let err = extract_tar_gz(&data, dest.path()).unwrap_err();
        assert!(matches!(err, AcquireError::PathTraversal { .. }));
    }

    #[test]
    fn rejects_links() {
        let data = raw_tarball(b"link", EntryType::Symlink);
        let dest = tempfile::tempdir().unwrap();
        let err = extract_tar_gz(&data, dest.path()).unwrap_err();
        assert!(matches!(err, AcquireError::UnsafeEntry { .. }));
        assert!(!dest.path().join("link").exists());
    }

    #[test]
    fn rejects_empty_and_corrupt_archives() {
        let dest = tempfile::tempdir().unwrap();
        let empty = gzip(tar::Builder::new(Vec::new()).into_inner().unwrap());
        assert!(matches!(
            extract_tar_gz(&empty, dest.path()).unwrap_err(),
            AcquireError::Extraction { .. }
        ));
        assert!(matches!(
            extract_tar_gz(b"not gzip", dest.path()).unwrap_err(),
            AcquireError::Extraction { .. }
        ));
    }
}
