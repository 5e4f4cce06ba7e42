//! Test fixtures.

use std::io::Write;
use std::path::{Path, PathBuf};

use plugsync_core::{InstallRecord, PluginInstall, PluginManifest, PluginMeta, SourceTag};

/// Namespace used by record fixtures.
pub const TEST_NAMESPACE: &str = "default";

/// Write `{dir}/plugin.json` for `id` at `version`, creating `dir`.
///
/// # Panics
///
/// Panics if the directory or file cannot be written.
pub fn write_manifest(dir: &Path, id: &str, version: &str) -> PathBuf {
    write_plugin(dir, &PluginManifest::new(id, version))
}

/// Write an arbitrary manifest into `dir`.
///
/// # Panics
///
/// Panics if the directory or file cannot be written.
pub fn write_plugin(dir: &Path, manifest: &PluginManifest) -> PathBuf {
    std::fs::create_dir_all(dir).expect("create plugin dir");
    manifest.write_to_dir(dir).expect("write manifest");
    dir.to_path_buf()
}

/// A plugin-store install.
#[must_use]
pub fn test_install(id: &str, version: &str) -> PluginInstall {
    PluginInstall::new(id, version, SourceTag::PluginStore)
}

/// A plugin-store install record in [`TEST_NAMESPACE`].
#[must_use]
pub fn test_record(id: &str, version: &str) -> InstallRecord {
    InstallRecord::from_install(TEST_NAMESPACE, &test_install(id, version))
}

/// Metadata with only an ID and version.
#[must_use]
pub fn test_meta(id: &str, version: &str) -> PluginMeta {
    PluginMeta::new(id, version)
}

/// A `.tar.gz` holding `manifest` as `{id}/plugin.json`, plus `extra`
/// files under the same directory.
///
/// # Panics
///
/// Panics if the archive cannot be built.
#[must_use]
pub fn plugin_archive(manifest: &PluginManifest, extra: &[(&str, &[u8])]) -> Vec<u8> {
    let json = serde_json::to_vec_pretty(manifest).expect("serialize manifest");
    let mut files: Vec<(String, &[u8])> =
        vec![(format!("{}/plugin.json", manifest.id), json.as_slice())];
    files.extend(
        extra
            .iter()
            .map(|(name, data)| (format!("{}/{name}", manifest.id), *data)),
    );

    let mut builder = tar::Builder::new(Vec::new());
    for (path, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_path(&path).expect("entry path");
        header.set_size(u64::try_from(data.len()).expect("entry size"));
        header.set_mode(0o644);
        header.set_cksum();
        builder.append(&header, data).expect("append entry");
    }
    gzip(builder)
}

/// Like [`plugin_archive`], followed by a symlink entry `{id}/{name}`
/// pointing at `link_target`. Extraction must reject it.
///
/// # Panics
///
/// Panics if the archive cannot be built.
#[must_use]
pub fn plugin_archive_with_symlink(
    manifest: &PluginManifest,
    name: &str,
    link_target: &str,
) -> Vec<u8> {
    let json = serde_json::to_vec_pretty(manifest).expect("serialize manifest");
    let mut builder = tar::Builder::new(Vec::new());

    let mut header = tar::Header::new_gnu();
    header
        .set_path(format!("{}/plugin.json", manifest.id))
        .expect("entry path");
    header.set_size(u64::try_from(json.len()).expect("entry size"));
    header.set_mode(0o644);
    header.set_cksum();
    builder.append(&header, json.as_slice()).expect("append manifest");

    let mut link = tar::Header::new_gnu();
    link.set_path(format!("{}/{name}", manifest.id))
        .expect("entry path");
    link.set_entry_type(tar::EntryType::Symlink);
    link.set_link_name(link_target).expect("link target");
    link.set_size(0);
    link.set_mode(0o777);
    link.set_cksum();
    builder.append(&link, std::io::empty()).expect("append link");

    gzip(builder)
}

fn gzip(builder: tar::Builder<Vec<u8>>) -> Vec<u8> {
    let tar = builder.into_inner().expect("finish tar");
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::fast());
    encoder.write_all(&tar).expect("compress");
    encoder.finish().expect("finish gzip")
}
