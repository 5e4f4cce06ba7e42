//! Integration tests for cache acquisition: resolution, dependencies,
//! discovery and installation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use plugsync_acquire::{
    AcquireError, AcquireResult, AcquisitionContext, AcquisitionSource, CacheInstaller,
    FoundBundle, FsDiscovery, InstallOptions, LocalDiscovery, PluginInstaller, PluginSource,
    TEMP_DIR_PREFIX,
};
use plugsync_core::{PluginClass, PluginInstall, PluginRef, PluginRegistry, SourceTag};
use plugsync_test::{MockDownloader, MockLoader, MockRegistry, test_install, write_manifest};
use tempfile::TempDir;

/// Discovery that counts calls and delegates to the filesystem.
#[derive(Default)]
struct CountingDiscovery {
    calls: AtomicUsize,
}

#[async_trait]
impl LocalDiscovery for CountingDiscovery {
    async fn discover(&self, paths: &[PathBuf]) -> AcquireResult<Vec<FoundBundle>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        FsDiscovery.discover(paths).await
    }
}

fn context(root: &Path, downloader: &Arc<MockDownloader>) -> AcquisitionContext {
    AcquisitionContext::new(root, downloader.clone(), Arc::new(FsDiscovery))
}

fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Test concurrent latest resolutions converge on one cache directory.
#[tokio::test]
async fn test_concurrent_resolution_converges() {
    let tmp = TempDir::new().unwrap();
    let downloader = Arc::new(
        MockDownloader::new()
            .with_latest("clock", "2.1.0")
            .with_delay(Duration::from_millis(20)),
    );
    let ctx = context(tmp.path(), &downloader);
    let resolver = ctx.resolver();

    let (a, b) = tokio::join!(
        resolver.resolve_and_download("clock", None),
        resolver.resolve_and_download("clock", None),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a, b);
    assert_eq!(a, tmp.path().join("clock-2.1.0"));
    assert_eq!(entries(tmp.path()), vec!["clock-2.1.0".to_string()]);
    assert!(!entries(tmp.path()).iter().any(|n| n.starts_with(TEMP_DIR_PREFIX)));
    assert_eq!(ctx.versions().get("clock"), Some("2.1.0".to_string()));
}

/// Test a failed latest download leaves no temp directory behind.
#[tokio::test]
async fn test_failed_resolution_cleans_up() {
    let tmp = TempDir::new().unwrap();
    let downloader = Arc::new(MockDownloader::new().failing("clock"));
    let ctx = context(tmp.path(), &downloader);

    let err = ctx.resolver().resolve_and_download("clock", None).await.unwrap_err();
    assert!(matches!(err, AcquireError::Http { .. }));
    assert!(entries(tmp.path()).is_empty());
    assert!(ctx.versions().is_empty());
}

/// Test a duplicate latest download is forwarded and records no version.
#[tokio::test]
async fn test_duplicate_resolution_is_forwarded() {
    let tmp = TempDir::new().unwrap();
    let downloader = Arc::new(MockDownloader::new().duplicate("clock"));
    let ctx = context(tmp.path(), &downloader);

    let err = ctx.resolver().resolve_and_download("clock", None).await.unwrap_err();
    assert!(err.is_duplicate());
    assert!(ctx.versions().is_empty());
}

/// Test a second latest ensure is served from the version cache.
#[tokio::test]
async fn test_latest_is_downloaded_once() {
    let tmp = TempDir::new().unwrap();
    let downloader = Arc::new(MockDownloader::new().with_latest("clock", "2.1.0"));
    let source = AcquisitionSource::new(
        context(tmp.path(), &downloader),
        Vec::new(),
        PluginClass::External,
    );
    let install = test_install("clock", "");

    let first = source.ensure(&install).await.unwrap();
    let second = source.ensure(&install).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(downloader.calls(), 1);
}

/// Test explicit versions already on disk are never downloaded.
#[tokio::test]
async fn test_cached_versions_skip_download() {
    let tmp = TempDir::new().unwrap();
    write_manifest(&tmp.path().join("clock-2.1.0"), "clock", "2.1.0");
    write_manifest(&tmp.path().join("legacy"), "legacy", "1.0.0");
    let downloader = Arc::new(MockDownloader::new());
    let source = AcquisitionSource::new(
        context(tmp.path(), &downloader),
        Vec::new(),
        PluginClass::External,
    );

    assert_eq!(
        source.ensure(&test_install("clock", "2.1.0")).await.unwrap(),
        vec![tmp.path().join("clock-2.1.0")]
    );
    assert_eq!(
        source.ensure(&test_install("legacy", "1.0.0")).await.unwrap(),
        vec![tmp.path().join("legacy")]
    );
    assert_eq!(downloader.calls(), 0);
}

/// Test a cache directory with the wrong manifest is not a hit.
#[tokio::test]
async fn test_mismatched_cache_entry_is_redownloaded() {
    let tmp = TempDir::new().unwrap();
    write_manifest(&tmp.path().join("clock-2.1.0"), "clock", "2.0.0");
    let downloader = Arc::new(MockDownloader::new());
    let source = AcquisitionSource::new(
        context(tmp.path(), &downloader),
        Vec::new(),
        PluginClass::External,
    );

    source.ensure(&test_install("clock", "2.1.0")).await.unwrap();
    assert_eq!(downloader.requests(), vec![PluginRef::new("clock", "2.1.0")]);
}

/// Test declared dependencies are ensured alongside the plugin.
#[tokio::test]
async fn test_dependencies_are_ensured() {
    let tmp = TempDir::new().unwrap();
    let downloader = Arc::new(
        MockDownloader::new()
            .with_dependencies("app", vec![PluginRef::new("lib", "2.0.0")])
            .with_dependencies("lib", vec![PluginRef::latest("base")]),
    );
    let source = AcquisitionSource::new(
        context(tmp.path(), &downloader),
        Vec::new(),
        PluginClass::External,
    );

    let paths = source.ensure(&test_install("app", "1.0.0")).await.unwrap();
    assert_eq!(
        paths,
        vec![
            tmp.path().join("app-1.0.0"),
            tmp.path().join("lib-2.0.0"),
            tmp.path().join("base-1.0.0"),
        ]
    );
}

/// Test a failing dependency fails the parent with context.
#[tokio::test]
async fn test_dependency_failure_is_wrapped() {
    let tmp = TempDir::new().unwrap();
    let downloader = Arc::new(
        MockDownloader::new()
            .with_dependencies("app", vec![PluginRef::new("lib", "2.0.0")])
            .failing("lib"),
    );
    let source = AcquisitionSource::new(
        context(tmp.path(), &downloader),
        Vec::new(),
        PluginClass::External,
    );

    match source.ensure(&test_install("app", "1.0.0")).await.unwrap_err() {
        AcquireError::Dependency { plugin_id, dependency, .. } => {
            assert_eq!(plugin_id, "app");
            assert_eq!(dependency, PluginRef::new("lib", "2.0.0").to_string());
        },
        other => panic!("unexpected error: {other}"),
    }
}

/// Test a dependency already in flight counts as ensured.
#[tokio::test]
async fn test_duplicate_dependency_is_tolerated() {
    let tmp = TempDir::new().unwrap();
    let downloader = Arc::new(
        MockDownloader::new()
            .with_dependencies("app", vec![PluginRef::new("lib", "2.0.0")])
            .duplicate("lib"),
    );
    let source = AcquisitionSource::new(
        context(tmp.path(), &downloader),
        Vec::new(),
        PluginClass::External,
    );

    let paths = source.ensure(&test_install("app", "1.0.0")).await.unwrap();
    assert_eq!(paths, vec![tmp.path().join("app-1.0.0")]);
}

/// Test overly deep dependency chains are cut off.
#[tokio::test]
async fn test_dependency_depth_limit() {
    let tmp = TempDir::new().unwrap();
    let mut downloader = MockDownloader::new();
    for i in 0..12 {
        downloader = downloader.with_dependencies(
            &format!("p{i}"),
            vec![PluginRef::new(format!("p{}", i + 1), "1.0.0")],
        );
    }
    let downloader = Arc::new(downloader);
    let source = AcquisitionSource::new(
        context(tmp.path(), &downloader),
        Vec::new(),
        PluginClass::External,
    );

    let err = source.ensure(&test_install("p0", "1.0.0")).await.unwrap_err();
    assert!(err.to_string().contains("exceeds depth"), "{err}");
}

/// Test discovery skips failed and in-flight installs but keeps the rest.
#[tokio::test]
async fn test_discover_isolates_failures() {
    let tmp = TempDir::new().unwrap();
    let downloader = Arc::new(MockDownloader::new().failing("broken").duplicate("busy"));
    let installs = vec![
        test_install("broken", "1.0.0"),
        test_install("clock", "2.1.0"),
        test_install("busy", "1.0.0"),
        test_install("clock", "2.1.0"),
    ];
    let source = AcquisitionSource::new(
        context(tmp.path(), &downloader),
        installs,
        PluginClass::External,
    );

    let bundles = source.discover().await.unwrap();
    assert_eq!(bundles.len(), 1);
    assert_eq!(bundles[0].id(), "clock");
    assert_eq!(bundles[0].version(), "2.1.0");
}

/// Test discovery is not consulted when nothing was ensured.
#[tokio::test]
async fn test_discover_with_nothing_ensured() {
    let tmp = TempDir::new().unwrap();
    let downloader = Arc::new(MockDownloader::new().failing("broken"));
    let discovery = Arc::new(CountingDiscovery::default());
    let ctx = AcquisitionContext::new(tmp.path(), downloader, discovery.clone());
    let source = AcquisitionSource::new(
        ctx,
        vec![test_install("broken", "1.0.0")],
        PluginClass::External,
    );

    assert!(source.discover().await.unwrap().is_empty());
    assert_eq!(discovery.calls.load(Ordering::SeqCst), 0);
}

/// Test download metrics reflect successes, failures and duplicates.
#[tokio::test]
async fn test_download_metrics() {
    let tmp = TempDir::new().unwrap();
    let downloader = Arc::new(MockDownloader::new().failing("broken").duplicate("busy"));
    let ctx = context(tmp.path(), &downloader);
    let source = AcquisitionSource::new(
        ctx.clone(),
        vec![
            test_install("clock", "2.1.0"),
            test_install("broken", "1.0.0"),
            test_install("busy", "1.0.0"),
        ],
        PluginClass::External,
    );
    source.discover().await.unwrap();

    let snapshot = ctx.metrics().snapshot();
    assert_eq!(snapshot.attempts, 3);
    assert_eq!(snapshot.successes, 1);
    assert_eq!(snapshot.failures, 1);
    assert_eq!(snapshot.duplicates, 1);
    assert_eq!(snapshot.durations.len(), 2);
    assert_eq!(snapshot.durations["clock:2.1.0"].count, 1);
}

/// Test the cache installer loads the acquired plugin.
#[tokio::test]
async fn test_cache_installer_add_and_remove() {
    let tmp = TempDir::new().unwrap();
    let downloader = Arc::new(MockDownloader::new().with_latest("clock", "2.1.0"));
    let registry = MockRegistry::new();
    let loader = Arc::new(MockLoader::new(registry.clone()));
    let installer = CacheInstaller::new(context(tmp.path(), &downloader), loader.clone());

    installer
        .add("clock", "", &InstallOptions::default().with_class(PluginClass::Cdn))
        .await
        .unwrap();
    let installed = registry.plugin("clock", "2.1.0").await.unwrap();
    assert_eq!(installed.class, PluginClass::Cdn);

    installer.remove("clock", "2.1.0").await.unwrap();
    assert!(registry.plugin("clock", "").await.is_none());
    assert_eq!(loader.unloaded(), vec!["clock".to_string()]);
}

/// Test the cache installer reports plugins that could not be acquired.
#[tokio::test]
async fn test_cache_installer_not_loaded() {
    let tmp = TempDir::new().unwrap();
    let downloader = Arc::new(MockDownloader::new().failing("clock"));
    let loader = Arc::new(MockLoader::new(MockRegistry::new()));
    let installer = CacheInstaller::new(context(tmp.path(), &downloader), loader);

    let err = installer
        .add("clock", "1.0.0", &InstallOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AcquireError::NotLoaded { .. }));
}

/// Test custom URLs get their own version-cache entry.
#[tokio::test]
async fn test_url_installs_are_keyed_separately() {
    let tmp = TempDir::new().unwrap();
    let downloader = Arc::new(MockDownloader::new().with_latest("clock", "3.0.0"));
    let source = AcquisitionSource::new(
        context(tmp.path(), &downloader),
        Vec::new(),
        PluginClass::External,
    );
    let install = PluginInstall::new("clock", "", SourceTag::PluginStore)
        .with_url("https://example.com/clock.tar.gz");

    source.ensure(&install).await.unwrap();
    source.ensure(&test_install("clock", "")).await.unwrap();
    assert_eq!(downloader.calls(), 2);
}
