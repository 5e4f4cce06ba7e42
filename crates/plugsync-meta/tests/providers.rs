//! Integration tests for the metadata providers and the provider chain.

use std::sync::Arc;
use std::time::Duration;

use plugsync_core::{PluginClass, PluginManifest};
use plugsync_meta::{
    CatalogProvider, CloudProvider, CoreProvider, LocalProvider, MetaProvider, ProviderError,
    ProviderManager,
};
use plugsync_test::{MockAnswer, MockProvider, MockRegistry, test_meta, write_manifest};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const HOUR: Duration = Duration::from_secs(3600);

fn chain(providers: Vec<Arc<dyn MetaProvider>>) -> ProviderManager {
    ProviderManager::new(providers).unwrap()
}

/// Test the catalog decodes a version document and serves repeats from its cache.
#[tokio::test]
async fn test_catalog_fetches_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/clock/versions/2.1.0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "json": {"id": "clock", "name": "Clock", "type": "panel", "info": {"version": "2.1.0"}},
            "signatureType": "community",
            "signatureOrg": "Grafana Labs",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let catalog = CatalogProvider::new(server.uri()).unwrap();
    let first = catalog.get_meta("clock", "2.1.0").await.unwrap();
    let second = catalog.get_meta("clock", "2.1.0").await.unwrap();

    assert_eq!(first.meta.name, "Clock");
    assert_eq!(first.meta.plugin_type, "panel");
    assert_eq!(first.ttl, HOUR);
    assert_eq!(
        first.meta.signature.as_ref().map(|s| s.signature_type.as_str()),
        Some("community")
    );
    assert_eq!(first, second);
}

/// Test an empty version asks the catalog for `latest`.
#[tokio::test]
async fn test_catalog_latest() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/clock/versions/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "json": {"id": "clock", "info": {"version": "3.0.0"}},
        })))
        .mount(&server)
        .await;

    let catalog = CatalogProvider::new(server.uri()).unwrap();
    let result = catalog.get_meta("clock", "").await.unwrap();
    assert_eq!(result.meta.version, "3.0.0");
}

/// Test a 404 is `NotFound` and a 500 is an upstream error.
#[tokio::test]
async fn test_catalog_error_mapping() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone/versions/1.0.0"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/broken/versions/1.0.0"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let catalog = CatalogProvider::new(server.uri()).unwrap();
    assert!(catalog.get_meta("gone", "1.0.0").await.unwrap_err().is_not_found());
    assert!(matches!(
        catalog.get_meta("broken", "1.0.0").await.unwrap_err(),
        ProviderError::Upstream { provider: "catalog", .. }
    ));
}

/// Test the catalog rejects a document for a different plugin.
#[tokio::test]
async fn test_catalog_id_mismatch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/clock/versions/1.0.0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "json": {"id": "other", "info": {"version": "1.0.0"}},
        })))
        .mount(&server)
        .await;

    let catalog = CatalogProvider::new(server.uri()).unwrap();
    assert!(matches!(
        catalog.get_meta("clock", "1.0.0").await.unwrap_err(),
        ProviderError::Decode { .. }
    ));
}

/// Test the cloud inventory is fetched once and filtered by version.
#[tokio::test]
async fn test_cloud_inventory_snapshot() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/plugins"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "clock", "version": "2.1.0", "type": "panel"},
            {"id": "worldmap", "version": "1.0.0"},
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let cloud = CloudProvider::new(server.uri()).unwrap();
    assert_eq!(cloud.get_meta("clock", "").await.unwrap().meta.version, "2.1.0");
    assert_eq!(cloud.get_meta("clock", "2.1.0").await.unwrap().meta.plugin_type, "panel");
    assert!(cloud.get_meta("clock", "9.9.9").await.unwrap_err().is_not_found());
    assert!(cloud.get_meta("missing", "").await.unwrap_err().is_not_found());
}

/// Test a failing inventory endpoint is an upstream error, not `NotFound`.
#[tokio::test]
async fn test_cloud_upstream_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/plugins"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let cloud = CloudProvider::new(server.uri()).unwrap();
    let err = cloud.get_meta("clock", "").await.unwrap_err();
    assert!(!err.is_not_found());
}

/// Test core plugins are indexed from disk and nested plugins become children.
#[tokio::test]
async fn test_core_provider_links_children() {
    let dir = TempDir::new().unwrap();
    write_manifest(&dir.path().join("app"), "app", "1.0.0");
    write_manifest(&dir.path().join("app").join("panels").join("inner"), "app-panel", "1.0.0");
    write_manifest(&dir.path().join("graph"), "graph", "");

    let core = CoreProvider::new(dir.path());
    let app = core.get_meta("app", "").await.unwrap().meta;
    assert_eq!(app.children, vec!["app-panel".to_string()]);
    assert_eq!(app.class, Some(PluginClass::Core));

    let child = core.get_meta("app-panel", "").await.unwrap().meta;
    assert_eq!(child.parent_id.as_deref(), Some("app"));

    // The requested version is not compared for core plugins.
    assert!(core.get_meta("graph", "7.0.0").await.is_ok());
    assert!(core.get_meta("nope", "").await.unwrap_err().is_not_found());
}

/// Test the core provider tolerates a missing directory and a bad manifest.
#[tokio::test]
async fn test_core_provider_missing_dir_and_bad_manifest() {
    let dir = TempDir::new().unwrap();
    let missing = CoreProvider::new(dir.path().join("nope"));
    assert!(missing.get_meta("any", "").await.unwrap_err().is_not_found());

    std::fs::create_dir_all(dir.path().join("bad")).unwrap();
    std::fs::write(dir.path().join("bad").join("plugin.json"), b"{ nope").unwrap();
    let mut good = PluginManifest::new("good", "1.0.0");
    good.name = "Good".to_string();
    plugsync_test::write_plugin(&dir.path().join("good"), &good);

    let core = CoreProvider::new(dir.path());
    assert_eq!(core.get_meta("good", "").await.unwrap().meta.name, "Good");
    assert!(core.get_meta("bad", "").await.unwrap_err().is_not_found());
}

/// Test the local provider answers from the node registry with its class.
#[tokio::test]
async fn test_local_provider_uses_registry() {
    let registry = MockRegistry::new().with_plugin("clock", "2.1.0", PluginClass::External);
    let local = LocalProvider::new(Arc::new(registry));

    let result = local.get_meta("clock", "").await.unwrap();
    assert_eq!(result.meta.version, "2.1.0");
    assert_eq!(result.meta.class, Some(PluginClass::External));
    assert!(local.get_meta("clock", "1.0.0").await.unwrap_err().is_not_found());
}

/// Test the chain falls through `NotFound` and caches the first success.
#[tokio::test]
async fn test_chain_order_and_cache() {
    let local = Arc::new(MockProvider::new("local"));
    let catalog = Arc::new(MockProvider::new("catalog").with_meta(test_meta("clock", "2.1.0"), HOUR));
    let manager = chain(vec![local.clone(), catalog.clone()]);

    let first = manager.get_meta("clock", "2.1.0").await.unwrap();
    let second = manager.get_meta("clock", "2.1.0").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(local.calls(), 1);
    assert_eq!(catalog.calls(), 1);
    assert_eq!(manager.cached_entries().await, 1);
}

/// Test a hard failure earlier in the chain does not hide a later success.
#[tokio::test]
async fn test_chain_error_then_success() {
    let broken = Arc::new(MockProvider::new("cloud").with_default(MockAnswer::Fail("down".into())));
    let catalog = Arc::new(MockProvider::new("catalog").with_meta(test_meta("clock", "1.0.0"), HOUR));
    let manager = chain(vec![broken, catalog]);

    assert_eq!(manager.get_meta("clock", "1.0.0").await.unwrap().meta.id, "clock");
}

/// Test the last hard failure is surfaced when nothing succeeds.
#[tokio::test]
async fn test_chain_surfaces_last_error() {
    let first = Arc::new(MockProvider::new("cloud").with_default(MockAnswer::Fail("first".into())));
    let second = Arc::new(MockProvider::new("catalog").with_default(MockAnswer::Fail("second".into())));
    let absent = Arc::new(MockProvider::new("local"));
    let manager = chain(vec![first, second, absent]);

    match manager.get_meta("clock", "").await.unwrap_err() {
        ProviderError::Chain { source, .. } => {
            assert!(matches!(*source, ProviderError::Upstream { provider: "catalog", .. }));
        },
        other => panic!("unexpected error: {other}"),
    }
}

/// Test all-`NotFound` chains report `NotFound`.
#[tokio::test]
async fn test_chain_all_not_found() {
    let manager = chain(vec![
        Arc::new(MockProvider::new("local")),
        Arc::new(MockProvider::new("catalog")),
    ]);
    assert!(manager.get_meta("clock", "").await.unwrap_err().is_not_found());
}

/// Test zero-TTL answers are never cached.
#[tokio::test]
async fn test_chain_zero_ttl_not_cached() {
    let provider = Arc::new(
        MockProvider::new("catalog").with_meta(test_meta("clock", "1.0.0"), Duration::ZERO),
    );
    let manager = chain(vec![provider.clone()]);

    manager.get_meta("clock", "1.0.0").await.unwrap();
    manager.get_meta("clock", "1.0.0").await.unwrap();
    assert_eq!(provider.calls(), 2);
    assert_eq!(manager.cached_entries().await, 0);
}

/// Test expired entries are re-fetched and swept.
#[tokio::test(start_paused = true)]
async fn test_chain_expiry_and_sweep() {
    let provider = Arc::new(
        MockProvider::new("catalog").with_meta(test_meta("clock", "1.0.0"), Duration::from_secs(60)),
    );
    let other = Arc::new(
        MockProvider::new("other").with_meta(test_meta("graph", "1.0.0"), Duration::from_secs(60)),
    );
    let manager = chain(vec![provider.clone(), other]);

    manager.get_meta("clock", "1.0.0").await.unwrap();
    manager.get_meta("graph", "1.0.0").await.unwrap();
    tokio::time::advance(Duration::from_secs(61)).await;

    manager.get_meta("clock", "1.0.0").await.unwrap();
    assert_eq!(provider.calls(), 3);

    // "graph" expired and was never re-read, so only it is swept.
    assert_eq!(manager.sweep_expired().await, 1);
    assert_eq!(manager.cached_entries().await, 1);
}

/// Test the chain distinguishes versions in its cache key.
#[tokio::test]
async fn test_chain_cache_is_per_version() {
    let provider = Arc::new(
        MockProvider::new("catalog")
            .with_meta(test_meta("clock", "1.0.0"), HOUR)
            .with_meta(test_meta("clock", "2.0.0"), HOUR),
    );
    let manager = chain(vec![provider.clone()]);

    assert_eq!(manager.get_meta("clock", "1.0.0").await.unwrap().meta.version, "1.0.0");
    assert_eq!(manager.get_meta("clock", "2.0.0").await.unwrap().meta.version, "2.0.0");
    assert_eq!(provider.calls(), 2);
}
