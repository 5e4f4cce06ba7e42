//! Mock implementations for testing.
//!
//! All mocks use `std::sync::Mutex` internally so builders work without a
//! runtime. Poisoned locks are recovered rather than propagated.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use plugsync_acquire::{
    AcquireError, AcquireResult, DownloadOptions, Downloader, ExtractedArchive, InstallOptions,
    LoadedPlugin, Loader, PluginInstaller, PluginSource,
};
use plugsync_core::{
    InstallRecord, InstalledPlugin, PluginClass, PluginManifest, PluginMeta, PluginRef,
    PluginRegistry, ResourceKey, cache_key,
};
use plugsync_install::{ClientError, ClientResult, MemoryResourceStore, ResourceClient};
use plugsync_meta::{MetaProvider, MetaResult, ProviderError, ProviderResult};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// MockProvider
// ---------------------------------------------------------------------------

/// A scripted provider answer.
#[derive(Debug, Clone)]
pub enum MockAnswer {
    /// Answer with this metadata and TTL.
    Meta(PluginMeta, Duration),
    /// Answer `NotFound`.
    NotFound,
    /// Fail with an upstream error.
    Fail(String),
}

/// Scripted [`MetaProvider`].
///
/// Answers are keyed by `{id}:{version}`; anything unscripted gets the
/// default answer, `NotFound` unless changed.
#[derive(Debug)]
pub struct MockProvider {
    name: &'static str,
    answers: Mutex<HashMap<String, MockAnswer>>,
    default: MockAnswer,
    calls: AtomicUsize,
}

impl MockProvider {
    /// Create a provider that knows nothing.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            answers: Mutex::new(HashMap::new()),
            default: MockAnswer::NotFound,
            calls: AtomicUsize::new(0),
        }
    }

    /// Answer for `meta.id` at `meta.version`.
    #[must_use]
    pub fn with_meta(self, meta: PluginMeta, ttl: Duration) -> Self {
        let (id, version) = (meta.id.clone(), meta.version.clone());
        self.with_answer(&id, &version, MockAnswer::Meta(meta, ttl))
    }

    /// Script the answer for one plugin version.
    #[must_use]
    pub fn with_answer(self, plugin_id: &str, version: &str, answer: MockAnswer) -> Self {
        lock(&self.answers).insert(cache_key(plugin_id, version), answer);
        self
    }

    /// Answer for everything unscripted.
    #[must_use]
    pub fn with_default(mut self, answer: MockAnswer) -> Self {
        self.default = answer;
        self
    }

    /// Number of lookups so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetaProvider for MockProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn get_meta(&self, plugin_id: &str, version: &str) -> ProviderResult<MetaResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let answer = lock(&self.answers)
            .get(&cache_key(plugin_id, version))
            .cloned()
            .unwrap_or_else(|| self.default.clone());
        match answer {
            MockAnswer::Meta(meta, ttl) => Ok(MetaResult::new(meta, ttl)),
            MockAnswer::NotFound => Err(ProviderError::not_found(plugin_id, version)),
            MockAnswer::Fail(message) => Err(ProviderError::Upstream {
                provider: self.name,
                message,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// MockDownloader
// ---------------------------------------------------------------------------

/// [`Downloader`] that writes a manifest instead of fetching anything.
///
/// Latest requests resolve to the version set with
/// [`with_latest`](Self::with_latest), or `1.0.0`.
#[derive(Debug, Default)]
pub struct MockDownloader {
    latest: Mutex<HashMap<String, String>>,
    dependencies: Mutex<HashMap<String, Vec<PluginRef>>>,
    failing: Mutex<HashSet<String>>,
    in_flight: Mutex<HashSet<String>>,
    delay: Option<Duration>,
    requests: Mutex<Vec<PluginRef>>,
}

impl MockDownloader {
    /// Create a downloader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Version that latest requests for `plugin_id` resolve to.
    #[must_use]
    pub fn with_latest(self, plugin_id: &str, version: &str) -> Self {
        lock(&self.latest).insert(plugin_id.to_string(), version.to_string());
        self
    }

    /// Declare dependencies in `plugin_id`'s manifest.
    #[must_use]
    pub fn with_dependencies(self, plugin_id: &str, deps: Vec<PluginRef>) -> Self {
        lock(&self.dependencies).insert(plugin_id.to_string(), deps);
        self
    }

    /// Make downloads of `plugin_id` fail.
    #[must_use]
    pub fn failing(self, plugin_id: &str) -> Self {
        lock(&self.failing).insert(plugin_id.to_string());
        self
    }

    /// Report downloads of `plugin_id` as already in flight.
    #[must_use]
    pub fn duplicate(self, plugin_id: &str) -> Self {
        lock(&self.in_flight).insert(plugin_id.to_string());
        self
    }

    /// Sleep this long before writing anything.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of download calls.
    #[must_use]
    pub fn calls(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Every request received, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<PluginRef> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl Downloader for MockDownloader {
    async fn download(
        &self,
        plugin_id: &str,
        version: &str,
        opts: &DownloadOptions,
    ) -> AcquireResult<ExtractedArchive> {
        lock(&self.requests).push(PluginRef::new(plugin_id, version));

        if lock(&self.in_flight).contains(plugin_id) {
            return Err(AcquireError::Duplicate {
                plugin_id: plugin_id.to_string(),
                version: version.to_string(),
            });
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if lock(&self.failing).contains(plugin_id) {
            return Err(AcquireError::Http {
                url: format!("mock://{plugin_id}/{version}"),
                message: "scripted failure".to_string(),
            });
        }

        let resolved = if version.is_empty() {
            lock(&self.latest)
                .get(plugin_id)
                .cloned()
                .unwrap_or_else(|| "1.0.0".to_string())
        } else {
            version.to_string()
        };
        let deps = lock(&self.dependencies)
            .get(plugin_id)
            .cloned()
            .unwrap_or_default();

        let mut manifest = PluginManifest::new(plugin_id, resolved.clone());
        manifest.dependencies.plugins.clone_from(&deps);
        std::fs::create_dir_all(&opts.target_dir).map_err(|e| AcquireError::Io {
            path: opts.target_dir.clone(),
            source: e,
        })?;
        manifest.write_to_dir(&opts.target_dir)?;

        Ok(ExtractedArchive {
            plugin_id: plugin_id.to_string(),
            version: resolved,
            path: opts.target_dir.clone(),
            dependencies: deps,
        })
    }
}

// ---------------------------------------------------------------------------
// MockRegistry
// ---------------------------------------------------------------------------

/// In-memory [`PluginRegistry`]. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockRegistry {
    plugins: Arc<Mutex<Vec<InstalledPlugin>>>,
}

impl MockRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-register a plugin.
    #[must_use]
    pub fn with_plugin(self, plugin_id: &str, version: &str, class: PluginClass) -> Self {
        self.add(plugin_id, version, class);
        self
    }

    /// Register a plugin, replacing any loaded version.
    pub fn add(&self, plugin_id: &str, version: &str, class: PluginClass) {
        let mut plugins = lock(&self.plugins);
        plugins.retain(|p| p.id() != plugin_id);
        plugins.push(InstalledPlugin {
            meta: PluginMeta::new(plugin_id, version),
            class,
            path: PathBuf::from(format!("/plugins/{plugin_id}")),
        });
    }

    /// Deregister a plugin.
    pub fn remove(&self, plugin_id: &str) {
        lock(&self.plugins).retain(|p| p.id() != plugin_id);
    }
}

#[async_trait]
impl PluginRegistry for MockRegistry {
    async fn plugin(&self, plugin_id: &str, version: &str) -> Option<InstalledPlugin> {
        lock(&self.plugins)
            .iter()
            .find(|p| p.id() == plugin_id && (version.is_empty() || p.version() == version))
            .cloned()
    }

    async fn plugins(&self) -> Vec<InstalledPlugin> {
        lock(&self.plugins).clone()
    }
}

// ---------------------------------------------------------------------------
// MockInstaller
// ---------------------------------------------------------------------------

/// A recorded installer call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallerCall {
    /// `add(id, version, opts)`.
    Add(String, String, InstallOptions),
    /// `remove(id, version)`.
    Remove(String, String),
}

/// [`PluginInstaller`] that updates a [`MockRegistry`].
#[derive(Debug, Default)]
pub struct MockInstaller {
    registry: MockRegistry,
    calls: Mutex<Vec<InstallerCall>>,
    fail_add: bool,
    fail_remove: bool,
    silent: bool,
    delay: Option<Duration>,
}

impl MockInstaller {
    /// Create an installer registering into `registry`.
    #[must_use]
    pub fn new(registry: MockRegistry) -> Self {
        Self {
            registry,
            ..Self::default()
        }
    }

    /// Make `add` fail.
    #[must_use]
    pub fn failing_add(mut self) -> Self {
        self.fail_add = true;
        self
    }

    /// Make `remove` fail.
    #[must_use]
    pub fn failing_remove(mut self) -> Self {
        self.fail_remove = true;
        self
    }

    /// Report success from `add` without registering anything.
    #[must_use]
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Sleep this long inside `add`.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Calls received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<InstallerCall> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl PluginInstaller for MockInstaller {
    async fn add(&self, plugin_id: &str, version: &str, opts: &InstallOptions) -> AcquireResult<()> {
        lock(&self.calls).push(InstallerCall::Add(
            plugin_id.to_string(),
            version.to_string(),
            opts.clone(),
        ));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_add {
            return Err(AcquireError::Load {
                plugin_id: plugin_id.to_string(),
                message: "scripted failure".to_string(),
            });
        }
        if !self.silent {
            let version = if version.is_empty() { "1.0.0" } else { version };
            self.registry.add(plugin_id, version, opts.class);
        }
        Ok(())
    }

    async fn remove(&self, plugin_id: &str, version: &str) -> AcquireResult<()> {
        lock(&self.calls).push(InstallerCall::Remove(
            plugin_id.to_string(),
            version.to_string(),
        ));
        if self.fail_remove {
            return Err(AcquireError::Load {
                plugin_id: plugin_id.to_string(),
                message: "scripted failure".to_string(),
            });
        }
        self.registry.remove(plugin_id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockLoader
// ---------------------------------------------------------------------------

/// [`Loader`] that "loads" whatever the source discovers into a
/// [`MockRegistry`].
#[derive(Debug, Default)]
pub struct MockLoader {
    registry: MockRegistry,
    unloaded: Mutex<Vec<String>>,
}

impl MockLoader {
    /// Create a loader registering into `registry`.
    #[must_use]
    pub fn new(registry: MockRegistry) -> Self {
        Self {
            registry,
            unloaded: Mutex::new(Vec::new()),
        }
    }

    /// IDs passed to `unload`, in order.
    #[must_use]
    pub fn unloaded(&self) -> Vec<String> {
        lock(&self.unloaded).clone()
    }
}

#[async_trait]
impl Loader for MockLoader {
    async fn load(&self, source: &dyn PluginSource) -> AcquireResult<Vec<LoadedPlugin>> {
        let class = source.class();
        let loaded: Vec<LoadedPlugin> = source
            .discover()
            .await?
            .into_iter()
            .map(|bundle| LoadedPlugin {
                id: bundle.id().to_string(),
                version: bundle.version().to_string(),
                class,
                path: bundle.primary.dir,
            })
            .collect();
        for plugin in &loaded {
            self.registry.add(&plugin.id, &plugin.version, plugin.class);
        }
        Ok(loaded)
    }

    async fn unload(&self, plugin_id: &str) -> AcquireResult<()> {
        lock(&self.unloaded).push(plugin_id.to_string());
        self.registry.remove(plugin_id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// CountingClient
// ---------------------------------------------------------------------------

/// Write counters kept by [`CountingClient`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteCounts {
    /// Successful creates.
    pub creates: usize,
    /// Successful spec updates.
    pub updates: usize,
    /// Successful status updates.
    pub status_updates: usize,
    /// Successful deletes.
    pub deletes: usize,
}

/// [`ResourceClient`] over a [`MemoryResourceStore`] that counts writes and
/// can inject failures.
#[derive(Debug, Default)]
pub struct CountingClient {
    store: MemoryResourceStore,
    counts: Mutex<WriteCounts>,
    fail_names: Mutex<HashSet<String>>,
    missing_on_delete: Mutex<HashSet<String>>,
    status_conflicts: AtomicUsize,
}

impl CountingClient {
    /// Create an empty client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write to record `name` fail with a backend error.
    #[must_use]
    pub fn failing_for(self, name: &str) -> Self {
        lock(&self.fail_names).insert(name.to_string());
        self
    }

    /// Make deletes of `name` report `NotFound`.
    #[must_use]
    pub fn missing_on_delete(self, name: &str) -> Self {
        lock(&self.missing_on_delete).insert(name.to_string());
        self
    }

    /// Fail the next `n` status updates with a conflict.
    #[must_use]
    pub fn with_status_conflicts(self, n: usize) -> Self {
        self.status_conflicts.store(n, Ordering::SeqCst);
        self
    }

    /// Write counters.
    #[must_use]
    pub fn counts(&self) -> WriteCounts {
        *lock(&self.counts)
    }

    /// Seed a record without counting the write.
    ///
    /// # Panics
    ///
    /// Panics if the record already exists.
    pub async fn seed(&self, record: InstallRecord) -> InstallRecord {
        self.store.create(record).await.expect("seed record")
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &MemoryResourceStore {
        &self.store
    }

    fn check(&self, key: &ResourceKey) -> ClientResult<()> {
        if lock(&self.fail_names).contains(&key.name) {
            return Err(ClientError::Backend(format!("scripted failure for {key}")));
        }
        Ok(())
    }

    fn bump(&self, f: impl FnOnce(&mut WriteCounts)) {
        f(&mut lock(&self.counts));
    }
}

#[async_trait]
impl ResourceClient for CountingClient {
    async fn get(&self, key: &ResourceKey) -> ClientResult<InstallRecord> {
        self.store.get(key).await
    }

    async fn create(&self, record: InstallRecord) -> ClientResult<InstallRecord> {
        self.check(&record.key())?;
        let created = self.store.create(record).await?;
        self.bump(|c| c.creates = c.creates.saturating_add(1));
        Ok(created)
    }

    async fn update(&self, record: InstallRecord) -> ClientResult<InstallRecord> {
        self.check(&record.key())?;
        let updated = self.store.update(record).await?;
        self.bump(|c| c.updates = c.updates.saturating_add(1));
        Ok(updated)
    }

    async fn update_status(&self, record: InstallRecord) -> ClientResult<InstallRecord> {
        let remaining = self.status_conflicts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.status_conflicts
                .store(remaining.saturating_sub(1), Ordering::SeqCst);
            return Err(ClientError::Conflict {
                key: record.key(),
                expected: record.metadata.resource_version.clone(),
                actual: "scripted".to_string(),
            });
        }
        let updated = self.store.update_status(record).await?;
        self.bump(|c| c.status_updates = c.status_updates.saturating_add(1));
        Ok(updated)
    }

    async fn delete(&self, key: &ResourceKey) -> ClientResult<()> {
        if lock(&self.missing_on_delete).contains(&key.name) {
            return Err(ClientError::NotFound { key: key.clone() });
        }
        self.check(key)?;
        self.store.delete(key).await?;
        self.bump(|c| c.deletes = c.deletes.saturating_add(1));
        Ok(())
    }
}
