//! Declaring installs in the record store.

use std::sync::Arc;

use async_trait::async_trait;
use plugsync_core::{InstallRecord, InstallSpec, PluginInstall, ResourceKey, SourceTag, SourceType};
use tracing::{debug, info};

use crate::client::ResourceClient;
use crate::error::{ClientError, InstallResult};

/// Creates, updates and removes install records on behalf of a source.
#[async_trait]
pub trait Registrar: Send + Sync {
    /// Make sure a record for `install` exists in `namespace`.
    async fn register(&self, namespace: &str, install: &PluginInstall) -> InstallResult<()>;

    /// Remove the record `name` from `namespace` if `source` owns it.
    async fn unregister(&self, namespace: &str, name: &str, source: &SourceTag)
    -> InstallResult<()>;
}

/// [`Registrar`] over a [`ResourceClient`].
///
/// A record belongs to the source that created it. Registering from a
/// different source leaves it alone, and re-registering an unchanged
/// install writes nothing.
#[derive(Clone)]
pub struct InstallRegistrar {
    client: Arc<dyn ResourceClient>,
}

impl std::fmt::Debug for InstallRegistrar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallRegistrar").finish_non_exhaustive()
    }
}

impl InstallRegistrar {
    /// Create a registrar.
    #[must_use]
    pub fn new(client: Arc<dyn ResourceClient>) -> Self {
        Self { client }
    }
}

fn differs(spec: &InstallSpec, install: &PluginInstall) -> bool {
    spec.version != install.version
        || spec.class != install.class
        || spec.url != install.url
        || spec.parent_id != install.parent_id
}

#[async_trait]
impl Registrar for InstallRegistrar {
    async fn register(&self, namespace: &str, install: &PluginInstall) -> InstallResult<()> {
        let key = ResourceKey::new(namespace, install.id.clone());
        let existing = match self.client.get(&key).await {
            Ok(record) => record,
            Err(e) if e.is_not_found() => {
                let record = InstallRecord::from_install(namespace, install);
                match self.client.create(record).await {
                    Ok(_) => {
                        info!(key = %key, version = %install.version, source = %install.source, "registered install");
                    },
                    Err(ClientError::AlreadyExists { .. }) => {
                        debug!(key = %key, "install registered concurrently");
                    },
                    Err(e) => return Err(e.into()),
                }
                return Ok(());
            },
            Err(e) => return Err(e.into()),
        };

        let owner = existing.source();
        if owner != install.source {
            debug!(key = %key, owner = %owner, source = %install.source, "install owned by another source");
            return Ok(());
        }
        if !differs(&existing.spec, install) {
            return Ok(());
        }

        let mut updated = existing;
        updated.spec.version.clone_from(&install.version);
        updated.spec.class = install.class;
        updated.spec.url.clone_from(&install.url);
        updated.spec.parent_id.clone_from(&install.parent_id);
        updated.spec.source_type = SourceType::for_install(install).as_str().to_string();
        self.client.update(updated).await?;
        info!(key = %key, version = %install.version, "updated install");
        Ok(())
    }

    async fn unregister(
        &self,
        namespace: &str,
        name: &str,
        source: &SourceTag,
    ) -> InstallResult<()> {
        let key = ResourceKey::new(namespace, name);
        let existing = match self.client.get(&key).await {
            Ok(record) => record,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let owner = existing.source();
        if owner != *source {
            debug!(key = %key, owner = %owner, source = %source, "not removing install owned by another source");
            return Ok(());
        }

        match self.client.delete(&key).await {
            Ok(()) => {
                info!(key = %key, "unregistered install");
                Ok(())
            },
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
