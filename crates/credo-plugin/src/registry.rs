//! Plugin registries and lazy process management.
//!
//! Two parallel registries are maintained: credential plugins indexed by
//! credential-spec type and repository plugins indexed by consumer-identity
//! type, with the wildcard type `*` accepted for generic providers. An
//! in-process registration always wins over an external binary for the same
//! type. External processes are started lazily on first dispatch and shared
//! across lookups.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use derive_builder::Builder;
use serde_json::Value;
use tokio::sync::{Mutex, OnceCell};

use credo_core::plugin::{
    CredentialPlugin, CredentialPluginProvider, RepositoryPlugin, RepositoryPluginProvider,
    SharedCredentialPlugin, SharedRepositoryPlugin,
};
use credo_core::{Raw, TypeTag};

use crate::client::PluginClient;
use crate::convert::ExternalPlugin;
use crate::discovery::{self, DiscoveredPlugin};
use crate::error::{Error, Result};
use crate::process::{PluginProcess, PluginState};
use crate::transport::{self, TransportKind};
use crate::wire::{PLUGIN_KIND_CREDENTIAL, PLUGIN_KIND_REPOSITORY, StartupConfig};

/// Tracing target for the registry.
const TRACING_TARGET: &str = "credo_plugin::registry";

/// Configuration of a [`PluginRegistry`].
#[derive(Debug, Clone, Builder)]
#[builder(
    name = "RegistryConfigBuilder",
    pattern = "owned",
    setter(into, strip_option, prefix = "with")
)]
pub struct RegistryConfig {
    /// Directory walked for plugin binaries; `None` disables discovery.
    #[builder(default)]
    pub plugin_dir: Option<PathBuf>,
    /// Idle timeout forwarded to plugins; plugins police it themselves.
    #[builder(default = "Duration::from_secs(60)")]
    pub idle_timeout: Duration,
    /// Deadline for a started plugin to become healthy.
    #[builder(default = "Duration::from_secs(10)")]
    pub startup_deadline: Duration,
    /// Grace period between interrupt and kill at shutdown.
    #[builder(default = "Duration::from_secs(5)")]
    pub shutdown_grace: Duration,
    /// Host configuration objects, filtered per plugin's `configTypes`.
    #[builder(default)]
    pub config_objects: Vec<Raw>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            plugin_dir: None,
            idle_timeout: Duration::from_secs(60),
            startup_deadline: Duration::from_secs(10),
            shutdown_grace: Duration::from_secs(5),
            config_objects: Vec::new(),
        }
    }
}

impl RegistryConfig {
    /// Returns a builder for the registry configuration.
    pub fn builder() -> RegistryConfigBuilder {
        RegistryConfigBuilder::default()
    }
}

#[derive(Clone)]
enum Registration<P> {
    Internal(P),
    External {
        plugin_id: String,
        schema: Option<Value>,
    },
}

#[derive(Default)]
struct RegistryInner {
    discovered_once: bool,
    discovered: HashMap<String, DiscoveredPlugin>,
    started: HashMap<String, Arc<PluginProcess>>,
    credential_types: HashMap<String, Registration<SharedCredentialPlugin>>,
    repository_types: HashMap<String, Registration<SharedRepositoryPlugin>>,
}

/// Registry of credential and repository plugins.
///
/// Implements the provider seams consumed by the resolution graph. Process
/// handles are shared, not duplicated, across lookups; plugin lifetime is
/// bound to this registry, never to a request.
pub struct PluginRegistry {
    config: RegistryConfig,
    transport: OnceCell<TransportKind>,
    inner: Mutex<RegistryInner>,
}

impl PluginRegistry {
    /// Creates a registry.
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            transport: OnceCell::new(),
            inner: Mutex::new(RegistryInner::default()),
        }
    }

    /// Registers an in-process credential plugin for a spec type.
    ///
    /// Internal registrations win over external binaries for the same type.
    pub async fn register_credential_plugin(
        &self,
        spec_type: impl Into<String>,
        plugin: impl CredentialPlugin + 'static,
    ) {
        let spec_type = spec_type.into();
        let mut inner = self.inner.lock().await;
        inner
            .credential_types
            .insert(spec_type.clone(), Registration::Internal(Arc::new(plugin)));
        tracing::debug!(
            target: TRACING_TARGET,
            spec_type = %spec_type,
            "registered internal credential plugin"
        );
    }

    /// Registers an in-process repository plugin for a consumer type.
    ///
    /// The wildcard type `*` registers a generic any-consumer provider.
    pub async fn register_repository_plugin(
        &self,
        consumer_type: impl Into<String>,
        plugin: impl RepositoryPlugin + 'static,
    ) {
        let consumer_type = consumer_type.into();
        let mut inner = self.inner.lock().await;
        inner
            .repository_types
            .insert(consumer_type.clone(), Registration::Internal(Arc::new(plugin)));
        tracing::debug!(
            target: TRACING_TARGET,
            consumer_type = %consumer_type,
            "registered internal repository plugin"
        );
    }

    /// Runs discovery eagerly and returns the number of known binaries.
    ///
    /// Lookups trigger discovery on demand; calling this is only needed to
    /// surface discovery errors early.
    pub async fn discover(&self) -> Result<usize> {
        let mut inner = self.inner.lock().await;
        self.ensure_discovered(&mut inner).await?;
        Ok(inner.discovered.len())
    }

    /// Returns the lifecycle states of all started plugins.
    pub async fn states(&self) -> HashMap<String, PluginState> {
        let inner = self.inner.lock().await;
        inner
            .started
            .iter()
            .map(|(id, process)| (id.clone(), process.state()))
            .collect()
    }

    /// Shuts down every started plugin, joining all failures.
    pub async fn shutdown(&self) -> Result<()> {
        let started: Vec<_> = {
            let mut inner = self.inner.lock().await;
            inner.started.drain().collect()
        };
        let mut causes = Vec::new();
        for (id, process) in started {
            tracing::debug!(target: TRACING_TARGET, id = %id, "stopping plugin");
            if let Err(err) = process.shutdown(self.config.shutdown_grace).await {
                causes.push(err);
            }
        }
        if causes.is_empty() {
            Ok(())
        } else {
            Err(Error::Shutdown { causes })
        }
    }

    async fn ensure_discovered(&self, inner: &mut RegistryInner) -> Result<()> {
        if inner.discovered_once {
            return Ok(());
        }
        inner.discovered_once = true;
        let Some(dir) = &self.config.plugin_dir else {
            return Ok(());
        };

        for plugin in discovery::discover(dir).await? {
            for capability in plugin.capabilities.of_kind(PLUGIN_KIND_CREDENTIAL) {
                inner
                    .credential_types
                    .entry(capability.kind.clone())
                    .or_insert_with(|| Registration::External {
                        plugin_id: plugin.id.clone(),
                        schema: capability.json_schema.clone(),
                    });
            }
            for capability in plugin.capabilities.of_kind(PLUGIN_KIND_REPOSITORY) {
                inner
                    .repository_types
                    .entry(capability.kind.clone())
                    .or_insert_with(|| Registration::External {
                        plugin_id: plugin.id.clone(),
                        schema: capability.json_schema.clone(),
                    });
            }
            inner.discovered.insert(plugin.id.clone(), plugin);
        }
        Ok(())
    }

    async fn ensure_started(
        &self,
        inner: &mut RegistryInner,
        plugin_id: &str,
    ) -> Result<Arc<PluginProcess>> {
        if let Some(process) = inner.started.get(plugin_id) {
            return Ok(process.clone());
        }
        let discovered = inner
            .discovered
            .get(plugin_id)
            .ok_or_else(|| Error::startup(plugin_id, "binary was never discovered"))?
            .clone();

        let transport = *self.transport.get_or_init(transport::negotiate).await;
        let startup = StartupConfig {
            id: discovered.id.clone(),
            transport,
            idle_timeout_secs: self.config.idle_timeout.as_secs(),
            config_types: filtered_config(
                &self.config.config_objects,
                &discovered.capabilities.config_types,
            ),
        };
        let process = Arc::new(
            PluginProcess::start(&discovered, &startup, self.config.startup_deadline).await?,
        );
        inner.started.insert(discovered.id.clone(), process.clone());
        Ok(process)
    }

    fn external_plugin(
        &self,
        process: &Arc<PluginProcess>,
        schema: Option<&Value>,
    ) -> Result<ExternalPlugin> {
        let mut client = PluginClient::new(process.id(), process.endpoint().clone());
        if let Some(schema) = schema {
            client = client.with_schema(schema)?;
        }
        Ok(ExternalPlugin::new(process.clone(), client))
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("config", &self.config)
            .finish()
    }
}

#[async_trait]
impl CredentialPluginProvider for PluginRegistry {
    async fn credential_plugin(
        &self,
        spec_type: &TypeTag,
    ) -> credo_core::Result<Option<SharedCredentialPlugin>> {
        let mut inner = self.inner.lock().await;
        self.ensure_discovered(&mut inner)
            .await
            .map_err(credo_core::Error::plugin)?;

        let registration = match inner.credential_types.get(&spec_type.to_string()) {
            Some(registration) => registration.clone(),
            None => return Ok(None),
        };
        match registration {
            Registration::Internal(plugin) => Ok(Some(plugin)),
            Registration::External { plugin_id, schema } => {
                let process = self
                    .ensure_started(&mut inner, &plugin_id)
                    .await
                    .map_err(credo_core::Error::plugin)?;
                let external = self
                    .external_plugin(&process, schema.as_ref())
                    .map_err(credo_core::Error::plugin)?;
                Ok(Some(Arc::new(external)))
            }
        }
    }
}

#[async_trait]
impl RepositoryPluginProvider for PluginRegistry {
    async fn repository_plugin(
        &self,
        consumer_type: &TypeTag,
    ) -> credo_core::Result<Option<SharedRepositoryPlugin>> {
        let mut inner = self.inner.lock().await;
        self.ensure_discovered(&mut inner)
            .await
            .map_err(credo_core::Error::plugin)?;

        let registration = match inner.repository_types.get(&consumer_type.to_string()) {
            Some(registration) => registration.clone(),
            None => return Ok(None),
        };
        match registration {
            Registration::Internal(plugin) => Ok(Some(plugin)),
            Registration::External { plugin_id, schema } => {
                let process = self
                    .ensure_started(&mut inner, &plugin_id)
                    .await
                    .map_err(credo_core::Error::plugin)?;
                let external = self
                    .external_plugin(&process, schema.as_ref())
                    .map_err(credo_core::Error::plugin)?;
                Ok(Some(Arc::new(external)))
            }
        }
    }
}

/// Selects the configuration objects a plugin asked for.
fn filtered_config(objects: &[Raw], config_types: &[String]) -> Vec<Raw> {
    objects
        .iter()
        .filter(|raw| config_types.contains(&raw.kind))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use credo_core::{ConsumerIdentity, Credentials};

    struct NullPlugin;

    #[async_trait]
    impl CredentialPlugin for NullPlugin {
        async fn consumer_identity(&self, _config: &Raw) -> credo_core::Result<ConsumerIdentity> {
            Ok(ConsumerIdentity::with_type("Null"))
        }

        async fn resolve(
            &self,
            _config: &Raw,
            _identity: &ConsumerIdentity,
            _credentials: Option<&Credentials>,
        ) -> credo_core::Result<Credentials> {
            Ok(Credentials::new())
        }
    }

    #[tokio::test]
    async fn internal_plugins_resolve_without_discovery() {
        let registry = PluginRegistry::new(RegistryConfig::default());
        registry.register_credential_plugin("Null/v1", NullPlugin).await;

        let tag = TypeTag::parse("Null/v1").unwrap();
        let plugin = registry.credential_plugin(&tag).await.unwrap();
        assert!(plugin.is_some());

        let unknown = TypeTag::parse("Unknown/v1").unwrap();
        assert!(registry.credential_plugin(&unknown).await.unwrap().is_none());
    }

    #[test]
    fn config_objects_are_filtered_by_requested_types() {
        let objects = vec![Raw::new("vault.config/v1"), Raw::new("other.config/v1")];
        let filtered = filtered_config(&objects, &["vault.config/v1".to_string()]);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].kind, "vault.config/v1");
    }

    #[test]
    fn registry_config_builder_applies_defaults() {
        let config = RegistryConfig::builder()
            .with_plugin_dir("/var/lib/credo/plugins")
            .build()
            .unwrap();
        assert_eq!(config.idle_timeout, Duration::from_secs(60));
        assert_eq!(config.startup_deadline, Duration::from_secs(10));
        assert_eq!(
            config.plugin_dir.as_deref(),
            Some(std::path::Path::new("/var/lib/credo/plugins"))
        );
    }
}
