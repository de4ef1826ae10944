//! End-to-end resolution scenarios over in-process plugins.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use credo_core::plugin::{
    CredentialPlugin, CredentialPluginProvider, RepositoryPlugin, RepositoryPluginProvider,
    SharedCredentialPlugin, SharedRepositoryPlugin,
};
use credo_core::{
    Config, ConsumerEntry, ConsumerIdentity, Credentials, DirectCredentials, Raw, RepositoryEntry,
    TypeTag,
};
use credo_graph::{Options, to_graph};

fn identity(attrs: &[(&str, &str)]) -> ConsumerIdentity {
    attrs.iter().copied().collect()
}

fn direct(entries: &[(&str, &str)]) -> Raw {
    Raw::from_typed(&DirectCredentials::new(
        entries.iter().copied().collect::<Credentials>(),
    ))
    .unwrap()
}

fn consumer(attrs: &[(&str, &str)], credentials: Vec<Raw>) -> ConsumerEntry {
    let mut entry = ConsumerEntry::for_identity(identity(attrs));
    entry.credentials = credentials;
    entry
}

#[derive(Default)]
struct StaticCredentialPlugins(HashMap<String, SharedCredentialPlugin>);

impl StaticCredentialPlugins {
    fn with(mut self, spec_type: &str, plugin: impl CredentialPlugin + 'static) -> Self {
        self.0.insert(spec_type.to_string(), Arc::new(plugin));
        self
    }
}

#[async_trait]
impl CredentialPluginProvider for StaticCredentialPlugins {
    async fn credential_plugin(
        &self,
        spec_type: &TypeTag,
    ) -> credo_core::Result<Option<SharedCredentialPlugin>> {
        Ok(self.0.get(&spec_type.to_string()).cloned())
    }
}

#[derive(Default)]
struct StaticRepositoryPlugins(HashMap<String, SharedRepositoryPlugin>);

impl StaticRepositoryPlugins {
    fn with(mut self, consumer_type: &str, plugin: impl RepositoryPlugin + 'static) -> Self {
        self.0.insert(consumer_type.to_string(), Arc::new(plugin));
        self
    }
}

#[async_trait]
impl RepositoryPluginProvider for StaticRepositoryPlugins {
    async fn repository_plugin(
        &self,
        consumer_type: &TypeTag,
    ) -> credo_core::Result<Option<SharedRepositoryPlugin>> {
        Ok(self.0.get(&consumer_type.to_string()).cloned())
    }
}

/// Resolves vault specs against the vault's own direct credentials.
struct VaultPlugin;

#[async_trait]
impl CredentialPlugin for VaultPlugin {
    async fn consumer_identity(&self, config: &Raw) -> credo_core::Result<ConsumerIdentity> {
        let server = config
            .payload
            .get("serverURL")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let hostname = server
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/');
        Ok(identity(&[("type", "HashiCorpVault"), ("hostname", hostname)]))
    }

    async fn resolve(
        &self,
        _config: &Raw,
        _identity: &ConsumerIdentity,
        credentials: Option<&Credentials>,
    ) -> credo_core::Result<Credentials> {
        let deps = credentials.ok_or_else(|| credo_core::Error::plugin("vault login required"))?;
        if deps.get("role_id").is_none() || deps.get("secret_id").is_none() {
            return Err(credo_core::Error::plugin("vault login rejected"));
        }
        Ok([("username", "foo"), ("password", "bar")]
            .into_iter()
            .collect())
    }
}

/// Derives the dependency identity from the spec payload; used to wire
/// dependency chains and cycles in tests.
struct ChainPlugin;

#[async_trait]
impl CredentialPlugin for ChainPlugin {
    async fn consumer_identity(&self, config: &Raw) -> credo_core::Result<ConsumerIdentity> {
        let path = config
            .payload
            .get("path")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        Ok(identity(&[("type", "Rec"), ("path", path)]))
    }

    async fn resolve(
        &self,
        _config: &Raw,
        _identity: &ConsumerIdentity,
        credentials: Option<&Credentials>,
    ) -> credo_core::Result<Credentials> {
        Ok(credentials.cloned().unwrap_or_default())
    }
}

/// A repository answering every consumer with a fixed bundle.
#[derive(Clone, Default)]
struct CatchAllRepository {
    resolved: Arc<AtomicUsize>,
}

#[async_trait]
impl RepositoryPlugin for CatchAllRepository {
    async fn consumer_identity(&self, _config: &Raw) -> credo_core::Result<ConsumerIdentity> {
        Err(credo_core::Error::plugin("store needs no credentials"))
    }

    async fn resolve(
        &self,
        _config: &Raw,
        _identity: &ConsumerIdentity,
        _credentials: Option<&Credentials>,
    ) -> credo_core::Result<Credentials> {
        self.resolved.fetch_add(1, Ordering::SeqCst);
        Ok([("something", "value")].into_iter().collect())
    }
}

#[tokio::test]
async fn single_direct_credential() {
    let mut config = Config::new();
    config.consumers.push(consumer(
        &[("type", "OCIRegistry"), ("hostname", "docker.io")],
        vec![direct(&[("username", "foo"), ("password", "bar")])],
    ));

    let resolver = to_graph(&config, Options::new()).await.unwrap();
    let resolved = resolver
        .resolve(&identity(&[
            ("type", "OCIRegistry"),
            ("hostname", "docker.io"),
        ]))
        .await
        .unwrap();

    assert_eq!(resolved.get("username"), Some("foo"));
    assert_eq!(resolved.get("password"), Some("bar"));
}

#[tokio::test]
async fn direct_entries_merge_in_declaration_order() {
    let mut config = Config::new();
    config.consumers.push(consumer(
        &[("type", "OCIRegistry"), ("hostname", "docker.io")],
        vec![
            direct(&[("username", "foobar"), ("password", "stale")]),
            direct(&[("password", "foobar")]),
        ],
    ));

    let resolver = to_graph(&config, Options::new()).await.unwrap();
    let resolved = resolver
        .resolve(&identity(&[
            ("type", "OCIRegistry"),
            ("hostname", "docker.io"),
        ]))
        .await
        .unwrap();

    assert_eq!(resolved.get("username"), Some("foobar"));
    assert_eq!(resolved.get("password"), Some("foobar"));
}

#[tokio::test]
async fn repeated_resolution_is_deterministic() {
    let mut config = Config::new();
    config.consumers.push(consumer(
        &[("type", "OCIRegistry"), ("hostname", "docker.io")],
        vec![direct(&[("username", "foo")])],
    ));

    let resolver = to_graph(&config, Options::new()).await.unwrap();
    let id = identity(&[("type", "OCIRegistry"), ("hostname", "docker.io")]);
    let first = resolver.resolve(&id).await.unwrap();
    let second = resolver.resolve(&id).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn chained_credentials_resolve_through_vault() {
    let mut vault_spec = Raw::new("HashiCorpVault");
    vault_spec.payload.insert(
        "serverURL".into(),
        serde_json::Value::String("https://myvault.example.com/".into()),
    );

    let mut config = Config::new();
    config.consumers.push(consumer(
        &[("type", "OCIRegistry"), ("hostname", "quay.io")],
        vec![vault_spec],
    ));
    config.consumers.push(consumer(
        &[("type", "HashiCorpVault"), ("hostname", "myvault.example.com")],
        vec![direct(&[("role_id", "r"), ("secret_id", "s")])],
    ));

    let options = Options::new()
        .with_credential_plugins(StaticCredentialPlugins::default().with("HashiCorpVault", VaultPlugin));
    let resolver = to_graph(&config, options).await.unwrap();

    let resolved = resolver
        .resolve(&identity(&[("type", "OCIRegistry"), ("hostname", "quay.io")]))
        .await
        .unwrap();
    assert_eq!(resolved.get("username"), Some("foo"));
    assert_eq!(resolved.get("password"), Some("bar"));
}

#[tokio::test]
async fn wildcard_path_consumers_match_each_repository() {
    let mut config = Config::new();
    config.consumers.push(consumer(
        &[
            ("type", "OCIRegistry"),
            ("hostname", "ghcr.io"),
            ("path", "my-org/*"),
        ],
        vec![direct(&[("username", "u")])],
    ));

    let resolver = to_graph(&config, Options::new()).await.unwrap();
    for path in ["my-org/repo1", "my-org/repo2"] {
        let resolved = resolver
            .resolve(&identity(&[
                ("type", "OCIRegistry"),
                ("hostname", "ghcr.io"),
                ("path", path),
            ]))
            .await
            .unwrap();
        assert_eq!(resolved.get("username"), Some("u"));
    }

    let err = resolver
        .resolve(&identity(&[
            ("type", "OCIRegistry"),
            ("hostname", "ghcr.io"),
            ("path", "other-org/repo"),
        ]))
        .await
        .unwrap_err();
    assert!(err.is_no_direct_credentials());
}

#[tokio::test]
async fn exact_vertex_is_preferred_over_wildcard() {
    let mut config = Config::new();
    config.consumers.push(consumer(
        &[("type", "OCIRegistry"), ("path", "p/*")],
        vec![direct(&[("username", "wild")])],
    ));
    config.consumers.push(consumer(
        &[("type", "OCIRegistry"), ("path", "p/q")],
        vec![direct(&[("username", "exact")])],
    ));

    let resolver = to_graph(&config, Options::new()).await.unwrap();
    let resolved = resolver
        .resolve(&identity(&[("type", "OCIRegistry"), ("path", "p/q")]))
        .await
        .unwrap();
    assert_eq!(resolved.get("username"), Some("exact"));
}

#[tokio::test]
async fn missing_type_is_rejected() {
    let resolver = to_graph(&Config::new(), Options::new()).await.unwrap();
    let err = resolver
        .resolve(&identity(&[("hostname", "docker.io")]))
        .await
        .unwrap_err();
    assert!(err.is_missing_type());
}

#[tokio::test]
async fn cyclic_configuration_fails_construction() {
    let mut to_b = Raw::new("Rec");
    to_b.payload
        .insert("path".into(), serde_json::Value::String("b".into()));
    let mut to_a = Raw::new("Rec");
    to_a.payload
        .insert("path".into(), serde_json::Value::String("a".into()));

    let mut config = Config::new();
    config
        .consumers
        .push(consumer(&[("type", "Rec"), ("path", "a")], vec![to_b]));
    config
        .consumers
        .push(consumer(&[("type", "Rec"), ("path", "b")], vec![to_a]));

    let options = Options::new()
        .with_credential_plugins(StaticCredentialPlugins::default().with("Rec", ChainPlugin));
    let err = to_graph(&config, options).await.unwrap_err();
    assert!(err.is_would_create_cycle());
}

#[tokio::test]
async fn unknown_credential_type_fails_construction() {
    let mut config = Config::new();
    config.consumers.push(consumer(
        &[("type", "OCIRegistry"), ("hostname", "h")],
        vec![Raw::new("HashiCorpVault")],
    ));

    let err = to_graph(&config, Options::new()).await.unwrap_err();
    assert!(matches!(
        err,
        credo_graph::Error::NoCredentialPlugin(kind) if kind == "HashiCorpVault"
    ));
}

#[tokio::test]
async fn repository_fallback_serves_unmatched_consumers_and_caches() {
    let store = CatchAllRepository::default();

    let mut config = Config::new();
    config
        .repositories
        .push(RepositoryEntry::new(Raw::new("DockerConfig/v1")));

    let options = Options::new().with_repository_plugins(
        StaticRepositoryPlugins::default().with("*", store.clone()),
    );
    let resolver = to_graph(&config, options).await.unwrap();

    let id = identity(&[("type", "SomeCatchAllType"), ("hostname", "h")]);
    let resolved = resolver.resolve(&id).await.unwrap();
    assert_eq!(resolved.get("something"), Some("value"));

    // The second identical request is served from the vertex cache.
    let again = resolver.resolve(&id).await.unwrap();
    assert_eq!(again, resolved);
    assert_eq!(store.resolved.load(Ordering::SeqCst), 1);

    // A different consumer does not share the cache entry.
    let other = identity(&[("type", "SomeCatchAllType"), ("hostname", "other")]);
    resolver.resolve(&other).await.unwrap();
    assert_eq!(store.resolved.load(Ordering::SeqCst), 2);
}

/// Repository plugin whose dependency is itself only repository-resolvable;
/// resolution must fail instead of recursing indirectly.
struct NestedRepository;

#[async_trait]
impl RepositoryPlugin for NestedRepository {
    async fn consumer_identity(&self, _config: &Raw) -> credo_core::Result<ConsumerIdentity> {
        Ok(identity(&[("type", "SomeCatchAllType"), ("hostname", "inner")]))
    }

    async fn resolve(
        &self,
        _config: &Raw,
        _identity: &ConsumerIdentity,
        credentials: Option<&Credentials>,
    ) -> credo_core::Result<Credentials> {
        match credentials {
            Some(deps) => Ok(deps.clone()),
            None => Err(credo_core::Error::plugin("store is locked")),
        }
    }
}

#[tokio::test]
async fn indirect_resolution_never_recurses_indirectly() {
    let mut config = Config::new();
    config
        .repositories
        .push(RepositoryEntry::new(Raw::new("Nested/v1")));

    let options = Options::new().with_repository_plugins(
        StaticRepositoryPlugins::default().with("*", NestedRepository),
    );
    let resolver = to_graph(&config, options).await.unwrap();

    let err = resolver
        .resolve(&identity(&[("type", "SomeCatchAllType"), ("hostname", "outer")]))
        .await
        .unwrap_err();
    assert!(err.is_no_indirect_credentials());
}

/// Repository plugin that sleeps unless its spec marks it as the winner.
struct RacingRepository {
    completed: Arc<AtomicUsize>,
}

#[async_trait]
impl RepositoryPlugin for RacingRepository {
    async fn consumer_identity(&self, _config: &Raw) -> credo_core::Result<ConsumerIdentity> {
        Err(credo_core::Error::plugin("store needs no credentials"))
    }

    async fn resolve(
        &self,
        config: &Raw,
        _identity: &ConsumerIdentity,
        _credentials: Option<&Credentials>,
    ) -> credo_core::Result<Credentials> {
        if config.kind != "Winner" {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok([("winner", config.kind.as_str())].into_iter().collect())
    }
}

#[tokio::test]
async fn first_repository_success_cancels_the_rest() {
    let completed = Arc::new(AtomicUsize::new(0));

    let mut config = Config::new();
    for kind in ["Sleeper", "Winner", "Sleeper2"] {
        config.repositories.push(RepositoryEntry::new(Raw::new(kind)));
    }

    let options = Options::new().with_repository_plugins(
        StaticRepositoryPlugins::default().with(
            "*",
            RacingRepository {
                completed: completed.clone(),
            },
        ),
    );
    let resolver = to_graph(&config, options).await.unwrap();

    let started = Instant::now();
    let resolved = resolver
        .resolve(&identity(&[("type", "SomeCatchAllType"), ("hostname", "h")]))
        .await
        .unwrap();

    assert_eq!(resolved.get("winner"), Some("Winner"));
    assert!(started.elapsed() < Duration::from_secs(10));
    // The sleepers observed cancellation instead of completing.
    assert_eq!(completed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn direct_failure_without_repositories_is_surfaced() {
    let resolver = to_graph(&Config::new(), Options::new()).await.unwrap();
    let err = resolver
        .resolve(&identity(&[("type", "OCIRegistry"), ("hostname", "h")]))
        .await
        .unwrap_err();
    assert!(err.is_no_direct_credentials());
}
