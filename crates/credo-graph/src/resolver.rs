//! The public resolution API.

use std::sync::Arc;

use credo_core::plugin::{CredentialPluginProvider, RepositoryPluginProvider};
use credo_core::{Config, ConsumerIdentity, Credentials, Scheme};

use crate::dag::CredentialDag;
use crate::error::Result;
use crate::ingest;
use crate::resolve::{direct, indirect};

/// Tracing target for the resolver façade.
const TRACING_TARGET: &str = "credo_graph::resolver";

/// Collaborators for graph construction and resolution.
#[derive(Clone, Default)]
pub struct Options {
    /// Supplies credential plugins by credential-spec type.
    pub credential_plugins: Option<Arc<dyn CredentialPluginProvider>>,
    /// Supplies repository plugins by consumer-identity type; enables the
    /// indirect fallback.
    pub repository_plugins: Option<Arc<dyn RepositoryPluginProvider>>,
    /// Scheme used to convert repository entries during ingestion.
    pub repository_scheme: Option<Arc<Scheme>>,
}

impl Options {
    /// Creates empty options: direct resolution only, no plugins.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the credential-plugin provider.
    pub fn with_credential_plugins(
        mut self,
        provider: impl CredentialPluginProvider + 'static,
    ) -> Self {
        self.credential_plugins = Some(Arc::new(provider));
        self
    }

    /// Sets the repository-plugin provider.
    pub fn with_repository_plugins(
        mut self,
        provider: impl RepositoryPluginProvider + 'static,
    ) -> Self {
        self.repository_plugins = Some(Arc::new(provider));
        self
    }

    /// Sets the scheme used for repository entries.
    pub fn with_repository_scheme(mut self, scheme: Scheme) -> Self {
        self.repository_scheme = Some(Arc::new(scheme));
        self
    }
}

pub(crate) struct Inner {
    pub(crate) dag: CredentialDag,
    pub(crate) options: Options,
}

/// Constructs a resolver by ingesting a configuration document.
///
/// The graph is discarded on any ingestion error; partial graphs are never
/// observable through [`GraphResolver::resolve`].
pub async fn to_graph(config: &Config, options: Options) -> Result<GraphResolver> {
    let inner = Inner {
        dag: CredentialDag::new(),
        options,
    };
    ingest::ingest(&inner.dag, config, &inner.options).await?;

    tracing::info!(
        target: TRACING_TARGET,
        vertices = inner.dag.vertex_count(),
        edges = inner.dag.edge_count(),
        "credential graph constructed"
    );
    Ok(GraphResolver {
        inner: Arc::new(inner),
    })
}

/// Resolves consumer identities to credential bundles.
pub struct GraphResolver {
    inner: Arc<Inner>,
}

impl GraphResolver {
    /// Resolves the credentials for a consumer identity.
    ///
    /// Resolution first walks the graph; when no direct credentials exist
    /// and a repository provider is configured, it falls back to the
    /// concurrent repository fan-out. The identity must carry a non-empty
    /// `type` attribute.
    pub async fn resolve(&self, identity: &ConsumerIdentity) -> Result<Credentials> {
        identity.parse_type()?;

        match direct::resolve(&self.inner, identity.clone()).await {
            Err(err)
                if err.is_no_direct_credentials()
                    && self.inner.options.repository_plugins.is_some() =>
            {
                tracing::debug!(
                    target: TRACING_TARGET,
                    consumer = %identity,
                    "no direct credentials, trying repository fallback"
                );
                indirect::resolve(self.inner.clone(), identity).await
            }
            other => other,
        }
    }

    /// Returns the underlying graph.
    pub fn dag(&self) -> &CredentialDag {
        &self.inner.dag
    }
}

impl std::fmt::Debug for GraphResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphResolver")
            .field("dag", &self.inner.dag)
            .finish()
    }
}
