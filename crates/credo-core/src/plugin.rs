//! Plugin seam traits.
//!
//! The resolution graph never talks to plugin processes directly. It sees
//! credential and repository plugins through the traits below, and obtains
//! them through provider traits carried in the graph's options. The plugin
//! subsystem implements the providers for external subprocesses; tests and
//! built-in plugins implement them in-process.

use std::sync::Arc;

use async_trait::async_trait;

use crate::credentials::Credentials;
use crate::error::Result;
use crate::identity::ConsumerIdentity;
use crate::typed::{Raw, TypeTag};

/// Resolves custom credential specs into credential bundles.
#[async_trait]
pub trait CredentialPlugin: Send + Sync {
    /// Reports the consumer identity the given credential spec depends on.
    async fn consumer_identity(&self, config: &Raw) -> Result<ConsumerIdentity>;

    /// Resolves a credential spec into a bundle.
    ///
    /// `credentials` carries the already-resolved bundle for the dependency
    /// identity reported by [`Self::consumer_identity`].
    async fn resolve(
        &self,
        config: &Raw,
        identity: &ConsumerIdentity,
        credentials: Option<&Credentials>,
    ) -> Result<Credentials>;
}

/// Acts as a fallback credential store for otherwise-unmatched consumers.
#[async_trait]
pub trait RepositoryPlugin: Send + Sync {
    /// Reports the consumer identity the repository itself needs credentials
    /// for, e.g. the vault holding the store.
    async fn consumer_identity(&self, config: &Raw) -> Result<ConsumerIdentity>;

    /// Resolves credentials for `identity` out of the repository, or fails
    /// when the repository does not know the consumer.
    async fn resolve(
        &self,
        config: &Raw,
        identity: &ConsumerIdentity,
        credentials: Option<&Credentials>,
    ) -> Result<Credentials>;
}

/// Shared handle to a credential plugin.
pub type SharedCredentialPlugin = Arc<dyn CredentialPlugin>;

/// Shared handle to a repository plugin.
pub type SharedRepositoryPlugin = Arc<dyn RepositoryPlugin>;

/// Supplies credential plugins by credential-spec type.
#[async_trait]
pub trait CredentialPluginProvider: Send + Sync {
    /// Returns the plugin handling a credential-spec type, or `None` when no
    /// plugin is registered for it.
    async fn credential_plugin(&self, spec_type: &TypeTag)
    -> Result<Option<SharedCredentialPlugin>>;
}

/// Supplies repository plugins by consumer-identity type.
///
/// The wildcard type `*` designates generic providers that accept any
/// consumer type.
#[async_trait]
pub trait RepositoryPluginProvider: Send + Sync {
    /// Returns the plugin handling a consumer-identity type, or `None` when
    /// no plugin is registered for it.
    async fn repository_plugin(
        &self,
        consumer_type: &TypeTag,
    ) -> Result<Option<SharedRepositoryPlugin>>;
}

// Shared handles forward to their provider, so one registry can back both
// provider slots of a resolver.

#[async_trait]
impl<P> CredentialPluginProvider for Arc<P>
where
    P: CredentialPluginProvider + ?Sized,
{
    async fn credential_plugin(
        &self,
        spec_type: &TypeTag,
    ) -> Result<Option<SharedCredentialPlugin>> {
        (**self).credential_plugin(spec_type).await
    }
}

#[async_trait]
impl<P> RepositoryPluginProvider for Arc<P>
where
    P: RepositoryPluginProvider + ?Sized,
{
    async fn repository_plugin(
        &self,
        consumer_type: &TypeTag,
    ) -> Result<Option<SharedRepositoryPlugin>> {
        (**self).repository_plugin(consumer_type).await
    }
}
