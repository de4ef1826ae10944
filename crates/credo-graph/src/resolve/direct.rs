//! Direct resolution by graph traversal.

use futures::future::BoxFuture;

use credo_core::{ConsumerIdentity, Credentials};

use crate::error::{Error, Result};
use crate::resolver::Inner;

/// Tracing target for direct resolution.
const TRACING_TARGET: &str = "credo_graph::resolve";

/// Resolves a consumer by walking its dependency edges.
///
/// Dependencies are resolved depth-first in declaration order of the
/// original credential list, each feeding its credential plugin, and the
/// plugin outputs are merged over the vertex's direct credentials (later
/// outputs win on key conflicts). The merged bundle is cached on the vertex.
/// Plugin failures at any depth abort the whole resolution; partial merges
/// are never surfaced.
pub(crate) fn resolve(
    inner: &Inner,
    identity: ConsumerIdentity,
) -> BoxFuture<'_, Result<Credentials>> {
    Box::pin(async move {
        let matched = inner.dag.match_any(&identity)?;
        if let Some(cached) = matched.resolved {
            tracing::trace!(target: TRACING_TARGET, consumer = %matched.id, "cache hit");
            return Ok(cached);
        }

        let mut merged = matched.direct.unwrap_or_default();
        for binding in &matched.bindings {
            let dependency = inner.dag.identity_of(&binding.target)?;
            let dependency_credentials = resolve(inner, dependency.clone()).await?;

            let tag = binding.spec.tag().map_err(Error::Core)?;
            let provider = inner
                .options
                .credential_plugins
                .as_ref()
                .ok_or_else(|| Error::NoCredentialPlugin(tag.to_string()))?;
            let plugin = provider
                .credential_plugin(&tag)
                .await?
                .ok_or_else(|| Error::NoCredentialPlugin(tag.to_string()))?;

            let output = plugin
                .resolve(&binding.spec, &dependency, Some(&dependency_credentials))
                .await?;
            merged.merge(&output);
        }

        if merged.is_empty() {
            return Err(Error::NoDirectCredentials {
                identity: matched.id,
            });
        }

        inner.dag.set_credentials(&matched.id, merged.clone())?;
        tracing::debug!(
            target: TRACING_TARGET,
            consumer = %matched.id,
            keys = merged.len(),
            "resolved directly"
        );
        Ok(merged)
    })
}
