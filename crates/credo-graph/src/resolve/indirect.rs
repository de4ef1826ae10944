//! Indirect resolution through repository fallbacks.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use credo_core::identity::ANY_CONSUMER_TYPE;
use credo_core::{ConsumerIdentity, Credentials, TypeTag};

use crate::error::{Error, Result};
use crate::resolve::direct;
use crate::resolver::Inner;

/// Tracing target for repository fallback.
const TRACING_TARGET: &str = "credo_graph::resolve";

/// Resolves a consumer by fanning out over the configured repositories.
///
/// One task is spawned per repository entry; the first task to return a
/// credential bundle wins and cancels the rest through a shared token.
/// Credentials a repository needs for itself must be directly resolvable;
/// a missing direct bundle is swallowed rather than recursing indirectly.
/// The winning bundle is cached under the canonical string of the original
/// consumer identity, on a synthetic vertex when none matches.
pub(crate) async fn resolve(inner: Arc<Inner>, identity: &ConsumerIdentity) -> Result<Credentials> {
    let key = identity.to_string();
    if let Some(cached) = inner.dag.get_credentials(&key) {
        tracing::trace!(target: TRACING_TARGET, consumer = %key, "indirect cache hit");
        return Ok(cached);
    }

    let consumer_type = identity.parse_type()?;
    let provider = match &inner.options.repository_plugins {
        Some(provider) => provider.clone(),
        None => {
            return Err(Error::NoIndirectCredentials {
                identity: key,
                causes: Vec::new(),
            });
        }
    };

    // Generic providers such as a Docker-config store register under the
    // any-consumer type and serve every consumer type asked for.
    let plugin = match provider.repository_plugin(&consumer_type).await? {
        Some(plugin) => plugin,
        None => {
            let any = TypeTag::parse(ANY_CONSUMER_TYPE)?;
            match provider.repository_plugin(&any).await? {
                Some(plugin) => plugin,
                None => {
                    return Err(Error::NoIndirectCredentials {
                        identity: key,
                        causes: Vec::new(),
                    });
                }
            }
        }
    };

    let repositories = inner.dag.repositories();
    let token = CancellationToken::new();
    let mut tasks: JoinSet<Result<Option<Credentials>>> = JoinSet::new();
    for spec in repositories {
        let inner = inner.clone();
        let plugin = plugin.clone();
        let token = token.clone();
        let identity = identity.clone();
        tasks.spawn(async move {
            // A failing consumer-identity call means the repository needs no
            // graph-resolved credentials of its own.
            let dependencies = match plugin.consumer_identity(&spec).await {
                Ok(dependency) if !dependency.is_empty() => {
                    match direct::resolve(&inner, dependency).await {
                        Ok(credentials) => Some(credentials),
                        Err(err) if err.is_no_direct_credentials() => None,
                        Err(err) => return Err(err),
                    }
                }
                _ => None,
            };

            tokio::select! {
                _ = token.cancelled() => Ok(None),
                resolved = plugin.resolve(&spec, &identity, dependencies.as_ref()) => {
                    resolved.map(Some).map_err(Error::Core)
                }
            }
        });
    }

    let mut winner: Option<Credentials> = None;
    let mut causes = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(Some(credentials))) => {
                if winner.is_none() {
                    winner = Some(credentials);
                    token.cancel();
                }
            }
            Ok(Ok(None)) => {}
            Ok(Err(err)) => causes.push(err),
            Err(join_err) => causes.push(Error::Core(credo_core::Error::plugin(join_err))),
        }
    }

    match winner {
        Some(credentials) => {
            inner.dag.cache_by_key(&key, identity, credentials.clone())?;
            tracing::debug!(
                target: TRACING_TARGET,
                consumer = %key,
                keys = credentials.len(),
                "resolved through repository fallback"
            );
            Ok(credentials)
        }
        None => Err(Error::NoIndirectCredentials {
            identity: key,
            causes,
        }),
    }
}
