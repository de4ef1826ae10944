//! Configuration ingestion.
//!
//! Builds the credential graph from a [`Config`] in three phases:
//!
//! 1. **Direct credentials**: merge every consumer's direct entries onto its
//!    identity vertices.
//! 2. **Plugin edges**: ask the credential plugin of each remaining spec for
//!    its dependency identity and connect the vertices.
//! 3. **Repositories**: convert and append the fallback repository specs.
//!
//! Ingestion is not transactional; the public constructor discards the graph
//! on any error.

use credo_core::{Config, ConsumerIdentity, Credentials, DirectCredentials, Raw};

use crate::dag::{CredentialDag, EdgeTag};
use crate::error::{Error, Result};
use crate::resolver::Options;

/// Tracing target for ingestion.
const TRACING_TARGET: &str = "credo_graph::ingest";

/// A consumer entry that still carries non-direct credential specs after
/// phase one.
struct ResidualConsumer<'a> {
    identities: Vec<&'a ConsumerIdentity>,
    specs: Vec<&'a Raw>,
}

pub(crate) async fn ingest(dag: &CredentialDag, config: &Config, options: &Options) -> Result<()> {
    let residual = ingest_direct(dag, config)?;
    ingest_plugin_edges(dag, &residual, options).await?;
    ingest_repositories(dag, config, options)?;

    tracing::debug!(
        target: TRACING_TARGET,
        vertices = dag.vertex_count(),
        edges = dag.edge_count(),
        "configuration ingested"
    );
    Ok(())
}

/// Phase one: vertex creation and direct-credential merging.
///
/// Consumer entries whose credentials are all direct are dropped from the
/// result; the remaining entries feed phase two.
fn ingest_direct<'a>(dag: &CredentialDag, config: &'a Config) -> Result<Vec<ResidualConsumer<'a>>> {
    let mut residual = Vec::new();
    for consumer in &config.consumers {
        let mut direct = Credentials::new();
        let mut specs = Vec::new();
        for credential in &consumer.credentials {
            if DirectCredentials::is_direct(credential) {
                let decoded: DirectCredentials = credential.decode_payload().map_err(Error::Core)?;
                direct.merge(&decoded.properties);
            } else {
                specs.push(credential);
            }
        }

        let identities: Vec<_> = consumer.effective_identities().collect();
        for identity in &identities {
            dag.add_identity((*identity).clone())?;
            if !direct.is_empty() {
                dag.merge_direct(&identity.to_string(), &direct)?;
            }
        }

        if !specs.is_empty() {
            residual.push(ResidualConsumer { identities, specs });
        }
    }
    Ok(residual)
}

/// Phase two: one resolution edge per remaining credential spec.
async fn ingest_plugin_edges(
    dag: &CredentialDag,
    residual: &[ResidualConsumer<'_>],
    options: &Options,
) -> Result<()> {
    for consumer in residual {
        for identity in &consumer.identities {
            let from = identity.to_string();
            for spec in &consumer.specs {
                let tag = spec.tag().map_err(Error::Core)?;
                let provider = options
                    .credential_plugins
                    .as_ref()
                    .ok_or_else(|| Error::NoCredentialPlugin(tag.to_string()))?;
                let plugin = provider
                    .credential_plugin(&tag)
                    .await?
                    .ok_or_else(|| Error::NoCredentialPlugin(tag.to_string()))?;

                let dependency = plugin.consumer_identity(spec).await?;
                dag.add_identity(dependency.clone())?;
                dag.add_edge(
                    &from,
                    &dependency.to_string(),
                    EdgeTag::ResolutionRelevant,
                    Some((*spec).clone()),
                )?;
            }
        }
    }
    Ok(())
}

/// Phase three: repository configurations, order-preserving.
fn ingest_repositories(dag: &CredentialDag, config: &Config, options: &Options) -> Result<()> {
    for entry in &config.repositories {
        let spec = match &options.repository_scheme {
            Some(scheme) => scheme.convert(&entry.repository)?,
            None => entry.repository.clone(),
        };
        dag.push_repository(spec);
    }
    Ok(())
}
