//! The synchronised credential graph.
//!
//! Vertices are keyed by the canonical identity string. Wildcard-equivalent
//! identities are linked with auxiliary `cyclic-only` edges at insertion
//! time, so that cycle detection stays conservative for resolutions that
//! later go through glob-pattern consumers; those edges are never traversed
//! during resolution.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use petgraph::algo::has_path_connecting;
use petgraph::graph::{DiGraph, NodeIndex};
use strum::IntoStaticStr;

use credo_core::{ConsumerIdentity, Credentials, Raw};

use crate::error::{Error, Result};

/// Tracing target for graph mutations.
const TRACING_TARGET: &str = "credo_graph::dag";

/// Classification of a graph edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum EdgeTag {
    /// Traversed during direct resolution.
    ResolutionRelevant,
    /// Exists solely to keep cycle detection conservative for
    /// wildcard-equivalent identities.
    CyclicOnly,
}

/// A dependency induced by a non-direct credential spec.
#[derive(Debug, Clone)]
pub(crate) struct Binding {
    /// The credential spec that induced the edge.
    pub spec: Raw,
    /// Canonical identity string of the dependency vertex.
    pub target: String,
}

/// A graph vertex: one consumer identity plus its credential state.
#[derive(Debug)]
struct Vertex {
    /// Canonical identity string, the graph key.
    id: String,
    identity: ConsumerIdentity,
    /// Credentials contributed directly by the configuration.
    direct: Option<Credentials>,
    /// Cached resolution result.
    resolved: Option<Credentials>,
    /// Outgoing dependencies in declaration order of the credential list.
    bindings: Vec<Binding>,
}

/// Point-in-time copy of a vertex, taken under the read lock.
#[derive(Debug, Clone)]
pub(crate) struct VertexSnapshot {
    pub id: String,
    pub identity: ConsumerIdentity,
    pub direct: Option<Credentials>,
    pub resolved: Option<Credentials>,
    pub bindings: Vec<Binding>,
}

#[derive(Default)]
struct DagInner {
    graph: DiGraph<Vertex, EdgeTag>,
    index: HashMap<String, NodeIndex>,
}

/// Thread-safe directed acyclic graph of credential consumers.
///
/// Vertices and edges are only added during construction; afterwards the
/// sole mutation is per-vertex credential caching. A single reader/writer
/// lock guards the vertex table; the repository-configuration list sits
/// behind its own lock. No suspension point ever occurs while either lock
/// is held.
#[derive(Default)]
pub struct CredentialDag {
    inner: RwLock<DagInner>,
    repositories: RwLock<Vec<Raw>>,
}

fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl CredentialDag {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of vertices.
    pub fn vertex_count(&self) -> usize {
        read_lock(&self.inner).graph.node_count()
    }

    /// Returns the number of edges, auxiliary ones included.
    pub fn edge_count(&self) -> usize {
        read_lock(&self.inner).graph.edge_count()
    }

    /// Adds a vertex for an identity; idempotent for known identities.
    ///
    /// Every existing vertex that is wildcard-equivalent to the new one is
    /// linked with a `cyclic-only` edge, in both applicable directions.
    /// Fails with [`Error::WouldCreateCycle`] when any implied edge would
    /// close a directed cycle.
    pub fn add_identity(&self, identity: ConsumerIdentity) -> Result<()> {
        let key = identity.to_string();
        let mut inner = write_lock(&self.inner);
        if inner.index.contains_key(&key) {
            return Ok(());
        }

        let new_index = inner.graph.add_node(Vertex {
            id: key.clone(),
            identity,
            direct: None,
            resolved: None,
            bindings: Vec::new(),
        });
        inner.index.insert(key.clone(), new_index);

        // Wildcard closure: link every equivalent existing vertex so that
        // future resolutions through glob-pattern consumers stay cycle-safe.
        let mut implied = Vec::new();
        let new_identity = &inner.graph[new_index].identity;
        for index in inner.graph.node_indices() {
            if index == new_index {
                continue;
            }
            let existing = &inner.graph[index];
            if new_identity.matches(&existing.identity) {
                implied.push((index, new_index));
            }
            if existing.identity.matches(new_identity) {
                implied.push((new_index, index));
            }
        }
        for (from, to) in implied {
            add_edge_at(&mut inner.graph, from, to, EdgeTag::CyclicOnly)?;
        }

        tracing::debug!(target: TRACING_TARGET, id = %key, "added vertex");
        Ok(())
    }

    /// Adds a directed edge between two known vertices.
    ///
    /// Fails with [`Error::SelfReference`] when both endpoints are the same
    /// vertex and with [`Error::WouldCreateCycle`] when the edge would close
    /// a directed cycle. Re-adding an existing edge merges the tag; a spec,
    /// when given, is appended to the source vertex's dependency list in
    /// declaration order.
    pub fn add_edge(&self, from: &str, to: &str, tag: EdgeTag, spec: Option<Raw>) -> Result<()> {
        let mut inner = write_lock(&self.inner);
        let from_index = *inner
            .index
            .get(from)
            .ok_or_else(|| Error::VertexNotFound(from.to_string()))?;
        let to_index = *inner
            .index
            .get(to)
            .ok_or_else(|| Error::VertexNotFound(to.to_string()))?;

        add_edge_at(&mut inner.graph, from_index, to_index, tag)?;

        if let Some(spec) = spec {
            inner.graph[from_index].bindings.push(Binding {
                spec,
                target: to.to_string(),
            });
        }

        tracing::debug!(
            target: TRACING_TARGET,
            from = %from,
            to = %to,
            tag = <&'static str>::from(tag),
            "added edge"
        );
        Ok(())
    }

    /// Merges direct credentials into a vertex; `credentials` wins on key
    /// conflicts with earlier contributions.
    pub fn merge_direct(&self, key: &str, credentials: &Credentials) -> Result<()> {
        let mut inner = write_lock(&self.inner);
        let index = *inner
            .index
            .get(key)
            .ok_or_else(|| Error::VertexNotFound(key.to_string()))?;
        inner.graph[index]
            .direct
            .get_or_insert_with(Credentials::new)
            .merge(credentials);
        Ok(())
    }

    /// Returns the cached resolution result of a vertex, if any.
    pub fn get_credentials(&self, key: &str) -> Option<Credentials> {
        let inner = read_lock(&self.inner);
        let index = inner.index.get(key)?;
        inner.graph[*index].resolved.clone()
    }

    /// Stores a resolution result on a vertex.
    pub fn set_credentials(&self, key: &str, credentials: Credentials) -> Result<()> {
        let mut inner = write_lock(&self.inner);
        let index = *inner
            .index
            .get(key)
            .ok_or_else(|| Error::VertexNotFound(key.to_string()))?;
        inner.graph[index].resolved = Some(credentials);
        Ok(())
    }

    /// Stores an indirect resolution result under the consumer's canonical
    /// string, creating a synthetic vertex when none exists.
    pub fn cache_by_key(
        &self,
        key: &str,
        identity: &ConsumerIdentity,
        credentials: Credentials,
    ) -> Result<()> {
        let known = read_lock(&self.inner).index.contains_key(key);
        if !known {
            self.add_identity(identity.clone())?;
        }
        self.set_credentials(key, credentials)
    }

    /// Returns the stored identity of a vertex.
    pub fn identity_of(&self, key: &str) -> Result<ConsumerIdentity> {
        let inner = read_lock(&self.inner);
        let index = inner
            .index
            .get(key)
            .ok_or_else(|| Error::VertexNotFound(key.to_string()))?;
        Ok(inner.graph[*index].identity.clone())
    }

    /// Finds the vertex for a consumer identity.
    ///
    /// An exact canonical-string match always wins; otherwise vertices are
    /// scanned in insertion order and the first whose stored identity
    /// pattern matches the consumer is returned. Fails with
    /// [`Error::NoDirectCredentials`] when nothing matches.
    pub(crate) fn match_any(&self, identity: &ConsumerIdentity) -> Result<VertexSnapshot> {
        let key = identity.to_string();
        let inner = read_lock(&self.inner);
        if let Some(index) = inner.index.get(&key) {
            return Ok(snapshot(&inner.graph[*index]));
        }
        for index in inner.graph.node_indices() {
            let vertex = &inner.graph[index];
            if vertex.identity.matches(identity) {
                return Ok(snapshot(vertex));
            }
        }
        Err(Error::NoDirectCredentials { identity: key })
    }

    /// Appends a repository configuration; order is preserved.
    pub fn push_repository(&self, spec: Raw) {
        write_lock(&self.repositories).push(spec);
    }

    /// Returns a copy of the repository configurations in declaration order.
    pub fn repositories(&self) -> Vec<Raw> {
        read_lock(&self.repositories).clone()
    }

    /// Returns whether any repository configuration is present.
    pub fn has_repositories(&self) -> bool {
        !read_lock(&self.repositories).is_empty()
    }
}

impl std::fmt::Debug for CredentialDag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialDag")
            .field("vertices", &self.vertex_count())
            .field("edges", &self.edge_count())
            .field("repositories", &read_lock(&self.repositories).len())
            .finish()
    }
}

fn snapshot(vertex: &Vertex) -> VertexSnapshot {
    VertexSnapshot {
        id: vertex.id.clone(),
        identity: vertex.identity.clone(),
        direct: vertex.direct.clone(),
        resolved: vertex.resolved.clone(),
        bindings: vertex.bindings.clone(),
    }
}

/// Inserts an edge after deterministic cycle detection on the existing
/// edge set. Duplicate edges are merged, upgrading `cyclic-only` to
/// `resolution-relevant` when re-added with the stronger tag.
fn add_edge_at(
    graph: &mut DiGraph<Vertex, EdgeTag>,
    from: NodeIndex,
    to: NodeIndex,
    tag: EdgeTag,
) -> Result<()> {
    if from == to {
        return Err(Error::SelfReference(graph[from].id.clone()));
    }
    if let Some(existing) = graph.find_edge(from, to) {
        if tag == EdgeTag::ResolutionRelevant {
            graph[existing] = EdgeTag::ResolutionRelevant;
        }
        return Ok(());
    }
    if has_path_connecting(&*graph, to, from, None) {
        return Err(Error::WouldCreateCycle {
            from: graph[from].id.clone(),
            to: graph[to].id.clone(),
        });
    }
    graph.add_edge(from, to, tag);
    Ok(())
}
