//! Converters between the external wire contract and the internal seams.
//!
//! The graph consumes plugins through the seam traits in `credo-core`;
//! [`ExternalPlugin`] adapts a running plugin process to both of them. The
//! converters are stateless beyond the shared process handle; request
//! cancellation drops the in-flight call only and never touches the
//! process.

use std::sync::Arc;

use async_trait::async_trait;

use credo_core::plugin::{CredentialPlugin, RepositoryPlugin};
use credo_core::{ConsumerIdentity, Credentials, Raw};

use crate::client::PluginClient;
use crate::process::{PluginProcess, PluginState};

/// Adapter presenting a plugin process as an in-process plugin.
#[derive(Debug, Clone)]
pub struct ExternalPlugin {
    process: Arc<PluginProcess>,
    client: PluginClient,
}

impl ExternalPlugin {
    pub(crate) fn new(process: Arc<PluginProcess>, client: PluginClient) -> Self {
        Self { process, client }
    }

    /// Returns the backing process handle.
    pub fn process(&self) -> &Arc<PluginProcess> {
        &self.process
    }

    async fn dispatch<T>(
        &self,
        call: impl Future<Output = crate::error::Result<T>>,
    ) -> credo_core::Result<T> {
        self.process.set_state(PluginState::Busy);
        let result = call.await;
        self.process.set_state(PluginState::Idle);
        result.map_err(credo_core::Error::plugin)
    }
}

#[async_trait]
impl CredentialPlugin for ExternalPlugin {
    async fn consumer_identity(&self, config: &Raw) -> credo_core::Result<ConsumerIdentity> {
        self.dispatch(self.client.consumer_identity(config)).await
    }

    async fn resolve(
        &self,
        config: &Raw,
        identity: &ConsumerIdentity,
        credentials: Option<&Credentials>,
    ) -> credo_core::Result<Credentials> {
        self.dispatch(self.client.resolve(config, identity, credentials))
            .await
    }
}

#[async_trait]
impl RepositoryPlugin for ExternalPlugin {
    async fn consumer_identity(&self, config: &Raw) -> credo_core::Result<ConsumerIdentity> {
        self.dispatch(self.client.consumer_identity(config)).await
    }

    async fn resolve(
        &self,
        config: &Raw,
        identity: &ConsumerIdentity,
        credentials: Option<&Credentials>,
    ) -> credo_core::Result<Credentials> {
        self.dispatch(self.client.resolve(config, identity, credentials))
            .await
    }
}
