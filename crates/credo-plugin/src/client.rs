//! Typed HTTP dispatch to a plugin endpoint.

use std::sync::Arc;
use std::time::Instant;

use http::header::{AUTHORIZATION, CONTENT_TYPE, HOST};
use http::{Method, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use serde::de::DeserializeOwned;

use credo_core::{ConsumerIdentity, Credentials, Raw};

use crate::error::{Error, Result};
use crate::health::HealthReport;
use crate::transport::{self, Endpoint};
use crate::wire::{
    CONSUMER_IDENTITY_PATH, ConsumerIdentityForConfigRequest, ErrorEnvelope, HEALTHZ_PATH,
    RESOLVE_PATH, ResolveRequest,
};

/// Tracing target for plugin dispatch.
const TRACING_TARGET: &str = "credo_plugin::client";

/// Client for one plugin endpoint.
///
/// Every RPC is an HTTP request over the negotiated transport. When a
/// config schema is attached, `config` payloads are validated client-side
/// before the call leaves the host; validation failures surface as dispatch
/// errors without touching the transport.
#[derive(Clone)]
pub struct PluginClient {
    id: String,
    endpoint: Endpoint,
    validator: Option<Arc<jsonschema::Validator>>,
}

impl PluginClient {
    /// Creates a client without schema validation.
    pub fn new(id: impl Into<String>, endpoint: Endpoint) -> Self {
        Self {
            id: id.into(),
            endpoint,
            validator: None,
        }
    }

    /// Attaches the config schema advertised at discovery.
    pub fn with_schema(mut self, schema: &serde_json::Value) -> Result<Self> {
        let validator = jsonschema::validator_for(schema)
            .map_err(|err| Error::dispatch(&self.id, format!("invalid config schema: {err}")))?;
        self.validator = Some(Arc::new(validator));
        Ok(self)
    }

    /// Returns the plugin id this client dispatches to.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Probes the health endpoint.
    pub async fn healthz(&self) -> HealthReport {
        let started = Instant::now();
        match self.request(Method::GET, HEALTHZ_PATH, Vec::new(), None).await {
            Ok(_) => HealthReport::healthy(started.elapsed()),
            Err(err) => HealthReport::unhealthy(err.to_string()),
        }
    }

    /// Asks the plugin for the consumer identity implied by a config.
    pub async fn consumer_identity(&self, config: &Raw) -> Result<ConsumerIdentity> {
        self.validate(config)?;
        let body = serde_json::to_vec(&ConsumerIdentityForConfigRequest {
            config: config.clone(),
        })?;
        let bytes = self
            .request(Method::POST, CONSUMER_IDENTITY_PATH, body, None)
            .await?;
        self.decode(&bytes)
    }

    /// Asks the plugin to resolve a consumer identity against a config.
    ///
    /// The credential bundle travels in the `Authorization` header as a
    /// JSON map, keeping it out of the request body.
    pub async fn resolve(
        &self,
        config: &Raw,
        identity: &ConsumerIdentity,
        credentials: Option<&Credentials>,
    ) -> Result<Credentials> {
        self.validate(config)?;
        let body = serde_json::to_vec(&ResolveRequest {
            config: config.clone(),
            identity: identity.clone(),
        })?;
        let authorization = credentials.map(serde_json::to_string).transpose()?;
        let bytes = self
            .request(Method::POST, RESOLVE_PATH, body, authorization)
            .await?;
        self.decode(&bytes)
    }

    fn validate(&self, config: &Raw) -> Result<()> {
        let Some(validator) = &self.validator else {
            return Ok(());
        };
        let value = serde_json::to_value(config)?;
        if let Err(error) = validator.validate(&value) {
            return Err(Error::dispatch(
                &self.id,
                format!("config failed schema validation: {error}"),
            ));
        }
        Ok(())
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes)
            .map_err(|err| Error::dispatch(&self.id, format!("malformed response: {err}")))
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Vec<u8>,
        authorization: Option<String>,
    ) -> Result<Bytes> {
        let mut sender = transport::connect(&self.endpoint)
            .await
            .map_err(|err| Error::dispatch(&self.id, &err))?;

        let mut builder = Request::builder()
            .method(method.clone())
            .uri(path)
            .header(HOST, "localhost")
            .header(CONTENT_TYPE, "application/json");
        if let Some(authorization) = authorization {
            builder = builder.header(AUTHORIZATION, authorization);
        }
        let request = builder
            .body(Full::new(Bytes::from(body)))
            .map_err(|err| Error::dispatch(&self.id, &err))?;

        tracing::trace!(
            target: TRACING_TARGET,
            id = %self.id,
            %method,
            path,
            "dispatching"
        );
        let response = sender
            .send_request(request)
            .await
            .map_err(|err| Error::dispatch(&self.id, &err))?;
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .map_err(|err| Error::dispatch(&self.id, &err))?
            .to_bytes();

        if status != StatusCode::OK {
            let message = serde_json::from_slice::<ErrorEnvelope>(&bytes)
                .map(|envelope| envelope.error)
                .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).into_owned());
            return Err(Error::dispatch(
                &self.id,
                format!("{path} answered {status}: {message}"),
            ));
        }
        Ok(bytes)
    }
}

impl std::fmt::Debug for PluginClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginClient")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .field("validated", &self.validator.is_some())
            .finish()
    }
}
