//! Transport negotiation and connection setup.
//!
//! Plugins serve HTTP over a Unix domain socket when the platform allows
//! binding one, and over an ephemeral loopback TCP port otherwise. The
//! choice is probed once per registry, before any plugin starts, and
//! recorded in each plugin's startup config.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::client::conn::http1::SendRequest;
use hyper_util::rt::TokioIo;
use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UnixListener, UnixStream};

/// Tracing target for transport operations.
const TRACING_TARGET: &str = "credo_plugin::transport";

/// The negotiated transport family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, IntoStaticStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TransportKind {
    /// Unix domain socket in a temporary directory.
    Unix,
    /// Loopback TCP on an ephemeral port.
    Tcp,
}

/// A plugin's announced listening endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Socket path announced as `unix://<path>`.
    Unix(PathBuf),
    /// Socket address announced as `tcp://<addr>`.
    Tcp(SocketAddr),
}

impl Endpoint {
    /// Returns the transport family of this endpoint.
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Unix(_) => TransportKind::Unix,
            Self::Tcp(_) => TransportKind::Tcp,
        }
    }

    /// Parses a startup announcement line.
    pub fn parse(announcement: &str) -> Option<Self> {
        let announcement = announcement.trim();
        if let Some(path) = announcement.strip_prefix("unix://") {
            if path.is_empty() {
                return None;
            }
            return Some(Self::Unix(PathBuf::from(path)));
        }
        if let Some(addr) = announcement.strip_prefix("tcp://") {
            return addr.parse().ok().map(Self::Tcp);
        }
        None
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
            Self::Tcp(addr) => write!(f, "tcp://{addr}"),
        }
    }
}

/// Probes whether a Unix domain socket can be bound, preferring it for
/// latency and filesystem-permission confinement; falls back to TCP.
pub async fn negotiate() -> TransportKind {
    let probe_dir = match tempfile::tempdir() {
        Ok(dir) => dir,
        Err(err) => {
            tracing::debug!(
                target: TRACING_TARGET,
                error = %err,
                "temporary directory unavailable, selecting tcp"
            );
            return TransportKind::Tcp;
        }
    };
    match UnixListener::bind(probe_dir.path().join("probe.sock")) {
        Ok(listener) => {
            drop(listener);
            TransportKind::Unix
        }
        Err(err) => {
            tracing::debug!(
                target: TRACING_TARGET,
                error = %err,
                "unix domain sockets unavailable, selecting tcp"
            );
            TransportKind::Tcp
        }
    }
}

/// Opens an HTTP/1 connection to an endpoint.
///
/// The connection driver is detached; it terminates when the returned
/// sender is dropped or the peer closes the stream.
pub(crate) async fn connect(endpoint: &Endpoint) -> std::io::Result<SendRequest<Full<Bytes>>> {
    match endpoint {
        Endpoint::Unix(path) => handshake(UnixStream::connect(path).await?).await,
        Endpoint::Tcp(addr) => handshake(TcpStream::connect(addr).await?).await,
    }
}

async fn handshake<S>(stream: S) -> std::io::Result<SendRequest<Full<Bytes>>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .map_err(std::io::Error::other)?;
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            tracing::debug!(target: TRACING_TARGET, error = %err, "plugin connection closed");
        }
    });
    Ok(sender)
}
