//! Plugin process lifecycle.
//!
//! State machine: `Discovered -> Started -> Healthy -> {Idle, Busy} ->
//! Stopping -> Stopped`. A started plugin announces its listening endpoint
//! as the first stdout line; stderr is streamed to the host logger for the
//! whole process lifetime. Health-check failure during startup is fatal and
//! the process is torn down; dispatch failures later on leave the process
//! running for the next attempt.

use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use strum::IntoStaticStr;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::time::{Instant, timeout};

use crate::client::PluginClient;
use crate::discovery::DiscoveredPlugin;
use crate::error::{Error, Result};
use crate::health::HealthReport;
use crate::transport::Endpoint;
use crate::wire::{CONFIG_FLAG, Capabilities, StartupConfig};

/// Tracing target for plugin lifecycle events.
const TRACING_TARGET: &str = "credo_plugin::process";

/// Interval between health probes during startup.
const HEALTH_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Lifecycle state of a plugin process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum PluginState {
    /// Capabilities probed, process not running.
    Discovered,
    /// Process spawned, endpoint announced, not yet healthy.
    Started,
    /// Health endpoint answered.
    Healthy,
    /// No dispatch in flight.
    Idle,
    /// A dispatch is in flight.
    Busy,
    /// Graceful shutdown in progress.
    Stopping,
    /// Process terminated.
    Stopped,
}

/// A running plugin subprocess.
#[derive(Debug)]
pub struct PluginProcess {
    id: String,
    endpoint: Endpoint,
    capabilities: Capabilities,
    child: tokio::sync::Mutex<Option<Child>>,
    state: Mutex<PluginState>,
}

impl PluginProcess {
    /// Starts a discovered plugin and waits for it to become healthy.
    ///
    /// The startup config is passed via `--config`; the plugin must answer
    /// with its endpoint announcement on stdout. The health endpoint is then
    /// polled until it responds or `startup_deadline` elapses, in which case
    /// the process is killed and the start fails.
    pub async fn start(
        discovered: &DiscoveredPlugin,
        startup: &StartupConfig,
        startup_deadline: Duration,
    ) -> Result<Self> {
        let id = discovered.id.clone();
        let config_json = serde_json::to_string(startup)?;
        let mut child = Command::new(&discovered.path)
            .arg(CONFIG_FLAG)
            .arg(config_json)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| Error::startup(&id, &err))?;

        if let Some(stderr) = child.stderr.take() {
            forward_stderr(id.clone(), stderr);
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::startup(&id, "stdout unavailable"))?;
        let mut lines = BufReader::new(stdout).lines();
        let announcement = timeout(startup_deadline, lines.next_line())
            .await
            .map_err(|_| Error::startup(&id, "timed out waiting for endpoint announcement"))?
            .map_err(|err| Error::startup(&id, &err))?
            .ok_or_else(|| Error::startup(&id, "exited before announcing an endpoint"))?;
        let endpoint = Endpoint::parse(&announcement).ok_or_else(|| {
            Error::startup(&id, format!("malformed endpoint announcement {announcement:?}"))
        })?;
        drain_stdout(id.clone(), lines);

        tracing::debug!(
            target: TRACING_TARGET,
            id = %id,
            endpoint = %endpoint,
            "plugin started, polling health"
        );

        let process = Self {
            id,
            endpoint,
            capabilities: discovered.capabilities.clone(),
            child: tokio::sync::Mutex::new(Some(child)),
            state: Mutex::new(PluginState::Started),
        };

        if let Err(err) = process.await_healthy(startup_deadline).await {
            // Startup health failure is fatal; do not leave the child behind.
            let _ = process.kill().await;
            return Err(err);
        }
        process.set_state(PluginState::Healthy);
        tracing::info!(
            target: TRACING_TARGET,
            id = %process.id,
            endpoint = %process.endpoint,
            "plugin healthy"
        );
        Ok(process)
    }

    /// Returns the plugin id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the announced endpoint.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Returns the capabilities advertised at discovery.
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> PluginState {
        *self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn set_state(&self, state: PluginState) {
        *self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = state;
    }

    /// Probes the health endpoint once.
    pub async fn health(&self) -> HealthReport {
        PluginClient::new(&self.id, self.endpoint.clone())
            .healthz()
            .await
    }

    async fn await_healthy(&self, deadline: Duration) -> Result<()> {
        let started = Instant::now();
        loop {
            let report = self.health().await;
            if report.is_healthy() {
                return Ok(());
            }
            if started.elapsed() >= deadline {
                return Err(Error::startup(
                    &self.id,
                    format!(
                        "never became healthy: {}",
                        report.message.unwrap_or_else(|| "no response".into())
                    ),
                ));
            }
            tokio::time::sleep(HEALTH_POLL_INTERVAL).await;
        }
    }

    /// Gracefully stops the process: interrupt, bounded wait, then kill.
    pub async fn shutdown(&self, grace: Duration) -> Result<()> {
        self.set_state(PluginState::Stopping);
        let mut guard = self.child.lock().await;
        if let Some(mut child) = guard.take() {
            if let Some(pid) = child.id() {
                // SAFETY: pid refers to our own child which has not been
                // reaped yet (we hold the Child).
                unsafe {
                    libc::kill(pid as libc::pid_t, libc::SIGTERM);
                }
            }
            match timeout(grace, child.wait()).await {
                Ok(Ok(status)) => {
                    tracing::debug!(
                        target: TRACING_TARGET,
                        id = %self.id,
                        %status,
                        "plugin exited"
                    );
                }
                Ok(Err(err)) => {
                    self.set_state(PluginState::Stopped);
                    return Err(Error::startup(&self.id, &err));
                }
                Err(_) => {
                    tracing::warn!(
                        target: TRACING_TARGET,
                        id = %self.id,
                        "plugin ignored interrupt, killing"
                    );
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                }
            }
        }
        self.set_state(PluginState::Stopped);
        Ok(())
    }

    async fn kill(&self) -> Result<()> {
        let mut guard = self.child.lock().await;
        if let Some(mut child) = guard.take() {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
        self.set_state(PluginState::Stopped);
        Ok(())
    }
}

/// Streams a child's stderr lines through the host logger.
pub(crate) fn forward_stderr(id: String, stderr: ChildStderr) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(target: TRACING_TARGET, plugin = %id, "{line}");
        }
    });
}

/// Drains stdout after the endpoint announcement so the pipe never blocks.
fn drain_stdout<R>(id: String, mut lines: tokio::io::Lines<BufReader<R>>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::trace!(target: TRACING_TARGET, plugin = %id, "{line}");
        }
    });
}
