//! Plugin health reporting.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Operational status of a plugin process.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// The plugin answers its health endpoint.
    #[default]
    Healthy,
    /// The plugin is unreachable or answered with a failure.
    Unhealthy,
}

/// Result of one health probe.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    /// Probe outcome.
    pub status: HealthStatus,
    /// Round-trip time of the probe.
    pub response: Option<Duration>,
    /// Optional message describing a failure.
    pub message: Option<String>,
}

impl HealthReport {
    /// Creates a healthy report with the probe round-trip time.
    pub fn healthy(response: Duration) -> Self {
        Self {
            status: HealthStatus::Healthy,
            response: Some(response),
            message: None,
        }
    }

    /// Creates an unhealthy report.
    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            response: None,
            message: Some(message.into()),
        }
    }

    /// Returns whether the probe succeeded.
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}
