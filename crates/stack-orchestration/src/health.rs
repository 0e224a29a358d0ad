//! Health gate for services.
//!
//! A gate polls one service at a fixed interval until it reports healthy or
//! the timeout elapses. There is no backoff or jitter: probes happen at
//! `t = 0, I, 2I, ...` and one final probe is made at the deadline, so a
//! timeout is reported no earlier than `T` and no later than `T + I`. A probe
//! still running at `T + I` is abandoned and counts as unhealthy.

use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use smol::Timer;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Health status of a service, as observed by polling
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Container is being created or restarted, or its health check has not settled
    Starting,
    /// Service is healthy
    Healthy,
    /// Service is running but its health check fails
    Unhealthy,
    /// No running container
    Stopped,
}

impl HealthStatus {
    /// Map the `State` and `Health` columns reported by `compose ps`.
    ///
    /// A running container without an engine-level health check reports an
    /// empty `Health` and counts as healthy.
    pub fn from_ps(state: &str, health: &str) -> Self {
        match state {
            "running" => match health {
                "" | "healthy" => HealthStatus::Healthy,
                "starting" => HealthStatus::Starting,
                _ => HealthStatus::Unhealthy,
            },
            "restarting" | "created" => HealthStatus::Starting,
            _ => HealthStatus::Stopped,
        }
    }

    /// Lowercase name, as serialized
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Starting => "starting",
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Stopped => "stopped",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anything that can report the current health of a named service
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Probe the service once
    async fn probe(&self, service: &str) -> Result<HealthStatus>;
}

/// Outcome of a successful gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    /// Always [`HealthStatus::Healthy`]
    pub status: HealthStatus,
    /// Number of probes made, including the successful one
    pub polls: u32,
    /// Time from the first probe until healthy
    pub elapsed: Duration,
}

/// Polls a [`HealthProbe`] until healthy or timed out
pub struct HealthGate<P> {
    probe: P,
}

impl<P: HealthProbe> HealthGate<P> {
    /// Create a gate over a probe
    pub fn new(probe: P) -> Self {
        Self { probe }
    }

    /// Block until `service` is healthy, or fail with [`Error::HealthTimeout`].
    ///
    /// Probe errors are logged and counted as unhealthy polls, as are probes
    /// cut off at `timeout + interval`.
    pub async fn wait_healthy(
        &self,
        service: &str,
        interval: Duration,
        timeout: Duration,
    ) -> Result<HealthReport> {
        let start = Instant::now();
        let deadline = start + timeout;
        let cutoff = deadline + interval;
        let mut polls = 0u32;

        debug!(
            "Waiting for {} to become healthy (interval {:?}, timeout {:?})",
            service, interval, timeout
        );

        loop {
            let outcome = smol::future::or(async { Some(self.probe.probe(service).await) }, async {
                Timer::at(cutoff).await;
                None
            })
            .await;
            let status = match outcome {
                Some(Ok(status)) => status,
                Some(Err(e)) => {
                    warn!("Health probe for {} failed: {}", service, e);
                    HealthStatus::Unhealthy
                }
                None => {
                    warn!("Health probe for {} did not finish in time", service);
                    HealthStatus::Unhealthy
                }
            };
            polls += 1;
            debug!("{}: poll {} -> {}", service, polls, status);

            if status == HealthStatus::Healthy {
                return Ok(HealthReport {
                    status,
                    polls,
                    elapsed: start.elapsed(),
                });
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(Error::HealthTimeout {
                    service: service.to_string(),
                    timeout,
                    polls,
                    last_status: status,
                });
            }

            // The last sleep is clipped so the final probe lands on the deadline
            Timer::after(interval.min(deadline - now)).await;
        }
    }
}
