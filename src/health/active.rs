//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every registered instance
//! - Update instance availability based on results
//! - Evict instances that never come up

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time;

use crate::error::RegistryError;
use crate::health::probe::{HealthProbe, ProbeReport};
use crate::registry::{InstanceRef, ProbeTransition, Registry};
use crate::resilience::timeouts::with_deadline;

/// Tally of one probe sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckSummary {
    pub probed: usize,
    pub promoted: usize,
    pub recovered: usize,
    pub went_down: usize,
    pub evicted: usize,
}

pub struct HealthMonitor<P> {
    registry: Arc<Registry>,
    probe: P,
}

impl<P: HealthProbe> HealthMonitor<P> {
    pub fn new(registry: Arc<Registry>, probe: P) -> Self {
        Self { registry, probe }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let config = self.registry.config().health_check.clone();
        if !config.enabled {
            tracing::info!("Active health checks disabled");
            return;
        }

        tracing::info!(
            interval = config.interval_secs,
            timeout_ms = config.timeout_ms,
            "Health monitor starting"
        );

        // tokio panics on a zero period.
        let mut ticker = time::interval(config.interval().max(Duration::from_millis(1)));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let summary = self.check_all().await;
                    tracing::debug!(?summary, "Health sweep complete");
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Probe every registered instance once.
    pub async fn check_all(&self) -> CheckSummary {
        let mut summary = CheckSummary::default();

        for target in self.registry.targets() {
            summary.probed += 1;
            match self.check_one(&target).await {
                Some(ProbeTransition::Promoted) => summary.promoted += 1,
                Some(ProbeTransition::Recovered) => summary.recovered += 1,
                Some(ProbeTransition::WentDown) => summary.went_down += 1,
                Some(ProbeTransition::StartupTimedOut { .. }) => summary.evicted += 1,
                _ => {}
            }
        }

        summary
    }

    /// Probe one instance and fold the result into the registry.
    ///
    /// Returns `None` if the instance disappeared while it was being probed.
    pub async fn check_one(&self, target: &InstanceRef) -> Option<ProbeTransition> {
        let timeout = self.registry.config().health_check.timeout();

        let report = match with_deadline(timeout, self.probe.probe(&target.url)).await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(service = %target.name, url = %target.url, error = %e, "Health check failed: timeout");
                ProbeReport::unhealthy(timeout)
            }
        };

        match self.registry.record_probe(target, report.healthy) {
            Ok(transition) => Some(transition),
            Err(RegistryError::InstanceStartupTimeout { name, url, attempts }) => {
                tracing::warn!(
                    service = %name,
                    url = %url,
                    attempts,
                    "Instance never became healthy, evicted"
                );
                Some(ProbeTransition::StartupTimedOut { attempts })
            }
            Err(e) => {
                tracing::debug!(url = %target.url, error = %e, "Probe result dropped");
                None
            }
        }
    }
}
