//! Health probe capability.

use std::future::Future;
use std::time::Duration;

/// Result of probing one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeReport {
    pub healthy: bool,
    pub elapsed: Duration,
}

impl ProbeReport {
    pub fn healthy(elapsed: Duration) -> Self {
        Self { healthy: true, elapsed }
    }

    pub fn unhealthy(elapsed: Duration) -> Self {
        Self { healthy: false, elapsed }
    }
}

/// Something that can tell whether the instance behind `url` is healthy.
///
/// Implementations report failures as `healthy: false`; they never error.
/// The monitor enforces the per-probe timeout around them.
pub trait HealthProbe: Send + Sync {
    fn probe(&self, url: &str) -> impl Future<Output = ProbeReport> + Send;
}
