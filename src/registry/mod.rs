//! Service registry.
//!
//! # Data Flow
//! ```text
//! register(name, url)
//!     → pool.rs (append Instance in STARTING)
//! HealthMonitor probe
//!     → record_probe → instance.rs state machine (promote / down / recover / evict)
//! assign(name)
//!     → circuit breaker admits? → selector picks an AVAILABLE, unassigned instance
//! release(assignment, outcome, elapsed)
//!     → clear assignment → passive health → circuit breaker record (may trip)
//! deregister(name, url) / shutdown(name)
//!     → remove instance(s); an emptied service drops its breaker too
//! ```
//!
//! # Design Decisions
//! - One mutex per service name: no cross-service contention
//! - The map only hands out `Arc`s; no shard lock is held while a pool is locked
//! - A removed pool is marked retired under its own lock, so late callers
//!   holding the old `Arc` observe `UnknownService` instead of a ghost
//! - Config lives behind an atomic pointer and is read per operation

pub mod instance;
pub(crate) mod pool;
pub mod snapshot;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::config::RegistryConfig;
use crate::error::{RegistryError, Result};
use crate::load_balancer::{FirstAvailable, Selector};
use crate::observability::metrics;
use crate::resilience::circuit_breaker::{BreakerSnapshot, Outcome};
use crate::transport::ServiceCaller;

pub use instance::{Assignment, Availability, Instance, InstanceRef, ProbeTransition};
pub use snapshot::{InstanceSnapshot, RegistrySnapshot};

use pool::ServicePool;

type SharedPool = Arc<Mutex<ServicePool>>;

/// In-memory registry of logical services and their instances.
pub struct Registry {
    services: DashMap<String, SharedPool>,
    config: ArcSwap<RegistryConfig>,
    selector: Arc<dyn Selector>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("services", &self.services.len())
            .field("selector", &self.selector)
            .finish()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

fn lock(pool: &Mutex<ServicePool>) -> MutexGuard<'_, ServicePool> {
    pool.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Registry {
    /// Create a registry using first-available selection.
    pub fn new(config: RegistryConfig) -> Self {
        Self::with_selector(config, Arc::new(FirstAvailable::new()))
    }

    /// Create a registry with a custom selection strategy.
    pub fn with_selector(config: RegistryConfig, selector: Arc<dyn Selector>) -> Self {
        Self {
            services: DashMap::new(),
            config: ArcSwap::from_pointee(config),
            selector,
            next_id: AtomicU64::new(1),
        }
    }

    /// Current configuration.
    pub fn config(&self) -> Arc<RegistryConfig> {
        self.config.load_full()
    }

    /// Replace the configuration; applies from the next operation.
    pub fn apply_config(&self, config: RegistryConfig) {
        tracing::info!(
            failure_trip_ratio = config.circuit_breaker.failure_trip_ratio,
            failure_trip_min_samples = config.circuit_breaker.failure_trip_min_samples,
            cooldown_secs = config.circuit_breaker.cooldown_secs,
            probe_timeout_ms = config.health_check.timeout_ms,
            "Registry configuration updated"
        );
        self.config.store(Arc::new(config));
    }

    /// Register a new instance of `name` in the STARTING state.
    pub fn register(&self, name: &str, url: &str) -> Result<InstanceRef> {
        loop {
            let pool = self
                .services
                .entry(name.to_string())
                .or_insert_with(|| {
                    let generation = self.next_id.fetch_add(1, Ordering::Relaxed);
                    Arc::new(Mutex::new(ServicePool::new(name, generation)))
                })
                .value()
                .clone();

            let mut guard = lock(&pool);
            if guard.is_retired() {
                // Raced with a removal; the next lookup creates a fresh pool.
                continue;
            }

            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let instance_ref = guard.add(Instance::new(id, name, url))?;
            tracing::info!(service = %name, url = %url, instances = guard.len(), "Registered service instance");
            return Ok(instance_ref);
        }
    }

    /// Remove one instance. Removing the last one drops the service and its breaker.
    pub fn deregister(&self, name: &str, url: &str) -> Result<InstanceRef> {
        self.with_pool(name, |pool, guard| {
            let removed = guard.remove(url)?;
            tracing::info!(service = %name, url = %url, remaining = guard.len(), "Deregistered service instance");
            self.retire_if_empty(name, pool, guard);
            Ok(removed.to_ref())
        })
    }

    /// Remove every instance of `name` and reset its breaker. Returns how many were removed.
    pub fn shutdown(&self, name: &str) -> Result<usize> {
        self.with_pool(name, |pool, guard| {
            let removed = guard.len();
            self.retire(name, pool, guard);
            tracing::info!(service = %name, removed, "Service shut down");
            Ok(removed)
        })
    }

    /// Shut down every registered service.
    pub fn shutdown_all(&self) -> usize {
        self.service_names()
            .iter()
            .filter_map(|name| self.shutdown(name).ok())
            .sum()
    }

    /// Names of all registered services, sorted.
    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// All instances of one service, in registration order.
    pub fn instances(&self, name: &str) -> Result<Vec<InstanceSnapshot>> {
        self.with_pool(name, |_, guard| Ok(guard.snapshot()))
    }

    /// Every service with all of its instances.
    pub fn snapshot(&self) -> RegistrySnapshot {
        self.pools()
            .into_iter()
            .filter_map(|(name, pool)| {
                let guard = lock(&pool);
                if guard.is_retired() {
                    None
                } else {
                    Some((name, guard.snapshot()))
                }
            })
            .collect()
    }

    /// Breaker state and tracing counters of one service.
    pub fn breaker(&self, name: &str) -> Result<BreakerSnapshot> {
        self.with_pool(name, |_, guard| Ok(guard.breaker()))
    }

    /// Every registered instance, for the health monitor.
    pub fn targets(&self) -> Vec<InstanceRef> {
        self.pools()
            .into_iter()
            .flat_map(|(_, pool)| {
                let guard = lock(&pool);
                if guard.is_retired() {
                    Vec::new()
                } else {
                    guard.instance_refs()
                }
            })
            .collect()
    }

    /// Fold one probe result into an instance's availability.
    ///
    /// Returns `InstanceStartupTimeout` when the instance was evicted, and
    /// `UnknownService`/`UnknownInstance` when it was removed in the meantime.
    pub fn record_probe(&self, target: &InstanceRef, healthy: bool) -> Result<ProbeTransition> {
        let max_retries = self.config.load().health_check.startup_max_retries;
        self.with_pool(&target.name, |pool, guard| {
            let result = guard.observe_probe(target, healthy, max_retries);
            self.retire_if_empty(&target.name, pool, guard);
            result
        })
    }

    /// Claim an instance of `name` under a fresh session identifier.
    pub fn assign(&self, name: &str) -> Result<Assignment> {
        self.assign_as(name, Uuid::new_v4().to_string())
    }

    /// Claim an instance of `name` for `holder`.
    ///
    /// Fails fast with `CircuitOpen` or `NoAvailableInstance`; never waits.
    pub fn assign_as(&self, name: &str, holder: impl Into<String>) -> Result<Assignment> {
        let config = self.config.load();
        let holder = holder.into();
        self.with_pool(name, |_, guard| {
            guard.assign(
                holder,
                self.selector.as_ref(),
                &config.circuit_breaker,
                Instant::now(),
            )
        })
        .inspect_err(|e| {
            if e.is_retryable() {
                tracing::debug!(service = %name, error = %e, "Assignment refused");
            }
        })
    }

    /// Return an assigned instance and record how the call went.
    pub fn release(&self, assignment: &Assignment, outcome: Outcome, elapsed: Duration) -> Result<()> {
        let config = self.config.load();
        self.with_pool(&assignment.instance.name, |_, guard| {
            guard.release(assignment, outcome, elapsed, &config.circuit_breaker)
        })
    }

    /// Assign an instance, perform the call through `caller`, and release it
    /// with the observed outcome. No retries.
    ///
    /// Dropping the returned future mid-call releases the instance as a
    /// failure.
    pub async fn call<C: ServiceCaller>(&self, name: &str, caller: &C) -> Result<C::Response> {
        let held = HeldAssignment::new(self, self.assign(name)?);
        let url = held.url().to_string();
        let report = caller.call(&url).await;
        let outcome = Outcome::from(report.result.is_ok());

        tracing::info!(
            service = %name,
            url = %url,
            outcome = outcome.as_str(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Traced service request"
        );
        held.finish(outcome, report.elapsed);

        report.result.map_err(|e| RegistryError::RequestFailed {
            name: name.to_string(),
            url,
            message: e.to_string(),
        })
    }

    fn release_quietly(&self, assignment: &Assignment, outcome: Outcome, elapsed: Duration) {
        if let Err(e) = self.release(assignment, outcome, elapsed) {
            tracing::debug!(service = %assignment.instance.name, error = %e, "Release after call failed");
        }
    }

    fn pools(&self) -> Vec<(String, SharedPool)> {
        self.services
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    fn with_pool<T>(
        &self,
        name: &str,
        f: impl FnOnce(&SharedPool, &mut ServicePool) -> Result<T>,
    ) -> Result<T> {
        let pool = self
            .services
            .get(name)
            .map(|e| e.value().clone())
            .ok_or_else(|| RegistryError::UnknownService(name.to_string()))?;

        let mut guard = lock(&pool);
        if guard.is_retired() {
            return Err(RegistryError::UnknownService(name.to_string()));
        }
        f(&pool, &mut *guard)
    }

    fn retire_if_empty(&self, name: &str, pool: &SharedPool, guard: &mut ServicePool) {
        if guard.is_empty() {
            self.retire(name, pool, guard);
        }
    }

    fn retire(&self, name: &str, pool: &SharedPool, guard: &mut ServicePool) {
        guard.retire();
        self.services.remove_if(name, |_, current| Arc::ptr_eq(current, pool));
        metrics::record_instance_count(name, 0);
    }
}

/// An assignment owned by an in-flight `Registry::call`.
///
/// Released with the real outcome by `finish`, or as a failure on drop.
struct HeldAssignment<'a> {
    registry: &'a Registry,
    assignment: Option<Assignment>,
    started: Instant,
}

impl<'a> HeldAssignment<'a> {
    fn new(registry: &'a Registry, assignment: Assignment) -> Self {
        Self {
            registry,
            assignment: Some(assignment),
            started: Instant::now(),
        }
    }

    fn url(&self) -> &str {
        self.assignment
            .as_ref()
            .map(|a| a.instance.url.as_str())
            .unwrap_or_default()
    }

    fn finish(mut self, outcome: Outcome, elapsed: Duration) {
        if let Some(assignment) = self.assignment.take() {
            self.registry.release_quietly(&assignment, outcome, elapsed);
        }
    }
}

impl Drop for HeldAssignment<'_> {
    fn drop(&mut self) {
        if let Some(assignment) = self.assignment.take() {
            tracing::warn!(
                service = %assignment.instance.name,
                url = %assignment.instance.url,
                "Call cancelled while holding an instance, releasing as failed"
            );
            self.registry
                .release_quietly(&assignment, Outcome::Failure, self.started.elapsed());
        }
    }
}
