//! Per-service pool: the instances of one logical service plus its breaker.
//!
//! # Responsibilities
//! - Own the Instance Records of one name, in registration order
//! - Own that name's circuit breaker
//! - Apply probe results, assignments and releases as single critical sections
//!
//! The registry wraps each pool in its own mutex, so services never contend
//! with each other and every read-then-mark sequence here is atomic.

use std::time::{Duration, Instant};

use crate::config::CircuitBreakerConfig;
use crate::error::{RegistryError, Result};
use crate::health::passive;
use crate::load_balancer::Selector;
use crate::observability::metrics;
use crate::registry::instance::{Assignment, Instance, InstanceRef, ProbeTransition};
use crate::registry::snapshot::InstanceSnapshot;
use crate::resilience::circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitState, Outcome};

#[derive(Debug)]
pub(crate) struct ServicePool {
    name: String,
    /// Distinguishes this lifetime of `name` from earlier and later ones.
    generation: u64,
    instances: Vec<Instance>,
    breaker: CircuitBreaker,
    /// (instance id, holder) of the assignment carrying the half-open permit.
    trial: Option<(u64, String)>,
    /// Set once the pool has been removed from the registry map.
    retired: bool,
}

impl ServicePool {
    pub fn new(name: &str, generation: u64) -> Self {
        Self {
            name: name.to_string(),
            generation,
            instances: Vec::new(),
            breaker: CircuitBreaker::new(name),
            trial: None,
            retired: false,
        }
    }

    pub fn is_retired(&self) -> bool {
        self.retired
    }

    pub fn retire(&mut self) {
        self.retired = true;
        self.breaker.reset();
        self.trial = None;
        for instance in self.instances.drain(..) {
            metrics::forget_instance(&self.name, instance.url());
        }
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn add(&mut self, instance: Instance) -> Result<InstanceRef> {
        if self.instances.iter().any(|i| i.url() == instance.url()) {
            return Err(RegistryError::DuplicateInstance {
                name: self.name.clone(),
                url: instance.url().to_string(),
            });
        }
        let instance_ref = instance.to_ref();
        self.instances.push(instance);
        metrics::record_instance_count(&self.name, self.instances.len());
        Ok(instance_ref)
    }

    pub fn remove(&mut self, url: &str) -> Result<Instance> {
        let idx = self
            .instances
            .iter()
            .position(|i| i.url() == url)
            .ok_or_else(|| RegistryError::UnknownInstance {
                name: self.name.clone(),
                url: url.to_string(),
            })?;
        let instance = self.instances.remove(idx);
        metrics::forget_instance(&self.name, instance.url());
        metrics::record_instance_count(&self.name, self.instances.len());
        Ok(instance)
    }

    pub fn instance_refs(&self) -> Vec<InstanceRef> {
        self.instances.iter().map(Instance::to_ref).collect()
    }

    pub fn snapshot(&self) -> Vec<InstanceSnapshot> {
        self.instances.iter().map(InstanceSnapshot::from).collect()
    }

    pub fn breaker(&self) -> BreakerSnapshot {
        self.breaker.snapshot()
    }

    /// Fold one probe result into the instance's availability.
    ///
    /// An instance that exhausts its startup retries is evicted here and the
    /// eviction is reported as `InstanceStartupTimeout`.
    pub fn observe_probe(
        &mut self,
        target: &InstanceRef,
        healthy: bool,
        startup_max_retries: u32,
    ) -> Result<ProbeTransition> {
        let idx = self.position(target)?;
        let instance = &mut self.instances[idx];
        let transition = instance.observe_probe(healthy, startup_max_retries);

        match transition {
            ProbeTransition::Promoted => {
                tracing::info!(service = %self.name, url = %target.url, "Instance available")
            }
            ProbeTransition::Recovered => {
                tracing::info!(service = %self.name, url = %target.url, "Instance recovered")
            }
            ProbeTransition::WentDown => {
                tracing::warn!(service = %self.name, url = %target.url, "Instance down after failed probe")
            }
            ProbeTransition::StillStarting { attempts } => {
                tracing::debug!(service = %self.name, url = %target.url, attempts, "Instance still starting")
            }
            ProbeTransition::StartupTimedOut { attempts } => {
                self.instances.remove(idx);
                metrics::forget_instance(&self.name, &target.url);
                metrics::record_instance_count(&self.name, self.instances.len());
                return Err(RegistryError::InstanceStartupTimeout {
                    name: self.name.clone(),
                    url: target.url.clone(),
                    attempts,
                });
            }
            ProbeTransition::Unchanged => {}
        }
        metrics::record_availability(&self.name, &target.url, self.instances[idx].availability());
        Ok(transition)
    }

    /// Admit the call through the breaker, then claim one assignable instance.
    pub fn assign(
        &mut self,
        holder: String,
        selector: &dyn Selector,
        config: &CircuitBreakerConfig,
        now: Instant,
    ) -> Result<Assignment> {
        if !self.breaker.allow_at(config, now) {
            return Err(RegistryError::CircuitOpen {
                name: self.name.clone(),
                retry_in: self.breaker.retry_in_at(config, now),
            });
        }
        // Admitted while half-open means this call holds the single permit.
        let trial = self.breaker.state() == CircuitState::HalfOpen;

        let candidates: Vec<&Instance> =
            self.instances.iter().filter(|i| i.is_assignable()).collect();
        let chosen = selector
            .select(&self.name, &candidates)
            .and_then(|idx| candidates.get(idx))
            .map(|instance| instance.id());

        let Some(instance) = chosen.and_then(|id| self.instances.iter_mut().find(|i| i.id() == id))
        else {
            // A half-open trial that never ran must not wedge the breaker.
            self.breaker.cancel_trial();
            return Err(RegistryError::NoAvailableInstance(self.name.clone()));
        };

        instance.assign(holder.clone());
        if trial {
            self.trial = Some((instance.id(), holder.clone()));
        }
        tracing::debug!(
            service = %self.name,
            url = %instance.url(),
            holder = %holder,
            trial,
            "Instance assigned"
        );
        Ok(Assignment {
            instance: instance.to_ref(),
            holder,
            generation: self.generation,
        })
    }

    /// Give the instance back and record the call outcome in the breaker.
    ///
    /// If the instance was deregistered while held, the outcome still counts
    /// against the service. An assignment from an earlier lifetime of the
    /// service (before a shutdown) is refused and records nothing.
    pub fn release(
        &mut self,
        assignment: &Assignment,
        outcome: Outcome,
        elapsed: Duration,
        config: &CircuitBreakerConfig,
    ) -> Result<()> {
        if assignment.generation != self.generation {
            return Err(RegistryError::UnknownInstance {
                name: self.name.clone(),
                url: assignment.instance.url.clone(),
            });
        }

        match self.position(&assignment.instance) {
            Ok(idx) => {
                let instance = &mut self.instances[idx];
                if instance.assigned_service() != Some(assignment.holder.as_str()) {
                    return Err(RegistryError::NotAssigned {
                        name: self.name.clone(),
                        url: assignment.instance.url.clone(),
                    });
                }
                instance.unassign();
                passive::observe_call(instance, outcome);
            }
            Err(_) => {
                tracing::debug!(
                    service = %self.name,
                    url = %assignment.instance.url,
                    "Released instance was deregistered while assigned"
                );
            }
        }

        let holds_trial = self
            .trial
            .as_ref()
            .is_some_and(|(id, holder)| *id == assignment.instance.id && *holder == assignment.holder);

        metrics::record_call(&self.name, outcome, elapsed);
        if holds_trial {
            self.trial = None;
            self.breaker.record_trial(config, outcome, elapsed);
        } else {
            self.breaker.record(config, outcome, elapsed);
        }
        Ok(())
    }

    fn position(&self, target: &InstanceRef) -> Result<usize> {
        self.instances
            .iter()
            .position(|i| i.id() == target.id)
            .ok_or_else(|| RegistryError::UnknownInstance {
                name: self.name.clone(),
                url: target.url.clone(),
            })
    }
}
