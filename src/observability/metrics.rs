//! Metrics collection and exposition.
//!
//! # Metrics
//! - `registry_instances` (gauge): registered instances per service
//! - `registry_instance_available` (gauge): 1=available, 0=starting, down or removed
//! - `registry_calls_total` (counter): released calls by service, outcome
//! - `registry_call_duration_seconds` (histogram): call latency per service
//! - `registry_circuit_state` (gauge): 0=closed, 1=open, 2=half-open
//! - `registry_circuit_rejections_total` (counter): calls refused by an open circuit
//!
//! Without an installed recorder every call here is a no-op.

use ::metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

use crate::registry::instance::Availability;
use crate::resilience::circuit_breaker::{CircuitState, Outcome};

/// Install the Prometheus exporter with an HTTP listener on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_instance_count(service: &str, count: usize) {
    gauge!("registry_instances", "service" => service.to_string()).set(count as f64);
}

pub fn record_availability(service: &str, url: &str, availability: Availability) {
    let value = if availability == Availability::Available { 1.0 } else { 0.0 };
    gauge!(
        "registry_instance_available",
        "service" => service.to_string(),
        "url" => url.to_string()
    )
    .set(value);
}

/// Zero the availability gauge of an instance that left the registry.
pub fn forget_instance(service: &str, url: &str) {
    record_availability(service, url, Availability::Down);
}

pub fn record_call(service: &str, outcome: Outcome, elapsed: Duration) {
    counter!(
        "registry_calls_total",
        "service" => service.to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
    histogram!("registry_call_duration_seconds", "service" => service.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn record_circuit_state(service: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::Open => 1.0,
        CircuitState::HalfOpen => 2.0,
    };
    gauge!("registry_circuit_state", "service" => service.to_string()).set(value);
}

pub fn record_circuit_rejection(service: &str) {
    counter!("registry_circuit_rejections_total", "service" => service.to_string()).increment(1);
}
