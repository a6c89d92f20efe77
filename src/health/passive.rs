//! Passive health checking (failure detection).
//!
//! # Responsibilities
//! - Observe call outcomes reported by the instance's holder
//! - Mark an available instance down when a call against it fails
//!
//! # Design Decisions
//! - One failed call is enough; the next successful probe restores it
//! - Starting and down instances are left alone (probes own those states)
//! - Runs inside the service's critical section, next to the release

use crate::observability::metrics;
use crate::registry::instance::Instance;
use crate::resilience::circuit_breaker::Outcome;

/// Apply a caller-reported outcome to the instance it ran against.
pub(crate) fn observe_call(instance: &mut Instance, outcome: Outcome) {
    if outcome == Outcome::Failure && instance.report_call_failure() {
        tracing::warn!(
            service = %instance.name(),
            url = %instance.url(),
            "Instance down after failed call"
        );
        metrics::record_availability(instance.name(), instance.url(), instance.availability());
    }
}
