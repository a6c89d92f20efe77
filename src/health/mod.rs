//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Periodic timer
//!     → Probe each instance (probe.rs capability, deadline enforced)
//!     → Registry::record_probe → availability state machine
//!
//! Passive health checks (passive.rs):
//!     Holder releases an instance with a failed outcome
//!     → Available instance marked Down
//! ```
//!
//! # Design Decisions
//! - Probe failures are absorbed: logged and folded into availability, never raised
//! - A probe that exceeds its timeout is a failed probe
//! - Health state is per-instance; the circuit breaker is per-service

pub mod active;
pub mod passive;
pub mod probe;

pub use active::{CheckSummary, HealthMonitor};
pub use probe::{HealthProbe, ProbeReport};
