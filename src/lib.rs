//! Client-side service registry.
//!
//! Tracks instances of logical services, probes them in the background,
//! hands out exclusive assignments of healthy instances, and guards each
//! service with a circuit breaker fed by call outcomes.
//!
//! ```text
//!   register / deregister / shutdown          assign ──▶ call ──▶ release
//!              │                                 │                   │
//!              ▼                                 ▼                   ▼
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │ Registry: name → ServicePool { instances, circuit breaker }          │
//!   └──────────────────────────────────────────────────────────────────────┘
//!              ▲                                             │
//!              │ record_probe                                ▼
//!   ┌────────────────────┐                      ┌────────────────────────┐
//!   │   HealthMonitor    │── HealthProbe ──▶    │ observability: tracing │
//!   │ (periodic sweeps)  │                      │ + metrics              │
//!   └────────────────────┘                      └────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;
pub mod registry;
pub mod resilience;
pub mod transport;

pub use config::RegistryConfig;
pub use error::{RegistryError, Result};
pub use health::{HealthMonitor, HealthProbe, ProbeReport};
pub use lifecycle::Shutdown;
pub use registry::{Assignment, Availability, InstanceRef, InstanceSnapshot, Registry, RegistrySnapshot};
pub use resilience::{BreakerSnapshot, CircuitState, Outcome};
pub use transport::{CallReport, HttpCaller, HttpProbe, ServiceCaller};
