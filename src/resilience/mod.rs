//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to a service:
//!     → circuit_breaker.rs (admit or fail fast)
//!     → timeouts.rs (enforce probe/call deadline)
//!     → circuit_breaker.rs (record outcome, trip if failure ratio exceeded)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every probe has a deadline
//! - No hidden retries: the caller decides whether to try again
//! - Circuit breaker prevents cascading failures

pub mod circuit_breaker;
pub mod timeouts;

pub use circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitState, Outcome};
