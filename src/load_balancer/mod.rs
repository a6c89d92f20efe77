//! Instance selection subsystem.
//!
//! # Data Flow
//! ```text
//! assign(name) → circuit admits the call
//!     → pool.rs filters instances: Available and unassigned, registration order
//!     → Apply selection strategy:
//!         - first_available.rs (first candidate; the default)
//!         - round_robin.rs (rotate through candidates per service)
//!     → pool.rs marks the chosen instance assigned
//! ```
//!
//! # Design Decisions
//! - Strategies only choose; they never mutate instance state
//! - Candidates are pre-filtered so a strategy cannot pick an unusable instance
//! - Strategies run inside the service's critical section

use std::fmt::Debug;

use crate::registry::instance::Instance;

pub mod first_available;
pub mod round_robin;

pub use first_available::FirstAvailable;
pub use round_robin::RoundRobin;

/// Selection strategy over assignable instances.
pub trait Selector: Send + Sync + Debug {
    /// Return the index into `candidates` of the instance to hand out,
    /// or `None` to refuse.
    fn select(&self, service: &str, candidates: &[&Instance]) -> Option<usize>;
}
