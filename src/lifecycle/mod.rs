//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     trigger() → every subscribed background task (health monitor) exits its loop
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → resolve shutdown_signal() → caller triggers Shutdown
//! ```
//!
//! # Design Decisions
//! - Background tasks never outlive the registry they watch
//! - Registry teardown (`Registry::shutdown_all`) runs after tasks stop

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::shutdown_signal;
