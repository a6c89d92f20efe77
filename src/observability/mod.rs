//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Registry, health monitor, circuit breaker produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON lines)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Logging is fire-and-forget; nothing in the core waits on a sink
//! - Metrics are cheap and no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
