//! Circuit breaker for service protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: service assumed failing, calls fail fast
//! - Half-Open: one trial call tests whether the service recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: total >= min_samples and failures / total >= trip_ratio
//! Open → Half-Open: first admission after the cool-down
//! Half-Open → Closed: trial call succeeds (counters reset)
//! Half-Open → Open: trial call fails (cool-down restarts)
//! ```
//!
//! # Design Decisions
//! - One breaker per logical service, owned by that service's pool
//! - Fail fast in Open state (no network call attempted)
//! - Single trial in Half-Open (prevents hammering a recovering service)
//! - Thresholds are read from config on every evaluation so reloads apply

use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;

/// Trip state of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one completed call, as reported by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
        }
    }
}

impl From<bool> for Outcome {
    fn from(success: bool) -> Self {
        if success {
            Outcome::Success
        } else {
            Outcome::Failure
        }
    }
}

/// Point-in-time view of a breaker's counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failure_requests: u64,
    /// Cumulative latency of recorded calls, in seconds.
    pub duration: f64,
    /// Latency of the most recent recorded call, in seconds.
    pub last_duration: Option<f64>,
}

impl BreakerSnapshot {
    pub fn failure_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.failure_requests as f64 / self.total_requests as f64
        }
    }
}

/// Per-service breaker state and tracing counters.
#[derive(Debug)]
pub struct CircuitBreaker {
    service: String,
    state: CircuitState,
    total_requests: u64,
    successful_requests: u64,
    failure_requests: u64,
    duration: Duration,
    last_duration: Option<Duration>,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

impl CircuitBreaker {
    /// Create a closed breaker with zeroed counters.
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            state: CircuitState::Closed,
            total_requests: 0,
            successful_requests: 0,
            failure_requests: 0,
            duration: Duration::ZERO,
            last_duration: None,
            opened_at: None,
            trial_in_flight: false,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Decide whether a call may proceed now.
    pub fn allow(&mut self, config: &CircuitBreakerConfig) -> bool {
        self.allow_at(config, Instant::now())
    }

    /// Decide whether a call may proceed at `now`.
    ///
    /// An open circuit whose cool-down has elapsed moves to half-open and
    /// hands out its single trial permit.
    pub fn allow_at(&mut self, config: &CircuitBreakerConfig, now: Instant) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let cooled = self
                    .opened_at
                    .map(|at| now.saturating_duration_since(at) >= config.cooldown())
                    .unwrap_or(true);
                if cooled {
                    self.transition_to(CircuitState::HalfOpen, now);
                    self.trial_in_flight = true;
                    true
                } else {
                    metrics::record_circuit_rejection(&self.service);
                    false
                }
            }
            CircuitState::HalfOpen => {
                if self.trial_in_flight {
                    metrics::record_circuit_rejection(&self.service);
                    false
                } else {
                    self.trial_in_flight = true;
                    true
                }
            }
        }
    }

    /// Time left until an open circuit admits its trial call.
    pub fn retry_in_at(&self, config: &CircuitBreakerConfig, now: Instant) -> Duration {
        match (self.state, self.opened_at) {
            (CircuitState::Open, Some(at)) => config
                .cooldown()
                .saturating_sub(now.saturating_duration_since(at)),
            _ => Duration::ZERO,
        }
    }

    /// Hand back a trial permit that was granted but never used.
    pub fn cancel_trial(&mut self) {
        if self.state == CircuitState::HalfOpen {
            self.trial_in_flight = false;
        }
    }

    /// Record a completed ordinary call. Returns the transition it caused, if any.
    ///
    /// Only `record_trial` moves a half-open breaker; ordinary outcomes that
    /// land while it is open or half-open are counted and nothing else.
    pub fn record(
        &mut self,
        config: &CircuitBreakerConfig,
        outcome: Outcome,
        elapsed: Duration,
    ) -> Option<(CircuitState, CircuitState)> {
        self.record_at(config, outcome, elapsed, Instant::now())
    }

    pub fn record_at(
        &mut self,
        config: &CircuitBreakerConfig,
        outcome: Outcome,
        elapsed: Duration,
        now: Instant,
    ) -> Option<(CircuitState, CircuitState)> {
        self.apply(config, outcome, elapsed, now, false)
    }

    /// Record the outcome of the call admitted by the half-open permit.
    pub fn record_trial(
        &mut self,
        config: &CircuitBreakerConfig,
        outcome: Outcome,
        elapsed: Duration,
    ) -> Option<(CircuitState, CircuitState)> {
        self.record_trial_at(config, outcome, elapsed, Instant::now())
    }

    pub fn record_trial_at(
        &mut self,
        config: &CircuitBreakerConfig,
        outcome: Outcome,
        elapsed: Duration,
        now: Instant,
    ) -> Option<(CircuitState, CircuitState)> {
        self.apply(config, outcome, elapsed, now, true)
    }

    fn apply(
        &mut self,
        config: &CircuitBreakerConfig,
        outcome: Outcome,
        elapsed: Duration,
        now: Instant,
        trial: bool,
    ) -> Option<(CircuitState, CircuitState)> {
        self.total_requests += 1;
        match outcome {
            Outcome::Success => self.successful_requests += 1,
            Outcome::Failure => self.failure_requests += 1,
        }
        self.duration += elapsed;
        self.last_duration = Some(elapsed);

        let from = self.state;
        match (self.state, outcome) {
            (CircuitState::HalfOpen, Outcome::Success) if trial => {
                self.transition_to(CircuitState::Closed, now);
                self.clear_counters();
            }
            (CircuitState::HalfOpen, Outcome::Failure) if trial => {
                self.transition_to(CircuitState::Open, now);
            }
            (CircuitState::Closed, _) => {
                if self.should_trip(config) {
                    self.transition_to(CircuitState::Open, now);
                }
            }
            // Late results from calls admitted before the trip.
            (CircuitState::Open, _) | (CircuitState::HalfOpen, _) => {}
        }

        (from != self.state).then_some((from, self.state))
    }

    /// Back to closed with zeroed counters.
    pub fn reset(&mut self) {
        self.transition_to(CircuitState::Closed, Instant::now());
        self.clear_counters();
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        BreakerSnapshot {
            state: self.state,
            total_requests: self.total_requests,
            successful_requests: self.successful_requests,
            failure_requests: self.failure_requests,
            duration: self.duration.as_secs_f64(),
            last_duration: self.last_duration.map(|d| d.as_secs_f64()),
        }
    }

    fn should_trip(&self, config: &CircuitBreakerConfig) -> bool {
        if self.total_requests < config.failure_trip_min_samples.max(1) {
            return false;
        }
        let rate = self.failure_requests as f64 / self.total_requests as f64;
        rate >= config.failure_trip_ratio
    }

    fn clear_counters(&mut self) {
        self.total_requests = 0;
        self.successful_requests = 0;
        self.failure_requests = 0;
        self.duration = Duration::ZERO;
        self.last_duration = None;
    }

    fn transition_to(&mut self, state: CircuitState, now: Instant) {
        self.trial_in_flight = false;
        if state == CircuitState::Open {
            self.opened_at = Some(now);
        }
        if self.state == state {
            return;
        }

        tracing::info!(
            service = %self.service,
            from = %self.state,
            to = %state,
            total = self.total_requests,
            failures = self.failure_requests,
            "Circuit state transition"
        );
        metrics::record_circuit_state(&self.service, state);

        self.state = state;
        if state == CircuitState::Closed {
            self.opened_at = None;
        }
    }
}
