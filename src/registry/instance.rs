//! Instance record and availability state machine.
//!
//! # States
//! - Starting: registered, not yet observed healthy
//! - Available: last probe succeeded; may be assigned
//! - Down: probe or caller reported failure after being available
//!
//! # State Transitions
//! ```text
//! Starting → Available: first successful probe
//! Starting → (evicted): more than startup_max_retries failed probes
//! Available → Down: failed probe, or failed call reported by the holder
//! Down → Available: successful probe
//! ```
//!
//! # Design Decisions
//! - Never Starting → Down: an instance must be seen healthy once
//! - Assignment state lives next to availability so one lock covers both

use serde::Serialize;
use std::fmt;

/// Health of one physical instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Availability {
    Starting,
    Available,
    Down,
}

impl Availability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Availability::Starting => "STARTING",
            Availability::Available => "AVAILABLE",
            Availability::Down => "DOWN",
        }
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a probe result did to an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeTransition {
    /// Starting → Available.
    Promoted,
    /// Down → Available.
    Recovered,
    /// Available → Down.
    WentDown,
    /// Failed probe while starting; `attempts` failures so far.
    StillStarting { attempts: u32 },
    /// Startup retry budget exhausted; the instance must be evicted.
    StartupTimedOut { attempts: u32 },
    /// No state change.
    Unchanged,
}

/// Cheap handle identifying one registered instance.
///
/// The `id` distinguishes a re-registration of the same (name, url) from a
/// handle obtained before a deregistration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct InstanceRef {
    pub id: u64,
    pub name: String,
    pub url: String,
}

/// Temporary exclusive claim of one instance by one caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assignment {
    pub instance: InstanceRef,
    /// Identifier of the caller/session holding the instance.
    pub holder: String,
    /// Lifetime of the service the claim was made in.
    pub generation: u64,
}

/// One physical endpoint fulfilling a logical service.
#[derive(Debug)]
pub struct Instance {
    id: u64,
    name: String,
    url: String,
    availability: Availability,
    assigned_service: Option<String>,
    startup_failures: u32,
}

impl Instance {
    /// Create a new instance in the Starting state.
    pub fn new(id: u64, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            url: url.into(),
            availability: Availability::Starting,
            assigned_service: None,
            startup_failures: 0,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn availability(&self) -> Availability {
        self.availability
    }

    pub fn is_assigned(&self) -> bool {
        self.assigned_service.is_some()
    }

    pub fn assigned_service(&self) -> Option<&str> {
        self.assigned_service.as_deref()
    }

    /// Available and not held by anyone.
    pub fn is_assignable(&self) -> bool {
        self.availability == Availability::Available && !self.is_assigned()
    }

    pub fn to_ref(&self) -> InstanceRef {
        InstanceRef {
            id: self.id,
            name: self.name.clone(),
            url: self.url.clone(),
        }
    }

    pub(crate) fn assign(&mut self, holder: String) {
        self.assigned_service = Some(holder);
    }

    pub(crate) fn unassign(&mut self) -> Option<String> {
        self.assigned_service.take()
    }

    /// Apply one probe result.
    pub fn observe_probe(&mut self, healthy: bool, startup_max_retries: u32) -> ProbeTransition {
        match (self.availability, healthy) {
            (Availability::Starting, true) => {
                self.availability = Availability::Available;
                self.startup_failures = 0;
                ProbeTransition::Promoted
            }
            (Availability::Starting, false) => {
                self.startup_failures += 1;
                if self.startup_failures > startup_max_retries {
                    ProbeTransition::StartupTimedOut {
                        attempts: self.startup_failures,
                    }
                } else {
                    ProbeTransition::StillStarting {
                        attempts: self.startup_failures,
                    }
                }
            }
            (Availability::Available, false) => {
                self.availability = Availability::Down;
                ProbeTransition::WentDown
            }
            (Availability::Down, true) => {
                self.availability = Availability::Available;
                ProbeTransition::Recovered
            }
            (Availability::Available, true) | (Availability::Down, false) => {
                ProbeTransition::Unchanged
            }
        }
    }

    /// A holder saw a call against this instance fail. Returns true if it went down.
    pub fn report_call_failure(&mut self) -> bool {
        if self.availability == Availability::Available {
            self.availability = Availability::Down;
            true
        } else {
            false
        }
    }
}
