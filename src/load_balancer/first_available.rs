//! First-available selection strategy.

use crate::load_balancer::Selector;
use crate::registry::instance::Instance;

/// Picks the earliest-registered assignable instance.
/// No spreading of load: a primary/secondary failover policy.
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstAvailable;

impl FirstAvailable {
    pub fn new() -> Self {
        Self
    }
}

impl Selector for FirstAvailable {
    fn select(&self, _service: &str, candidates: &[&Instance]) -> Option<usize> {
        if candidates.is_empty() {
            None
        } else {
            Some(0)
        }
    }
}
