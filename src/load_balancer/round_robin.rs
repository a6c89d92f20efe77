//! Round-robin selection strategy.

use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::load_balancer::Selector;
use crate::registry::instance::Instance;

/// Round-robin selector.
/// Keeps one cursor per service to rotate through its candidates.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursors: DashMap<String, AtomicUsize>,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Selector for RoundRobin {
    fn select(&self, service: &str, candidates: &[&Instance]) -> Option<usize> {
        if candidates.is_empty() {
            return None;
        }

        let cursor = self
            .cursors
            .entry(service.to_string())
            .or_insert_with(|| AtomicUsize::new(0));
        let count = cursor.fetch_add(1, Ordering::Relaxed);
        Some(count % candidates.len())
    }
}
