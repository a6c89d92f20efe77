//! Read-only views of registry state for observability tooling and tests.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::registry::instance::{Availability, Instance};

/// One instance as seen at snapshot time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceSnapshot {
    pub url: String,
    pub assigned: bool,
    pub assigned_service: Option<String>,
    pub availability: Availability,
}

impl From<&Instance> for InstanceSnapshot {
    fn from(instance: &Instance) -> Self {
        Self {
            url: instance.url().to_string(),
            assigned: instance.is_assigned(),
            assigned_service: instance.assigned_service().map(str::to_string),
            availability: instance.availability(),
        }
    }
}

/// Every service name mapped to all of its instances, in registration order.
pub type RegistrySnapshot = BTreeMap<String, Vec<InstanceSnapshot>>;
