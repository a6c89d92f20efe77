//! Error taxonomy for registry operations.
//!
//! # Design Decisions
//! - Management errors (duplicate/unknown) surface directly, never retried
//! - Assignment errors are recoverable by the caller (`is_retryable`)
//! - Probe failures never appear here except as startup eviction

use std::time::Duration;
use thiserror::Error;

/// Errors returned by the registry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    /// The exact (name, url) pair is already registered.
    #[error("instance {url} is already registered for service {name}")]
    DuplicateInstance { name: String, url: String },

    /// No instance was ever registered under this name (or all were removed).
    #[error("service not registered: {0}")]
    UnknownService(String),

    /// The service exists but the instance does not (or the handle is stale).
    #[error("instance {url} is not registered for service {name}")]
    UnknownInstance { name: String, url: String },

    /// Every instance is starting, down, or already assigned.
    #[error("no available instance for service {0}")]
    NoAvailableInstance(String),

    /// The breaker for this service is open; no call was attempted.
    #[error("circuit open for service {name}, retry in {retry_in:?}")]
    CircuitOpen { name: String, retry_in: Duration },

    /// The instance never passed a probe within the retry budget and was evicted.
    #[error("instance {url} of service {name} failed {attempts} startup probes and was evicted")]
    InstanceStartupTimeout {
        name: String,
        url: String,
        attempts: u32,
    },

    /// Release by a caller that does not hold the instance.
    #[error("instance {url} of service {name} is not assigned to this caller")]
    NotAssigned { name: String, url: String },

    /// The outbound call itself failed.
    #[error("request to {url} ({name}) failed: {message}")]
    RequestFailed {
        name: String,
        url: String,
        message: String,
    },
}

impl RegistryError {
    /// True for conditions the caller can retry later or fall back from.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RegistryError::NoAvailableInstance(_) | RegistryError::CircuitOpen { .. }
        )
    }
}

/// Result alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
