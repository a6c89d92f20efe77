//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (ratio in (0, 1], intervals > 0)
//! - Check seed services have parseable, unique endpoints
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RegistryConfig → Result<(), Vec<ValidationError>>

use std::collections::HashSet;
use std::fmt;

use crate::config::schema::RegistryConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a parsed configuration for semantic errors.
pub fn validate_config(config: &RegistryConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let health = &config.health_check;
    if health.interval_secs == 0 {
        errors.push(ValidationError::new("health_check.interval_secs", "must be at least 1"));
    }
    if health.timeout_ms == 0 {
        errors.push(ValidationError::new("health_check.timeout_ms", "must be at least 1"));
    }

    let breaker = &config.circuit_breaker;
    let ratio = breaker.failure_trip_ratio;
    if !(ratio > 0.0 && ratio <= 1.0) {
        errors.push(ValidationError::new(
            "circuit_breaker.failure_trip_ratio",
            format!("must be in (0, 1], got {ratio}"),
        ));
    }
    if breaker.failure_trip_min_samples == 0 {
        errors.push(ValidationError::new(
            "circuit_breaker.failure_trip_min_samples",
            "must be at least 1",
        ));
    }
    if !breaker.cooldown_secs.is_finite() || breaker.cooldown_secs < 0.0 {
        errors.push(ValidationError::new(
            "circuit_breaker.cooldown_secs",
            "must be a non-negative number",
        ));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<std::net::SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("invalid socket address {:?}", config.observability.metrics_address),
        ));
    }

    let mut seen = HashSet::new();
    for (i, service) in config.services.iter().enumerate() {
        let field = format!("services[{i}]");
        if service.name.trim().is_empty() {
            errors.push(ValidationError::new(format!("{field}.name"), "must not be empty"));
        }
        if let Err(e) = url::Url::parse(&service.url) {
            errors.push(ValidationError::new(format!("{field}.url"), e.to_string()));
        }
        if !seen.insert((service.name.as_str(), service.url.as_str())) {
            errors.push(ValidationError::new(
                field,
                format!("duplicate instance {} for {}", service.url, service.name),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
