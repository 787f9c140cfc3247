//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (deadlines > 0, caps > 0)
//! - Validate the route base and socket addresses
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: Config → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::Config;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Check a configuration, reporting every problem found.
pub fn validate_config(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    let base = &config.app.base;
    if base != "/" && (!base.starts_with('/') || base.ends_with('/')) {
        errors.push(ValidationError::new(
            "app.base",
            "must be '/' or start with '/' and not end with '/'",
        ));
    }

    if config.app.body_deadline_ms == 0 {
        errors.push(ValidationError::new("app.body_deadline_ms", "must be greater than 0"));
    }

    if config.app.max_headers == 0 {
        errors.push(ValidationError::new("app.max_headers", "must be greater than 0"));
    }

    if config.app.max_body_bytes == 0 {
        errors.push(ValidationError::new("app.max_body_bytes", "must be greater than 0"));
    }

    if let Some(cache) = &config.cache {
        if cache.name.trim().is_empty() {
            errors.push(ValidationError::new("cache.name", "must not be empty"));
        }
    }

    if config.runtime.ip_header.trim().is_empty() {
        errors.push(ValidationError::new("runtime.ip_header", "must not be empty"));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!(
                "'{}' is not a socket address",
                config.observability.metrics_address
            ),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
