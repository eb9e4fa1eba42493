//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check the upstream URL is an absolute http(s) location
//! - Validate value ranges (channel capacities > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: RelayConfig → Result<(), Vec<ValidationError>>
//! - Runs before the config is accepted into the system

use thiserror::Error;

use crate::config::schema::RelayConfig;
use crate::conn::UriParts;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("upstream.url is not a usable proxy target: {0}")]
    UpstreamUrl(String),

    #[error("transport.body_capacity must be at least 1")]
    BodyCapacity,
}

/// Validate a parsed configuration, collecting every error found.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(e) = UriParts::parse(&config.upstream.url) {
        errors.push(ValidationError::UpstreamUrl(e.to_string()));
    }

    if config.transport.body_capacity == 0 {
        errors.push(ValidationError::BodyCapacity);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
