//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check the listen address parses
//! - Validate value ranges (limits > 0, grace period > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>

use thiserror::Error;

use crate::config::schema::ServerConfig;
use crate::http::{check_http2, ConfigError};
use crate::net::{parse_addr, ParseError};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("address: {0}")]
    Address(#[from] ParseError),

    #[error("address must not be empty")]
    EmptyAddress,

    #[error(transparent)]
    Http2(#[from] ConfigError),

    #[error("shutdown_timeout_secs must be greater than zero")]
    ZeroShutdownTimeout,
}

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.address.is_empty() {
        errors.push(ValidationError::EmptyAddress);
    } else if let Err(e) = parse_addr(&config.address) {
        errors.push(e.into());
    }

    // Limits are checked even when HTTP/2 is off so enabling it later
    // cannot surface a stale error.
    if let Err(e) = check_http2(&config.http2) {
        errors.push(e.into());
    }

    if config.shutdown_timeout_secs == 0 {
        errors.push(ValidationError::ZeroShutdownTimeout);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
