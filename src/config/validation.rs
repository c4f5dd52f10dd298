//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate listen addresses, the backend URL and discovery settings
//! - Validate value ranges (timeouts > 0, limits > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: NodeConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::{normalize_bind_address, NodeConfig};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid listen address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("backend.url: invalid backend URL {0:?}")]
    InvalidBackendUrl(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("observability.log_level: unknown level {0:?}")]
    UnknownLogLevel(String),

    #[error("discovery.dns_port must be set when discovery.dns_host is")]
    MissingDnsPort,
}

pub fn validate_config(config: &NodeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    check_address(&mut errors, "ring.listen_address", &config.ring.listen_address);
    if config.observability.debug_enabled {
        check_address(
            &mut errors,
            "observability.debug_address",
            &config.observability.debug_address,
        );
    }

    match Url::parse(&config.backend.url) {
        Ok(url) if url.has_host() => {}
        _ => errors.push(ValidationError::InvalidBackendUrl(config.backend.url.clone())),
    }

    if config.ring.replica_points == 0 {
        errors.push(ValidationError::Zero("ring.replica_points"));
    }
    if config.ring.forward_timeout_ms == 0 {
        errors.push(ValidationError::Zero("ring.forward_timeout_ms"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.request_secs"));
    }
    if config.backend.timeout_secs == 0 {
        errors.push(ValidationError::Zero("backend.timeout_secs"));
    }
    if config.security.max_body_size == 0 {
        errors.push(ValidationError::Zero("security.max_body_size"));
    }

    if !LOG_LEVELS.contains(&config.observability.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::UnknownLogLevel(config.observability.log_level.clone()));
    }

    let dns_host_set = config.discovery.dns_host.as_deref().is_some_and(|h| !h.is_empty());
    if dns_host_set && config.discovery.dns_port == 0 {
        errors.push(ValidationError::MissingDnsPort);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if normalize_bind_address(value).parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}
