//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (0 < timeouts <= one day)
//! - Check addresses, header names and URLs parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BridgeConfig → Result<(), Vec<ValidationError>>

use std::net::SocketAddr;

use axum::http::HeaderName;
use thiserror::Error;

use crate::config::schema::BridgeConfig;

/// Upper bound for every timeout, in seconds.
pub const MAX_TIMEOUT_SECS: u64 = 86_400;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field}: expected host:port, got {value:?}")]
    InvalidDestination { field: &'static str, value: String },

    #[error("{field}: invalid header name {value:?}")]
    InvalidHeader { field: &'static str, value: String },

    #[error("{field}: invalid URL {value:?}")]
    InvalidUrl { field: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("{field} must be at most {max} seconds, got {value}")]
    TimeoutTooLarge { field: &'static str, value: u64, max: u64 },
}

pub fn validate_config(config: &BridgeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_socket_addr(&mut errors, "listener.bind_address", &config.listener.bind_address);
    check_socket_addr(&mut errors, "forwarder.bind_address", &config.forwarder.bind_address);
    if config.observability.metrics_enabled {
        check_socket_addr(&mut errors, "observability.metrics_address", &config.observability.metrics_address);
    }

    if let Some(destination) = config.destination.static_destination.as_deref() {
        if !destination.trim().is_empty() && !is_host_port(destination) {
            errors.push(ValidationError::InvalidDestination {
                field: "destination.static_destination",
                value: destination.to_string(),
            });
        }
    }
    if let Some(destination) = config.forwarder.destination.as_deref() {
        if !is_host_port(destination) {
            errors.push(ValidationError::InvalidDestination {
                field: "forwarder.destination",
                value: destination.to_string(),
            });
        }
    }

    check_header(&mut errors, "destination.routing_header", &config.destination.routing_header);
    check_header(&mut errors, "preamble.token_header", &config.preamble.token_header);

    if let Some(url) = config.forwarder.url.as_deref() {
        if url::Url::parse(url).is_err() {
            errors.push(ValidationError::InvalidUrl {
                field: "forwarder.url",
                value: url.to_string(),
            });
        }
    }

    check_timeout(&mut errors, "keepalive.pong_wait_secs", config.keepalive.pong_wait_secs);
    check_timeout(&mut errors, "keepalive.write_wait_secs", config.keepalive.write_wait_secs);
    check_timeout(&mut errors, "backend.connect_timeout_secs", config.backend.connect_timeout_secs);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_socket_addr(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

fn check_timeout(errors: &mut Vec<ValidationError>, field: &'static str, secs: u64) {
    if secs == 0 {
        errors.push(ValidationError::ZeroTimeout(field));
    } else if secs > MAX_TIMEOUT_SECS {
        errors.push(ValidationError::TimeoutTooLarge {
            field,
            value: secs,
            max: MAX_TIMEOUT_SECS,
        });
    }
}

fn check_header(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if HeaderName::from_bytes(value.as_bytes()).is_err() {
        errors.push(ValidationError::InvalidHeader {
            field,
            value: value.to_string(),
        });
    }
}

fn is_host_port(value: &str) -> bool {
    match value.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}
