//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check bind addresses parse as socket addresses
//! - Check backend URLs parse and carry the expected scheme
//! - Check TLS material paths are non-empty
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use url::Url;

use crate::config::schema::ProxyConfig;

/// A single semantic validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Config field the error refers to (e.g., "http.bind_address").
    pub field: String,
    /// Human-readable description of the problem.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_bind_address(&mut errors, "http.bind_address", &config.http.bind_address);
    check_bind_address(
        &mut errors,
        "websocket.bind_address",
        &config.websocket.bind_address,
    );

    check_url(
        &mut errors,
        "http.backend_base_url",
        &config.http.backend_base_url,
        &["http", "https"],
    );
    check_url(
        &mut errors,
        "websocket.target_url",
        &config.websocket.target_url,
        &["ws", "wss"],
    );

    check_path(&mut errors, "tls.cert_path", &config.tls.cert_path);
    check_path(&mut errors, "tls.key_path", &config.tls.key_path);
    check_path(&mut errors, "tls.ca_path", &config.tls.ca_path);

    if config.listener.max_connections == 0 {
        errors.push(ValidationError {
            field: "listener.max_connections".to_string(),
            message: "must be greater than zero".to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_bind_address(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError {
            field: field.to_string(),
            message: format!("'{}' is not a valid socket address", value),
        });
    }
}

fn check_url(errors: &mut Vec<ValidationError>, field: &str, value: &str, schemes: &[&str]) {
    match Url::parse(value) {
        Ok(url) if schemes.contains(&url.scheme()) => {}
        Ok(url) => {
            errors.push(ValidationError {
                field: field.to_string(),
                message: format!(
                    "scheme '{}' not allowed (expected one of {:?})",
                    url.scheme(),
                    schemes
                ),
            });
        }
        Err(e) => {
            errors.push(ValidationError {
                field: field.to_string(),
                message: format!("'{}' is not a valid URL: {}", value, e),
            });
        }
    }
}

fn check_path(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.push(ValidationError {
            field: field.to_string(),
            message: "must not be empty".to_string(),
        });
    }
}
