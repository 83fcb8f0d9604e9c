//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, addresses parse)
//! - Reject engines that are not known or not compiled in
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ServerConfig;
use crate::runtime::Runtime;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.hostname must not be empty")]
    EmptyHostname,

    #[error("listener.{field} must be greater than zero")]
    ZeroLimit { field: &'static str },

    #[error("listener.tls.{field} must not be empty")]
    EmptyTlsPath { field: &'static str },

    #[error("runtime.engine {0:?} is unknown or not compiled in")]
    UnknownEngine(String),

    #[error("observability.metrics_address {0:?} is not a socket address")]
    MetricsAddress(String),
}

pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let listener = &config.listener;

    if listener.hostname.trim().is_empty() {
        errors.push(ValidationError::EmptyHostname);
    }
    if listener.max_connections == 0 {
        errors.push(ValidationError::ZeroLimit { field: "max_connections" });
    }
    if listener.max_body_bytes == 0 {
        errors.push(ValidationError::ZeroLimit { field: "max_body_bytes" });
    }
    if let Some(tls) = &listener.tls {
        if tls.cert_path.trim().is_empty() {
            errors.push(ValidationError::EmptyTlsPath { field: "cert_path" });
        }
        if tls.key_path.trim().is_empty() {
            errors.push(ValidationError::EmptyTlsPath { field: "key_path" });
        }
    }

    if Runtime::resolve(Some(&config.runtime.engine)) == Runtime::Unknown {
        errors.push(ValidationError::UnknownEngine(config.runtime.engine.clone()));
    }

    let observability = &config.observability;
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::MetricsAddress(observability.metrics_address.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
