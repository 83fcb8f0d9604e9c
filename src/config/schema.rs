//! Configuration schema definitions.
//!
//! This module defines the configuration the binary reads from disk. All types
//! derive Serde traits for deserialization from TOML.

use serde::{Deserialize, Serialize};

use crate::observability::LogFormat;

/// Root configuration for a server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (hostname, port, TLS, limits).
    pub listener: ListenerConfig,

    /// Engine selection.
    pub runtime: RuntimeConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Hostname or IP to bind (e.g., "0.0.0.0", "localhost").
    pub hostname: String,

    /// Port to bind. 0 picks an ephemeral port.
    pub port: u16,

    /// Share the address with other processes where the platform allows it.
    pub reuse_port: bool,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,

    /// Largest request body the buffering engine accepts.
    pub max_body_bytes: usize,

    /// Optional TLS configuration.
    pub tls: Option<TlsPaths>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            hostname: "0.0.0.0".to_string(),
            port: 3000,
            reuse_port: false,
            max_connections: 10_000,
            max_body_bytes: 1024 * 1024,
            tls: None,
        }
    }
}

/// TLS material on disk.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsPaths {
    /// Path to certificate chain file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Engine selection.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// `auto`, `axum`, `hyper` or `evented`.
    pub engine: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            engine: "auto".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log filter directive (e.g., "info", "uniserve=debug").
    pub log_level: String,

    /// Log line format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
