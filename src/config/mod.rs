//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize, read TLS files)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!     → ServeOptions::from_config
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - File paths are resolved here; the server core only sees PEM bytes

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_tls_material, parse_config, ConfigError};
pub use schema::{ListenerConfig, ObservabilityConfig, RuntimeConfig, ServerConfig, TlsPaths};
pub use validation::ValidationError;
