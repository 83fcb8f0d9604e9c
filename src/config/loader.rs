//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::{ServerConfig, TlsPaths};
use crate::config::validation::{validate_config, ValidationError};
use crate::net::TlsConfig;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

fn read(path: &Path) -> Result<Vec<u8>, ConfigError> {
    fs::read(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<ServerConfig, ConfigError> {
    let config: ServerConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Read the PEM files named by the config.
///
/// Relative paths resolve against `base`, normally the config file's directory.
pub fn load_tls_material(paths: &TlsPaths, base: &Path) -> Result<TlsConfig, ConfigError> {
    let cert = read(&base.join(&paths.cert_path))?;
    let key = read(&base.join(&paths.key_path))?;
    Ok(TlsConfig::new(cert, key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_config_reports_validation_errors() {
        let err = parse_config("[listener]\nmax_connections = 0\n").unwrap_err();
        match err {
            ConfigError::Validation(errors) => assert_eq!(errors.len(), 1),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        assert!(matches!(parse_config("[listener"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn reads_tls_material_relative_to_base() {
        let dir = std::env::temp_dir().join(format!("uniserve-tls-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("cert.pem"), b"CERT").unwrap();
        fs::write(dir.join("key.pem"), b"KEY").unwrap();

        let paths = TlsPaths {
            cert_path: "cert.pem".into(),
            key_path: "key.pem".into(),
        };
        let tls = load_tls_material(&paths, &dir).unwrap();
        assert_eq!(tls.cert, b"CERT");
        assert_eq!(tls.key, b"KEY");

        let missing = TlsPaths {
            cert_path: "missing.pem".into(),
            key_path: "key.pem".into(),
        };
        assert!(matches!(load_tls_material(&missing, &dir), Err(ConfigError::Io { .. })));
        fs::remove_dir_all(&dir).unwrap();
    }
}
