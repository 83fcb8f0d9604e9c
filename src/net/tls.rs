//! TLS material validation and acceptor construction.
//!
//! The core receives the key and certificate as raw PEM contents. Resolving
//! file paths is left to the caller (see `config::loader::load_tls_material`).

use axum_server::tls_rustls::{RustlsAcceptor, RustlsConfig};
use thiserror::Error;

/// A PEM-encoded private key and certificate chain.
#[derive(Clone)]
pub struct TlsConfig {
    pub cert: Vec<u8>,
    pub key: Vec<u8>,
}

impl TlsConfig {
    pub fn new(cert: impl Into<Vec<u8>>, key: impl Into<Vec<u8>>) -> Self {
        Self {
            cert: cert.into(),
            key: key.into(),
        }
    }
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.debug_struct("TlsConfig")
            .field("cert_bytes", &self.cert.len())
            .field("key_bytes", &self.key.len())
            .finish()
    }
}

/// Errors raised while preparing TLS.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("certificate PEM contains no certificates")]
    NoCertificates,

    #[error("key PEM contains no private key")]
    NoPrivateKey,

    #[error("malformed PEM: {0}")]
    Pem(#[source] std::io::Error),

    #[error("rustls rejected the key pair: {0}")]
    Rejected(#[source] std::io::Error),
}

/// Check that the PEM blobs hold at least one certificate and one key.
pub fn validate(tls: &TlsConfig) -> Result<(), TlsError> {
    let certs = rustls_pemfile::certs(&mut tls.cert.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .map_err(TlsError::Pem)?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates);
    }

    match rustls_pemfile::private_key(&mut tls.key.as_slice()).map_err(TlsError::Pem)? {
        Some(_) => Ok(()),
        None => Err(TlsError::NoPrivateKey),
    }
}

/// Build a rustls server configuration from raw PEM contents.
pub async fn load_rustls_config(tls: &TlsConfig) -> Result<RustlsConfig, TlsError> {
    validate(tls)?;
    RustlsConfig::from_pem(tls.cert.clone(), tls.key.clone())
        .await
        .map_err(TlsError::Rejected)
}

/// Acceptor used by the engines that run their own accept loop.
pub async fn acceptor(tls: &TlsConfig) -> Result<RustlsAcceptor, TlsError> {
    Ok(RustlsAcceptor::new(load_rustls_config(tls).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_material_is_rejected() {
        let err = validate(&TlsConfig::new(Vec::new(), Vec::new())).unwrap_err();
        assert!(matches!(err, TlsError::NoCertificates));
    }

    #[test]
    fn garbage_is_not_a_certificate() {
        let err = validate(&TlsConfig::new("not a pem file", "nor is this")).unwrap_err();
        assert!(matches!(err, TlsError::NoCertificates));
    }

    #[test]
    fn debug_hides_key() {
        let cfg = TlsConfig::new("cert", "secret-key");
        let rendered = format!("{:?}", cfg);
        assert!(!rendered.contains("secret-key"));
        assert!(rendered.contains("key_bytes"));
    }
}
