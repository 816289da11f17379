//! TLS configurations
//!
//! Three configs cover the proxy's needs:
//! - upstream with a registry pin: a permissive client config whose chain
//!   verification is deferred to the manual pin check after the handshake
//! - upstream via legacy fallback: standard CA validation against the
//!   Mozilla root bundle
//! - client-facing: a server config built from the minted MITM leaf

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, ServerConfig, SignatureScheme};
use webpki_roots::TLS_SERVER_ROOTS;

use crate::error::{ProxyError, Result};

/// Upstream client config for registry-pinned domains.
///
/// Chain verification is skipped entirely; the caller must verify the
/// presented certificate against the registry pin after the handshake. Never
/// use this config on the legacy path.
pub fn pinned_client_config() -> Arc<ClientConfig> {
    let mut config = ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(DeferredVerifier))
        .with_no_client_auth();
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Arc::new(config)
}

/// Upstream client config for legacy-resolved domains: standard CA
/// validation against the webpki (Mozilla) root bundle.
pub fn legacy_client_config() -> Arc<ClientConfig> {
    let mut roots = RootCertStore::empty();
    roots.extend(TLS_SERVER_ROOTS.iter().cloned());

    let mut config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Arc::new(config)
}

/// Client-facing server config presenting the minted leaf certificate.
pub fn leaf_server_config(cert_pem: &str, key_pem: &str) -> Result<Arc<ServerConfig>> {
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut cert_pem.as_bytes())
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| ProxyError::tls(format!("invalid leaf certificate PEM: {e}")))?;
    let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut key_pem.as_bytes())
        .map_err(|e| ProxyError::tls(format!("invalid leaf key PEM: {e}")))?
        .ok_or_else(|| ProxyError::tls("no private key in leaf PEM"))?;

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ProxyError::tls(format!("leaf server config: {e}")))?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(Arc::new(config))
}

/// Parse a hostname into a `ServerName` for SNI.
pub fn server_name(host: &str) -> Result<ServerName<'static>> {
    ServerName::try_from(host.to_owned())
        .map_err(|e| ProxyError::tls(format!("invalid server name {host:?}: {e}")))
}

/// Accepts any presented chain. Trust on this path comes from the byte-level
/// pin comparison performed after the handshake, not from PKI.
#[derive(Debug)]
struct DeferredVerifier;

impl ServerCertVerifier for DeferredVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_name_parsing() {
        assert!(server_name("example.com").is_ok());
        assert!(server_name("").is_err());
    }

    #[test]
    fn test_leaf_server_config_from_rcgen_pem() {
        let cert = rcgen::Certificate::from_params(rcgen::CertificateParams::new(vec![
            "leaf.example".to_string(),
        ]))
        .unwrap();
        let config = leaf_server_config(
            &cert.serialize_pem().unwrap(),
            &cert.serialize_private_key_pem(),
        );
        assert!(config.is_ok());
    }

    #[test]
    fn test_leaf_server_config_rejects_garbage() {
        assert!(leaf_server_config("not pem", "not pem").is_err());
    }

    #[test]
    fn test_client_configs_force_http1() {
        assert_eq!(
            pinned_client_config().alpn_protocols,
            vec![b"http/1.1".to_vec()]
        );
        assert_eq!(
            legacy_client_config().alpn_protocols,
            vec![b"http/1.1".to_vec()]
        );
    }
}
