//! MITM leaf certificate issuance
//!
//! For each intercepted CONNECT the proxy presents the client a short-lived
//! leaf certificate for the target domain. Issuance is a collaborator behind
//! the [`LeafIssuer`] trait; [`EphemeralIssuer`] mints in-process rcgen
//! certificates. Issuers that write temporary key material to disk attach a
//! cleanup to the credential, which runs on drop, on every exit path of the
//! tunnel setup, handshake failures included.

use rcgen::{Certificate, CertificateParams, DnType};
use rand::Rng;
use tracing::debug;

use crate::error::{ProxyError, Result};

/// A minted leaf certificate and key, PEM-encoded.
///
/// Holds an optional cleanup that releases whatever temporary material the
/// issuer created; it runs exactly once, when the credential is dropped.
pub struct LeafCredential {
    pub cert_pem: String,
    pub key_pem: String,
    cleanup: Option<Box<dyn FnOnce() + Send>>,
}

impl LeafCredential {
    pub fn new(cert_pem: String, key_pem: String) -> Self {
        Self {
            cert_pem,
            key_pem,
            cleanup: None,
        }
    }

    pub fn with_cleanup(mut self, cleanup: impl FnOnce() + Send + 'static) -> Self {
        self.cleanup = Some(Box::new(cleanup));
        self
    }
}

impl Drop for LeafCredential {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

impl std::fmt::Debug for LeafCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeafCredential").finish_non_exhaustive()
    }
}

/// Mints a leaf certificate for a domain being intercepted.
///
/// `peer_cert_der` is the certificate the upstream presented; issuers may
/// clone metadata from it when constructing the leaf.
#[async_trait::async_trait]
pub trait LeafIssuer: Send + Sync {
    async fn issue(&self, peer_cert_der: &[u8], domain: &str) -> Result<LeafCredential>;
}

/// In-process issuer generating self-signed ECDSA P-256 leaves valid for a
/// couple of minutes. No temporary files, so no cleanup to attach.
pub struct EphemeralIssuer {
    validity: time::Duration,
}

impl EphemeralIssuer {
    pub fn new() -> Self {
        Self {
            validity: time::Duration::seconds(120),
        }
    }

    pub fn with_validity(mut self, validity: time::Duration) -> Self {
        self.validity = validity;
        self
    }

    fn unique_serial() -> u64 {
        let random_part: u32 = rand::thread_rng().gen();
        let timestamp_part = time::OffsetDateTime::now_utc().unix_timestamp() as u32;
        ((timestamp_part as u64) << 32) | (random_part as u64)
    }
}

impl Default for EphemeralIssuer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LeafIssuer for EphemeralIssuer {
    async fn issue(&self, _peer_cert_der: &[u8], domain: &str) -> Result<LeafCredential> {
        let mut params = CertificateParams::new(vec![domain.to_string()]);
        params
            .distinguished_name
            .push(DnType::CommonName, domain.to_string());
        params.alg = &rcgen::PKCS_ECDSA_P256_SHA256;

        let now = time::OffsetDateTime::now_utc();
        params.not_before = now - time::Duration::seconds(30);
        params.not_after = now + self.validity;
        params.serial_number = Some(Self::unique_serial().into());

        let cert = Certificate::from_params(params)
            .map_err(|e| ProxyError::tls(format!("leaf generation for {domain}: {e}")))?;

        let cert_pem = cert
            .serialize_pem()
            .map_err(|e| ProxyError::tls(format!("leaf serialization for {domain}: {e}")))?;
        let key_pem = cert.serialize_private_key_pem();

        debug!(domain = %domain, "Minted ephemeral leaf certificate");
        Ok(LeafCredential::new(cert_pem, key_pem))
    }
}
