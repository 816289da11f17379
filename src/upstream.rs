//! Outbound connections to origin servers
//!
//! Both proxy paths reach upstreams through [`UpstreamClient`]: the tunnel
//! path takes a verified TLS stream to relay over, the plain-forward path
//! performs a full request/response exchange. Trust depends on how the domain
//! resolved. Registry records skip CA validation and are pin-checked
//! byte-for-byte after the handshake; legacy records get standard CA
//! validation and no pin.

use std::sync::Arc;

use rustls::ClientConfig;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

use crate::error::{ProxyError, Result};
use crate::http1::url::{HttpUrl, Scheme};
use crate::http1::wire::{self, HttpRequest, HttpResponse};
use crate::http1::RewindStream;
use crate::siip::{CertificateRecord, Resolver};
use crate::tls;

/// An established upstream TLS session, pin-verified or CA-validated
/// according to the record that resolved it.
pub struct UpstreamTls {
    pub stream: TlsStream<TcpStream>,
    /// DER of the certificate the upstream presented.
    pub peer_cert_der: Vec<u8>,
}

/// Shared factory for upstream connections. One instance serves all
/// connections; the TLS configs are built once and cloned per handshake.
pub struct UpstreamClient {
    resolver: Arc<Resolver>,
    pinned_config: Arc<ClientConfig>,
    legacy_config: Arc<ClientConfig>,
}

impl UpstreamClient {
    pub fn new(resolver: Arc<Resolver>) -> Self {
        Self {
            resolver,
            pinned_config: tls::pinned_client_config(),
            legacy_config: tls::legacy_client_config(),
        }
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Resolve a domain, mapping "not found anywhere" to a distinct error so
    /// callers can render the 404 page.
    pub async fn resolve(&self, domain: &str) -> Result<CertificateRecord> {
        self.resolver
            .resolve(domain)
            .await?
            .ok_or_else(|| ProxyError::ResolutionMiss {
                domain: domain.to_string(),
            })
    }

    /// Establish a verified TLS session for the tunnel path.
    pub async fn connect_tls(&self, domain: &str, port: u16) -> Result<(CertificateRecord, UpstreamTls)> {
        let record = self.resolve(domain).await?;
        let tcp = TcpStream::connect((record.ip, port)).await?;
        let session = self.handshake(tcp, &record).await?;
        Ok((record, session))
    }

    /// Plain-forward exchange: one request out, one response back. The
    /// request is sent as given; header rewriting is the caller's business.
    pub async fn exchange(&self, url: &HttpUrl, request: &HttpRequest) -> Result<HttpResponse> {
        let record = self.resolve(&url.host).await?;
        let tcp = TcpStream::connect((record.ip, url.port)).await?;
        debug!(domain = %url.host, ip = %record.ip, port = url.port, "Connected upstream");

        match url.scheme {
            Scheme::Https => {
                let session = self.handshake(tcp, &record).await?;
                let mut stream = RewindStream::new(session.stream);
                wire::write_request(&mut stream, request).await?;
                wire::read_response(&mut stream).await
            }
            Scheme::Http => {
                let mut stream = RewindStream::new(tcp);
                wire::write_request(&mut stream, request).await?;
                wire::read_response(&mut stream).await
            }
        }
    }

    /// Handshake and verify per the record's trust mode.
    async fn handshake(&self, tcp: TcpStream, record: &CertificateRecord) -> Result<UpstreamTls> {
        let name = tls::server_name(&record.domain)?;

        if record.legacy {
            let connector = TlsConnector::from(Arc::clone(&self.legacy_config));
            let stream =
                connector
                    .connect(name, tcp)
                    .await
                    .map_err(|e| ProxyError::LegacyHandshake {
                        domain: record.domain.clone(),
                        reason: e.to_string(),
                    })?;
            let peer_cert_der = peer_certificate(&stream)?;
            debug!(domain = %record.domain, "Legacy CA-validated handshake complete");
            return Ok(UpstreamTls {
                stream,
                peer_cert_der,
            });
        }

        // Pinned path: the verifier accepts anything, so a handshake failure
        // here is a transport problem, not a trust decision
        let connector = TlsConnector::from(Arc::clone(&self.pinned_config));
        let stream = connector.connect(name, tcp).await.map_err(|e| {
            ProxyError::tls(format!(
                "handshake with pinned upstream {} failed: {e}",
                record.domain
            ))
        })?;
        let peer_cert_der = peer_certificate(&stream)?;
        record.verify(&peer_cert_der)?;
        debug!(domain = %record.domain, "Pin-verified handshake complete");

        Ok(UpstreamTls {
            stream,
            peer_cert_der,
        })
    }
}

fn peer_certificate(stream: &TlsStream<TcpStream>) -> Result<Vec<u8>> {
    stream
        .get_ref()
        .1
        .peer_certificates()
        .and_then(|certs| certs.first())
        .map(|cert| cert.as_ref().to_vec())
        .ok_or_else(|| ProxyError::tls("upstream presented no certificate"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::siip::{MemoryCache, StaticRegistry};

    fn client() -> UpstreamClient {
        let resolver = Resolver::new(
            Arc::new(StaticRegistry::new()),
            Arc::new(MemoryCache::new()),
        );
        UpstreamClient::new(Arc::new(resolver))
    }

    #[tokio::test]
    async fn test_resolve_miss_is_distinct() {
        let result = client().resolve("unknown.example").await;
        assert!(matches!(
            result,
            Err(ProxyError::ResolutionMiss { domain }) if domain == "unknown.example"
        ));
    }

    #[tokio::test]
    async fn test_exchange_surfaces_resolution_miss() {
        let url = HttpUrl::parse("https://unknown.example/").unwrap();
        let request = HttpRequest {
            method: "GET".to_string(),
            target: "/".to_string(),
            version: "HTTP/1.1".to_string(),
            headers: Default::default(),
            body: None,
        };
        assert!(matches!(
            client().exchange(&url, &request).await,
            Err(ProxyError::ResolutionMiss { .. })
        ));
    }
}
