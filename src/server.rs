//! Proxy server
//!
//! Accept loop plus the per-connection handler. Each accepted socket gets its
//! own task; within one connection the handler runs a straight-line state
//! machine with no state revisited: parse the request head, then either the
//! CONNECT tunnel path (MITM both sides, relay decrypted bytes) or the
//! plain-forward path (rewrite headers, one upstream exchange, one response).
//! One request per connection; no keep-alive pipelining.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{ProxyError, Result};
use crate::http1::wire::{self, HttpRequest};
use crate::http1::{parse_connect_target, HeaderMap, HttpUrl, RewindStream};
use crate::issuer::LeafIssuer;
use crate::pages;
use crate::tls;
use crate::upstream::UpstreamClient;

/// Headers meaningful only for one transport leg, stripped before forwarding.
/// Names are in canonical form. Headers named by a `Connection` header are
/// stripped as well.
const HOP_BY_HOP: [&str; 8] = [
    "Keep-Alive",
    "Transfer-Encoding",
    "Te",
    "Connection",
    "Trailer",
    "Upgrade",
    "Proxy-Authorization",
    "Proxy-Authenticate",
];

const RELAY_BUF_SIZE: usize = 16384;

pub struct ProxyServer {
    config: Config,
    upstream: Arc<UpstreamClient>,
    issuer: Arc<dyn LeafIssuer>,
}

impl ProxyServer {
    pub fn new(config: Config, upstream: Arc<UpstreamClient>, issuer: Arc<dyn LeafIssuer>) -> Self {
        Self {
            config,
            upstream,
            issuer,
        }
    }

    /// Bind the configured address and serve until the listener fails.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let listener = TcpListener::bind(self.config.listen_addr()).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already-bound listener. One task per
    /// connection.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        info!(addr = %listener.local_addr()?, legacy_fallback = self.config.legacy_fallback, "SIIP proxy listening");
        if self.config.auto_scrape {
            warn!("auto_scrape is enabled but not implemented; the option is ignored");
        }

        loop {
            let (socket, peer) = listener.accept().await?;
            let server = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(e) = server.handle(socket).await {
                    match e {
                        ProxyError::ConnectionClosed | ProxyError::Io(_) => {
                            debug!(peer = %peer, error = %e, "Connection ended abnormally")
                        }
                        _ => warn!(peer = %peer, error = %e, "Connection failed"),
                    }
                }
            });
        }
    }

    /// Service one client connection to completion.
    pub async fn handle(&self, socket: TcpStream) -> Result<()> {
        let mut client = RewindStream::new(socket);

        let request = match wire::read_request_head(&mut client).await? {
            Some(request) => request,
            None => {
                debug!("Client closed without sending a request");
                return Ok(());
            }
        };

        if request.method == "CONNECT" {
            self.tunnel(client, request).await
        } else {
            self.forward(client, request).await
        }
    }

    /// Plain-forward path: one rewritten request upstream, one response back.
    async fn forward(
        &self,
        mut client: RewindStream<TcpStream>,
        mut request: HttpRequest,
    ) -> Result<()> {
        wire::read_request_body(&mut client, &mut request).await?;
        let url = HttpUrl::parse(&request.target)?;

        let mut outbound = request.clone();
        outbound.target = url.path.clone();
        outbound.headers = forwarded_headers(&request, &url.host);

        let mut response = match self.upstream.exchange(&url, &outbound).await {
            Ok(response) => response,
            Err(ProxyError::ResolutionMiss { domain }) => {
                debug!(domain = %domain, "Resolution miss, responding 404");
                pages::not_found(&domain, self.config.legacy_fallback)
            }
            Err(e @ ProxyError::PinMismatch { .. }) => {
                warn!(domain = %url.host, error = %e, "Refusing upstream with mismatched pin");
                pages::pin_mismatch(&url.host, &e.to_string())
            }
            Err(ProxyError::LegacyHandshake { domain, reason }) => {
                warn!(domain = %domain, reason = %reason, "Legacy TLS handshake failed");
                pages::legacy_tls_failure(&domain, &reason)
            }
            Err(e) => return Err(e),
        };

        response.headers.remove("Transfer-Encoding");
        response
            .headers
            .insert("Content-Length", response.body_len().to_string());
        wire::write_response(&mut client, &response).await?;

        if self.config.log_requests {
            info!(
                "{:<32}{} {} [{} bytes]",
                format!("{} {}", request.method, request.target),
                response.status,
                response.reason,
                response.body_len()
            );
        }
        Ok(())
    }

    /// Tunnel path: verify the upstream, MITM the client, relay bytes.
    async fn tunnel(&self, mut client: RewindStream<TcpStream>, request: HttpRequest) -> Result<()> {
        let (host, port) = parse_connect_target(&request.target)?;

        let (_record, upstream) = match self.upstream.connect_tls(&host, port).await {
            Ok(established) => established,
            Err(ProxyError::ResolutionMiss { domain }) => {
                debug!(domain = %domain, "Resolution miss, responding 404");
                let page = pages::not_found(&domain, self.config.legacy_fallback);
                wire::write_response(&mut client, &page).await?;
                return Ok(());
            }
            Err(e @ ProxyError::PinMismatch { .. }) => {
                warn!(domain = %host, error = %e, "Refusing tunnel with mismatched pin");
                let page = pages::pin_mismatch(&host, &e.to_string());
                wire::write_response(&mut client, &page).await?;
                return Ok(());
            }
            Err(ProxyError::LegacyHandshake { domain, reason }) => {
                warn!(domain = %domain, reason = %reason, "Legacy TLS handshake failed");
                let page = pages::legacy_tls_failure(&domain, &reason);
                wire::write_response(&mut client, &page).await?;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        client
            .write_all(b"HTTP/1.1 200 Connection established\r\n\r\n")
            .await?;

        // Credential cleanup runs on drop, on every exit path below
        let credential = self.issuer.issue(&upstream.peer_cert_der, &host).await?;
        let leaf_config = tls::leaf_server_config(&credential.cert_pem, &credential.key_pem)?;
        let acceptor = TlsAcceptor::from(leaf_config);
        let client_tls = acceptor
            .accept(client)
            .await
            .map_err(|e| ProxyError::tls(format!("client-side handshake for {host}: {e}")))?;

        self.relay(client_tls, upstream.stream, &host).await
    }

    /// Bidirectional byte relay, one task multiplexing both directions.
    /// Either side closing (or erroring) ends the relay and closes the other
    /// side. The first line seen in each direction feeds the summary log.
    async fn relay<C, U>(&self, client: C, upstream: U, domain: &str) -> Result<()>
    where
        C: AsyncRead + AsyncWrite,
        U: AsyncRead + AsyncWrite,
    {
        let (mut client_read, mut client_write) = tokio::io::split(client);
        let (mut upstream_read, mut upstream_write) = tokio::io::split(upstream);

        let mut client_buf = vec![0u8; RELAY_BUF_SIZE];
        let mut upstream_buf = vec![0u8; RELAY_BUF_SIZE];
        let mut bytes_out = 0u64;
        let mut bytes_in = 0u64;
        let mut first_request_line: Option<String> = None;
        let mut first_response_line: Option<String> = None;

        loop {
            tokio::select! {
                result = client_read.read(&mut client_buf) => {
                    match result {
                        Ok(0) => {
                            debug!(domain = %domain, "Client closed tunnel");
                            break;
                        }
                        Ok(n) => {
                            if self.config.log_requests && first_request_line.is_none() {
                                first_request_line = Some(first_line(&client_buf[..n]));
                            }
                            upstream_write.write_all(&client_buf[..n]).await?;
                            bytes_out += n as u64;
                        }
                        Err(e) => {
                            debug!(domain = %domain, error = %e, "Client read error in tunnel");
                            break;
                        }
                    }
                }
                result = upstream_read.read(&mut upstream_buf) => {
                    match result {
                        Ok(0) => {
                            debug!(domain = %domain, "Upstream closed tunnel");
                            break;
                        }
                        Ok(n) => {
                            if self.config.log_requests && first_response_line.is_none() {
                                first_response_line = Some(first_line(&upstream_buf[..n]));
                            }
                            client_write.write_all(&upstream_buf[..n]).await?;
                            bytes_in += n as u64;
                        }
                        Err(e) => {
                            debug!(domain = %domain, error = %e, "Upstream read error in tunnel");
                            break;
                        }
                    }
                }
            }
        }

        let _ = client_write.shutdown().await;
        let _ = upstream_write.shutdown().await;

        if self.config.log_requests {
            info!(
                "{:<32}{} [{} bytes out, {} bytes in]",
                first_request_line.unwrap_or_else(|| format!("CONNECT {domain}")),
                first_response_line.unwrap_or_default(),
                bytes_out,
                bytes_in
            );
        }
        Ok(())
    }
}

/// Build the header set forwarded upstream: `Host` pinned to the parsed
/// target, `Content-Length` recomputed when a body is present, hop-by-hop
/// headers stripped.
fn forwarded_headers(request: &HttpRequest, host: &str) -> HeaderMap {
    let mut headers = request.headers.clone();
    headers.insert("Host", host);
    if let Some(body) = &request.body {
        headers.insert("Content-Length", body.len().to_string());
    }

    if let Some(connection) = headers.get("Connection").map(str::to_string) {
        for name in connection.split(',') {
            headers.remove(name.trim());
        }
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
    headers
}

fn first_line(data: &[u8]) -> String {
    let line = data
        .split(|b| *b == b'\r' || *b == b'\n')
        .next()
        .unwrap_or(data);
    String::from_utf8_lossy(&line[..line.len().min(96)]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn request_with_headers(pairs: &[(&str, &str)], body: Option<&[u8]>) -> HttpRequest {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.append(name, value);
        }
        HttpRequest {
            method: "GET".to_string(),
            target: "http://example.com/".to_string(),
            version: "HTTP/1.1".to_string(),
            headers,
            body: body.map(Bytes::copy_from_slice),
        }
    }

    #[test]
    fn test_forwarded_headers_strip_hop_by_hop() {
        let request = request_with_headers(
            &[
                ("Host", "stale.example"),
                ("Proxy-Authorization", "Basic xyz"),
                ("Transfer-Encoding", "chunked"),
                ("TE", "trailers"),
                ("Accept", "*/*"),
            ],
            None,
        );
        let headers = forwarded_headers(&request, "example.com");

        assert_eq!(headers.get("Host"), Some("example.com"));
        assert_eq!(headers.get("Accept"), Some("*/*"));
        assert!(!headers.contains("Proxy-Authorization"));
        assert!(!headers.contains("Transfer-Encoding"));
        assert!(!headers.contains("TE"));
    }

    #[test]
    fn test_connection_named_headers_stripped() {
        let request = request_with_headers(
            &[
                ("Connection", "close, x-custom"),
                ("X-Custom", "drop me"),
                ("X-Keep", "keep me"),
            ],
            None,
        );
        let headers = forwarded_headers(&request, "example.com");

        assert!(!headers.contains("Connection"));
        assert!(!headers.contains("X-Custom"));
        assert_eq!(headers.get("X-Keep"), Some("keep me"));
    }

    #[test]
    fn test_content_length_recomputed_from_body() {
        let request =
            request_with_headers(&[("Content-Length", "999")], Some(b"hello".as_slice()));
        let headers = forwarded_headers(&request, "example.com");
        assert_eq!(headers.get("Content-Length"), Some("5"));
    }

    #[test]
    fn test_first_line() {
        assert_eq!(
            first_line(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n"),
            "GET / HTTP/1.1"
        );
        assert_eq!(first_line(b"no newline"), "no newline");
    }
}
