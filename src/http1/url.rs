//! Proxy-form URL parsing
//!
//! Decomposes `[scheme://]host[:port][/path]` into scheme, host, port, and
//! path. No percent-decoding or normalization beyond lower-casing the host.

use crate::error::ProxyError;

/// URL scheme. Only the two the proxy can speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    /// Default port for the scheme.
    pub fn default_port(self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

/// A parsed proxy-form URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpUrl {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl HttpUrl {
    /// Parse `[scheme://]host[:port][/path]`.
    ///
    /// The scheme defaults to `https` when absent (proxy-form target), the
    /// port to 443/80 by scheme, and the path to `/`. The host is lower-cased.
    pub fn parse(input: &str) -> Result<Self, ProxyError> {
        let (scheme, rest) = match input.split_once("://") {
            Some((scheme, rest)) => {
                let scheme = match scheme.to_ascii_lowercase().as_str() {
                    "http" => Scheme::Http,
                    "https" => Scheme::Https,
                    other => {
                        return Err(ProxyError::parse(format!("unsupported scheme: {other}")))
                    }
                };
                (scheme, rest)
            }
            None => (Scheme::Https, input),
        };

        let (authority, path) = match rest.split_once('/') {
            Some((authority, path)) => (authority, format!("/{path}")),
            None => (rest, "/".to_string()),
        };

        let (host, port) = match authority.split_once(':') {
            Some((host, port)) => {
                let port: u16 = port
                    .parse()
                    .map_err(|_| ProxyError::parse(format!("invalid port: {port}")))?;
                (host, port)
            }
            None => (authority, scheme.default_port()),
        };

        if host.is_empty() {
            return Err(ProxyError::parse("empty host in URL"));
        }

        Ok(Self {
            scheme,
            host: host.to_ascii_lowercase(),
            port,
            path,
        })
    }
}

impl std::fmt::Display for HttpUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}://{}:{}{}",
            self.scheme.as_str(),
            self.host,
            self.port,
            self.path
        )
    }
}

/// Parse a CONNECT target of the form `host[:port]`, defaulting to 443.
pub fn parse_connect_target(target: &str) -> Result<(String, u16), ProxyError> {
    let (host, port) = match target.split_once(':') {
        Some((host, port)) => {
            let port: u16 = port
                .parse()
                .map_err(|_| ProxyError::parse(format!("invalid CONNECT port: {port}")))?;
            (host, port)
        }
        None => (target, 443),
    };
    if host.is_empty() {
        return Err(ProxyError::parse("empty host in CONNECT target"));
    }
    Ok((host.to_ascii_lowercase(), port))
}
