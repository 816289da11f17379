//! Proxy error types

use thiserror::Error;

/// Result type for proxy operations
pub type Result<T> = std::result::Result<T, ProxyError>;

/// Errors produced while servicing a single proxied connection.
///
/// Every variant is scoped to the connection that produced it; there is no
/// cross-connection error state. "Peer closed before sending anything" is not
/// an error at all; head parsing returns `Ok(None)` for that case.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Malformed start line or header line
    #[error("malformed HTTP message: {0}")]
    Parse(String),

    /// Peer closed mid-message with a declared length/encoding obligation unmet
    #[error("connection closed unexpectedly")]
    ConnectionClosed,

    /// Domain not found in cache, registry, or (if enabled) DNS
    #[error("domain {domain} could not be resolved")]
    ResolutionMiss { domain: String },

    /// Presented certificate's public key does not match the registry pin
    #[error("certificate for {domain} does not match the pinned SIIP key (presented {presented})")]
    PinMismatch { domain: String, presented: String },

    /// Standard CA validation failed on a legacy-resolved domain
    #[error("TLS handshake with {domain} failed: {reason}")]
    LegacyHandshake { domain: String, reason: String },

    /// Registry lookup exceeded the configured deadline
    #[error("SIIP registry lookup for {domain} timed out")]
    RegistryTimeout { domain: String },

    /// TLS configuration or handshake failure outside the legacy path
    #[error("TLS error: {0}")]
    Tls(String),

    /// Registry or cache record that cannot be decoded
    #[error("invalid certificate record: {0}")]
    InvalidRecord(String),

    /// Socket/transport error outside a parse boundary
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProxyError {
    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create a TLS error
    pub fn tls(msg: impl Into<String>) -> Self {
        Self::Tls(msg.into())
    }

    /// Create an invalid-record error
    pub fn invalid_record(msg: impl Into<String>) -> Self {
        Self::InvalidRecord(msg.into())
    }
}
