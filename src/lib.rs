//! SIIP Proxy - Intercepting HTTP/HTTPS proxy over a decentralized registry
//!
//! An HTTP/HTTPS forward proxy that resolves domains and TLS trust through
//! the SIIP naming registry instead of DNS and certificate authorities. The
//! registry maps each domain to an IP address and a pinned public key; the
//! proxy validates upstream certificates byte-for-byte against that pin and
//! re-terminates TLS toward the browser with a short-lived minted leaf.
//!
//! ## Paths through the proxy
//!
//! - **Tunnel path** (`CONNECT`): terminate TLS on both sides and relay
//!   decrypted bytes between them
//! - **Plain-forward path** (everything else): rewrite the request, perform
//!   one upstream exchange, return one response
//!
//! Domains missing from the registry optionally fall back to standard
//! DNS + CA-chain validation (legacy fallback).
//!
//! ## Architecture
//!
//! - `http1` - HTTP/1.x wire codec over rewindable streams
//! - `siip` - registry, cache, and resolver with pin records
//! - `tls` - client/server TLS configurations
//! - `issuer` - short-lived MITM leaf certificate minting
//! - `upstream` - pin-verified outbound connections
//! - `server` - accept loop and the per-connection handler

pub mod config;
pub mod error;
pub mod http1;
pub mod issuer;
pub mod pages;
pub mod server;
pub mod siip;
pub mod tls;
pub mod upstream;

pub use config::Config;
pub use error::{ProxyError, Result};
pub use server::ProxyServer;
