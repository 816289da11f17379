//! Name and certificate resolution
//!
//! Resolution order: external cache, then the naming registry, then (when
//! legacy fallback is enabled) standard DNS. Registry hits are pinned records;
//! DNS hits are legacy records validated through the standard CA chain
//! instead.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::TokioAsyncResolver;

use crate::error::{ProxyError, Result};
use crate::siip::cache::CertCache;
use crate::siip::record::CertificateRecord;
use crate::siip::registry::Registry;

const DEFAULT_REGISTRY_TIMEOUT: Duration = Duration::from_secs(15);

/// Resolves domains to pinned certificate records.
///
/// Registry and cache clients are injected at construction and shared across
/// connections; both must be safe for concurrent use.
pub struct Resolver {
    registry: Arc<dyn Registry>,
    cache: Arc<dyn CertCache>,
    dns: TokioAsyncResolver,
    legacy_fallback: bool,
    registry_timeout: Duration,
}

impl Resolver {
    pub fn new(registry: Arc<dyn Registry>, cache: Arc<dyn CertCache>) -> Self {
        Self {
            registry,
            cache,
            dns: TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default()),
            legacy_fallback: false,
            registry_timeout: DEFAULT_REGISTRY_TIMEOUT,
        }
    }

    /// Allow DNS/CA fallback when the registry has no record for a domain.
    pub fn with_legacy_fallback(mut self, enabled: bool) -> Self {
        self.legacy_fallback = enabled;
        self
    }

    /// Bound registry lookups. An unreachable registry must not hang the
    /// connection forever; lookups time out with a distinct error instead.
    pub fn with_registry_timeout(mut self, registry_timeout: Duration) -> Self {
        self.registry_timeout = registry_timeout;
        self
    }

    pub fn legacy_fallback(&self) -> bool {
        self.legacy_fallback
    }

    /// Resolve a domain: cache, then registry, then optional DNS fallback.
    /// `Ok(None)` means the domain is unknown everywhere it was allowed to
    /// look.
    pub async fn resolve(&self, domain: &str) -> Result<Option<CertificateRecord>> {
        let cache_key = format!("SIIP:{domain}");

        match self.cache.get(&cache_key).await {
            Ok(Some(encoded)) => match CertificateRecord::decode(&encoded) {
                Ok(record) => {
                    debug!(domain = %domain, "Resolved from cache");
                    return Ok(Some(record));
                }
                Err(e) => {
                    warn!(domain = %domain, error = %e, "Discarding undecodable cache entry");
                }
            },
            Ok(None) => {}
            Err(e) => {
                warn!(domain = %domain, error = %e, "Certificate cache unavailable");
            }
        }

        let lookup = timeout(self.registry_timeout, self.registry.lookup(domain))
            .await
            .map_err(|_| ProxyError::RegistryTimeout {
                domain: domain.to_string(),
            })??;

        if let Some(fields) = lookup {
            let record =
                CertificateRecord::pinned(&fields.domain, &fields.ip_addr, &fields.public_key_hex)?;
            debug!(domain = %domain, ip = %record.ip, "Resolved from registry");

            // The cache is an optimization; failures are logged and swallowed
            if let Err(e) = self.cache.set(&cache_key, &record.encode()).await {
                warn!(domain = %domain, error = %e, "Failed to cache certificate record");
            }
            return Ok(Some(record));
        }

        if !self.legacy_fallback {
            return Ok(None);
        }

        match self.dns.lookup_ip(domain).await {
            Ok(response) => match response.iter().next() {
                Some(ip) => {
                    debug!(domain = %domain, ip = %ip, "Resolved via legacy DNS fallback");
                    Ok(Some(CertificateRecord::legacy(domain, ip)))
                }
                None => Ok(None),
            },
            Err(e) => {
                debug!(domain = %domain, error = %e, "Legacy DNS resolution failed");
                Ok(None)
            }
        }
    }
}
