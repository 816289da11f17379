//! Naming registry interface
//!
//! The SIIP registry is an external service mapping domain -> (IP, public
//! key) records. The proxy consumes it through the [`Registry`] trait so the
//! blockchain client proper can live out-of-process; [`StaticRegistry`] is an
//! in-memory implementation for development and tests.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{ProxyError, Result};

/// Certificate fields as stored in the registry for one domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryRecord {
    pub domain: String,
    pub ip_addr: String,
    /// Colon-separated hex of the raw SubjectPublicKeyInfo DER
    pub public_key_hex: String,
}

/// Outcome of a registration submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitResult {
    Accepted,
    Rejected(String),
}

/// Domain -> certificate-record lookups and signed-transaction submissions.
#[async_trait::async_trait]
pub trait Registry: Send + Sync {
    /// Query the certificate fields for a domain.
    async fn lookup(&self, domain: &str) -> Result<Option<RegistryRecord>>;

    /// Submit a registration for a domain.
    async fn register(
        &self,
        domain: &str,
        display_name: &str,
        ip: &str,
        info_json: &str,
        public_key_hex: &str,
    ) -> Result<SubmitResult>;
}

/// In-memory registry, optionally seeded from a JSON file of
/// [`RegistryRecord`] entries.
#[derive(Debug, Default)]
pub struct StaticRegistry {
    records: RwLock<HashMap<String, RegistryRecord>>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load records from a JSON array of registry records.
    pub fn from_json(json: &str) -> Result<Self> {
        let records: Vec<RegistryRecord> = serde_json::from_str(json)
            .map_err(|e| ProxyError::invalid_record(format!("bad registry seed: {e}")))?;
        let map = records
            .into_iter()
            .map(|r| (r.domain.clone(), r))
            .collect();
        Ok(Self {
            records: RwLock::new(map),
        })
    }

    pub async fn insert(&self, record: RegistryRecord) {
        self.records
            .write()
            .await
            .insert(record.domain.clone(), record);
    }
}

#[async_trait::async_trait]
impl Registry for StaticRegistry {
    async fn lookup(&self, domain: &str) -> Result<Option<RegistryRecord>> {
        Ok(self.records.read().await.get(domain).cloned())
    }

    async fn register(
        &self,
        domain: &str,
        display_name: &str,
        ip: &str,
        _info_json: &str,
        public_key_hex: &str,
    ) -> Result<SubmitResult> {
        debug!(domain = %domain, display_name = %display_name, "Registering domain");
        self.insert(RegistryRecord {
            domain: domain.to_string(),
            ip_addr: ip.to_string(),
            public_key_hex: public_key_hex.to_string(),
        })
        .await;
        Ok(SubmitResult::Accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_miss() {
        let registry = StaticRegistry::new();
        assert_eq!(registry.lookup("absent.example").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_register_then_lookup() {
        let registry = StaticRegistry::new();
        let result = registry
            .register("example.com", "Example", "192.0.2.1", "{}", "de:ad")
            .await
            .unwrap();
        assert_eq!(result, SubmitResult::Accepted);

        let record = registry.lookup("example.com").await.unwrap().unwrap();
        assert_eq!(record.ip_addr, "192.0.2.1");
        assert_eq!(record.public_key_hex, "de:ad");
    }

    #[test]
    fn test_from_json() {
        let seed = r#"[{"domain":"a.example","ip_addr":"10.0.0.1","public_key_hex":"aa:bb"}]"#;
        let registry = StaticRegistry::from_json(seed).unwrap();
        let records = registry.records.into_inner();
        assert!(records.contains_key("a.example"));
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(StaticRegistry::from_json("{oops").is_err());
    }
}
