//! Certificate record cache
//!
//! The cache is an optimization, not a dependency: every failure is swallowed
//! by the resolver (logged at warn) and resolution proceeds to the registry.
//! The store itself (redis or otherwise) is external; [`MemoryCache`] is the
//! in-process implementation used for development and tests.

use std::collections::HashMap;

use thiserror::Error;
use tokio::sync::RwLock;

/// Cache store failure. Never fatal to resolution.
#[derive(Debug, Error)]
#[error("cache error: {0}")]
pub struct CacheError(pub String);

/// Best-effort string key-value store.
#[async_trait::async_trait]
pub trait CertCache: Send + Sync {
    async fn get(&self, key: &str) -> std::result::Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: &str) -> std::result::Result<(), CacheError>;
}

/// Simple in-memory cache.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CertCache for MemoryCache {
    async fn get(&self, key: &str) -> std::result::Result<Option<String>, CacheError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> std::result::Result<(), CacheError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_set() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get("k").await.unwrap(), None);
        cache.set("k", "v").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some("v".to_string()));
    }
}
