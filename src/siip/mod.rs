//! SIIP naming and trust layer
//!
//! Resolution of domains to registry-pinned (IP, public key) records, the
//! cache in front of the registry, and pin verification against presented
//! certificates.

pub mod cache;
pub mod record;
pub mod registry;
pub mod resolver;

pub use cache::{CacheError, CertCache, MemoryCache};
pub use record::{decode_key_hex, CertificateRecord};
pub use registry::{Registry, RegistryRecord, StaticRegistry, SubmitResult};
pub use resolver::Resolver;
