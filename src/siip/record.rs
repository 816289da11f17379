//! SIIP certificate records
//!
//! A record binds a domain to the IP address and TLS public key asserted by
//! the naming registry. The pinned key is the raw SubjectPublicKeyInfo DER,
//! supplied by the registry as a colon-separated hex string.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use x509_parser::prelude::*;

use crate::error::{ProxyError, Result};

/// A resolved (ip, domain, public key) binding. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRecord {
    pub ip: IpAddr,
    pub domain: String,
    /// Raw SPKI DER bytes; empty for legacy records.
    pub public_key: Vec<u8>,
    /// True when this record came from DNS fallback rather than the registry.
    /// Legacy records carry no pin; callers use standard CA validation.
    pub legacy: bool,
}

/// Serialized form used for the external cache.
#[derive(Serialize, Deserialize)]
struct CachedRecord {
    ip: String,
    domain: String,
    key: String,
    legacy: bool,
}

impl CertificateRecord {
    /// Build a pinned record from registry fields. The key may arrive as
    /// colon-separated hex (`30:59:13:...`) or plain hex.
    pub fn pinned(domain: &str, ip: &str, public_key_hex: &str) -> Result<Self> {
        let ip: IpAddr = ip
            .parse()
            .map_err(|_| ProxyError::invalid_record(format!("invalid IP address: {ip:?}")))?;
        Ok(Self {
            ip,
            domain: domain.to_string(),
            public_key: decode_key_hex(public_key_hex)?,
            legacy: false,
        })
    }

    /// Build a legacy record from a DNS fallback resolution. No pinned key;
    /// trust derives from the standard CA chain instead.
    pub fn legacy(domain: &str, ip: IpAddr) -> Self {
        Self {
            ip,
            domain: domain.to_string(),
            public_key: Vec::new(),
            legacy: true,
        }
    }

    /// Compare the presented certificate's SubjectPublicKeyInfo byte-for-byte
    /// against the pinned key. Legacy records carry no pin and always pass.
    pub fn verify(&self, presented_cert_der: &[u8]) -> Result<()> {
        if self.legacy {
            return Ok(());
        }

        let (_, cert) = X509Certificate::from_der(presented_cert_der)
            .map_err(|e| ProxyError::invalid_record(format!("unparseable certificate: {e}")))?;
        let presented = cert.public_key().raw;

        if presented != self.public_key.as_slice() {
            return Err(ProxyError::PinMismatch {
                domain: self.domain.clone(),
                presented: key_display(presented),
            });
        }
        Ok(())
    }

    /// Pinned key as uppercase colon-separated hex.
    pub fn key_display(&self) -> String {
        key_display(&self.public_key)
    }

    /// Encode for the external cache.
    pub fn encode(&self) -> String {
        let cached = CachedRecord {
            ip: self.ip.to_string(),
            domain: self.domain.clone(),
            key: hex::encode(&self.public_key),
            legacy: self.legacy,
        };
        // CachedRecord contains only strings and a bool; serialization cannot fail
        serde_json::to_string(&cached).unwrap_or_default()
    }

    /// Decode a cached record.
    pub fn decode(encoded: &str) -> Result<Self> {
        let cached: CachedRecord = serde_json::from_str(encoded)
            .map_err(|e| ProxyError::invalid_record(format!("bad cache entry: {e}")))?;
        let ip: IpAddr = cached
            .ip
            .parse()
            .map_err(|_| ProxyError::invalid_record(format!("bad cached IP: {:?}", cached.ip)))?;
        Ok(Self {
            ip,
            domain: cached.domain,
            public_key: decode_key_hex(&cached.key)?,
            legacy: cached.legacy,
        })
    }
}

/// Decode a colon-separated or plain hex key string to raw bytes.
pub fn decode_key_hex(input: &str) -> Result<Vec<u8>> {
    let stripped: String = input.chars().filter(|c| *c != ':').collect();
    hex::decode(&stripped)
        .map_err(|_| ProxyError::invalid_record(format!("invalid public key hex: {input:?}")))
}

fn key_display(bytes: &[u8]) -> String {
    hex::encode_upper(bytes)
        .as_bytes()
        .chunks(2)
        .map(|pair| std::str::from_utf8(pair).unwrap_or(""))
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spki_of(cert_der: &[u8]) -> Vec<u8> {
        let (_, cert) = X509Certificate::from_der(cert_der).unwrap();
        cert.public_key().raw.to_vec()
    }

    fn self_signed_der(domain: &str) -> Vec<u8> {
        let cert = rcgen::Certificate::from_params(rcgen::CertificateParams::new(vec![
            domain.to_string()
        ]))
        .unwrap();
        cert.serialize_der().unwrap()
    }

    #[test]
    fn test_decode_colon_hex() {
        assert_eq!(decode_key_hex("30:59:ab").unwrap(), vec![0x30, 0x59, 0xab]);
        assert_eq!(decode_key_hex("3059ab").unwrap(), vec![0x30, 0x59, 0xab]);
        assert!(decode_key_hex("zz").is_err());
    }

    #[test]
    fn test_key_display_round_trips() {
        let record =
            CertificateRecord::pinned("example.com", "10.0.0.1", "de:ad:be:ef").unwrap();
        assert_eq!(record.key_display(), "DE:AD:BE:EF");
    }

    #[test]
    fn test_verify_accepts_matching_key() {
        let der = self_signed_der("pin.example");
        let key_hex = hex::encode(spki_of(&der));
        let record = CertificateRecord::pinned("pin.example", "10.0.0.1", &key_hex).unwrap();
        assert!(record.verify(&der).is_ok());
    }

    #[test]
    fn test_verify_rejects_single_byte_difference() {
        let der = self_signed_der("pin.example");
        let mut key = spki_of(&der);
        *key.last_mut().unwrap() ^= 0x01;
        let record =
            CertificateRecord::pinned("pin.example", "10.0.0.1", &hex::encode(key)).unwrap();
        assert!(matches!(
            record.verify(&der),
            Err(ProxyError::PinMismatch { .. })
        ));
    }

    #[test]
    fn test_verify_rejects_different_certificate() {
        let der_a = self_signed_der("a.example");
        let der_b = self_signed_der("b.example");
        let record =
            CertificateRecord::pinned("a.example", "10.0.0.1", &hex::encode(spki_of(&der_a)))
                .unwrap();
        assert!(record.verify(&der_b).is_err());
    }

    #[test]
    fn test_legacy_record_skips_pin() {
        let record = CertificateRecord::legacy("old.example", "10.0.0.2".parse().unwrap());
        assert!(record.legacy);
        assert!(record.verify(b"not a certificate").is_ok());
    }

    #[test]
    fn test_cache_encode_decode() {
        let record =
            CertificateRecord::pinned("example.com", "192.0.2.10", "de:ad:be:ef").unwrap();
        let decoded = CertificateRecord::decode(&record.encode()).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(CertificateRecord::decode("not json").is_err());
    }
}
