use anyhow::{Context, Result};
use std::env;

/// Runtime configuration, loaded from the environment.
///
/// `auto_scrape` is recognized but currently inert: auto-registering
/// legacy-resolved domains into the registry is not implemented. Enabling it
/// logs a warning at startup and nothing else.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,

    /// Fall back to standard DNS + CA validation when the registry misses.
    pub legacy_fallback: bool,
    /// Reserved. See above.
    pub auto_scrape: bool,
    /// Emit a one-line summary per request/tunnel.
    pub log_requests: bool,

    pub registry_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let host = env::var("SIIP_PROXY_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("SIIP_PROXY_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .context("Invalid SIIP_PROXY_PORT")?;

        let legacy_fallback = parse_bool("SIIP_LEGACY_FALLBACK", false)?;
        let auto_scrape = parse_bool("SIIP_AUTO_SCRAPE", false)?;
        let log_requests = parse_bool("SIIP_LOG_REQUESTS", true)?;

        let registry_timeout_secs = env::var("SIIP_REGISTRY_TIMEOUT_SECS")
            .unwrap_or_else(|_| "15".to_string())
            .parse()
            .context("Invalid SIIP_REGISTRY_TIMEOUT_SECS")?;

        Ok(Self {
            host,
            port,
            legacy_fallback,
            auto_scrape,
            log_requests,
            registry_timeout_secs,
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            legacy_fallback: false,
            auto_scrape: false,
            log_requests: true,
            registry_timeout_secs: 15,
        }
    }
}

fn parse_bool(var: &str, default: bool) -> Result<bool> {
    match env::var(var) {
        Ok(value) => match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(anyhow::anyhow!("Invalid {var}: {other:?}")),
        },
        Err(_) => Ok(default),
    }
}
