use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use siip_proxy::issuer::EphemeralIssuer;
use siip_proxy::siip::{MemoryCache, Resolver, StaticRegistry};
use siip_proxy::upstream::UpstreamClient;
use siip_proxy::{Config, ProxyServer};

/// Intercepting HTTP/HTTPS proxy resolving domains through the SIIP registry.
#[derive(Parser, Debug)]
#[command(name = "siip-proxy", version)]
struct Args {
    /// Listen address
    #[arg(long)]
    host: Option<String>,

    /// Listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Fall back to standard DNS + CA validation when the registry misses
    #[arg(long)]
    legacy_fallback: bool,

    /// Reserved: auto-register legacy-resolved domains (not implemented)
    #[arg(long)]
    auto_scrape: bool,

    /// Suppress the one-line-per-request summary log
    #[arg(long)]
    quiet: bool,

    /// Registry lookup deadline in seconds
    #[arg(long)]
    registry_timeout_secs: Option<u64>,

    /// JSON file of registry records to seed the in-memory registry
    #[arg(long)]
    registry_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args = Args::parse();
    let mut config = Config::from_env()?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(secs) = args.registry_timeout_secs {
        config.registry_timeout_secs = secs;
    }
    config.legacy_fallback |= args.legacy_fallback;
    config.auto_scrape |= args.auto_scrape;
    if args.quiet {
        config.log_requests = false;
    }

    let registry = match &args.registry_file {
        Some(path) => {
            let seed = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read registry file {}", path.display()))?;
            StaticRegistry::from_json(&seed).context("Failed to parse registry file")?
        }
        None => StaticRegistry::new(),
    };

    let resolver = Resolver::new(Arc::new(registry), Arc::new(MemoryCache::new()))
        .with_legacy_fallback(config.legacy_fallback)
        .with_registry_timeout(Duration::from_secs(config.registry_timeout_secs));

    let server = ProxyServer::new(
        config,
        Arc::new(UpstreamClient::new(Arc::new(resolver))),
        Arc::new(EphemeralIssuer::new()),
    );
    Arc::new(server).run().await?;
    Ok(())
}
