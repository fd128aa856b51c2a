//! CLI binary running the vehicle command proxy against a simulated fleet.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vcmd_http_proxy::{HttpProxyServer, LockWaitBudget, Proxy, ProxyConfig};
use vcmd_session_cache::SessionCache;
use vcmd_vehicle_mock::MockFleet;

/// CLI-specific error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Proxy library error
    #[error(transparent)]
    Proxy(#[from] vcmd_http_proxy::Error),

    /// Session cache error
    #[error(transparent)]
    SessionCache(#[from] vcmd_session_cache::Error),

    /// Signal handler setup failed
    #[error("{0}: {1}")]
    Io(&'static str, #[source] std::io::Error),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Budget {
    /// Lock waiting counts against the request timeout
    Shared,

    /// The vehicle exchange gets a full timeout once the lock is held
    Additional,
}

impl From<Budget> for LockWaitBudget {
    fn from(budget: Budget) -> Self {
        match budget {
            Budget::Shared => Self::Shared,
            Budget::Additional => Self::Additional,
        }
    }
}

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Session cache file, loaded at startup and written on shutdown
    #[arg(long, env = "VCMD_CACHE_FILE")]
    cache_file: Option<PathBuf>,

    /// Maximum number of vehicles with cached sessions
    #[arg(long, default_value_t = 10_000, env = "VCMD_CACHE_SIZE")]
    cache_size: usize,

    /// Cloud REST API host requests are relayed to
    #[arg(
        long,
        default_value = "fleet-api.prd.na.vn.cloud.tesla.com",
        env = "VCMD_FLEET_HOST"
    )]
    fleet_host: String,

    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1", env = "VCMD_HOST")]
    host: IpAddr,

    /// How time queued behind another command counts against the timeout
    #[arg(long, value_enum, default_value_t = Budget::Shared, env = "VCMD_LOCK_WAIT_BUDGET")]
    lock_wait_budget: Budget,

    /// Largest accepted command body
    #[arg(long, default_value_t = 512, env = "VCMD_MAX_BODY_BYTES")]
    max_body_bytes: usize,

    /// Largest body read from any request, relayed ones included
    #[arg(long, default_value_t = 2 * 1024 * 1024, env = "VCMD_MAX_RELAY_BODY_BYTES")]
    max_relay_body_bytes: usize,

    /// Port to listen on
    #[arg(long, default_value_t = 4443, env = "VCMD_PORT")]
    port: u16,

    /// Scheme used to reach the cloud REST API
    #[arg(long, default_value = "https", env = "VCMD_RELAY_SCHEME")]
    relay_scheme: String,

    /// Per-request timeout in milliseconds
    #[arg(long, default_value_t = 10_000, env = "VCMD_TIMEOUT_MS")]
    timeout_ms: u64,
}

impl Args {
    fn proxy_config(&self) -> ProxyConfig {
        ProxyConfig {
            lock_wait_budget: self.lock_wait_budget.into(),
            max_body_bytes: self.max_body_bytes,
            max_relay_body_bytes: self.max_relay_body_bytes,
            relay_scheme: self.relay_scheme.clone(),
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

/// Loads the persisted cache, starting empty when there is none or it cannot
/// be read.
async fn load_sessions(path: Option<&Path>, capacity: usize) -> Result<SessionCache, Error> {
    let Some(path) = path else {
        return Ok(SessionCache::new(capacity)?);
    };

    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        info!(path = %path.display(), "no session cache file yet");
        return Ok(SessionCache::new(capacity)?);
    }

    match SessionCache::import_from_file(path, capacity).await {
        Ok(sessions) => {
            info!(
                path = %path.display(),
                vehicles = sessions.len(),
                capacity,
                "loaded session cache"
            );
            Ok(sessions)
        }
        Err(e) => {
            warn!(path = %path.display(), "starting with an empty session cache: {}", e);
            Ok(SessionCache::new(capacity)?)
        }
    }
}

async fn wait_for_signal() -> Result<(), Error> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())
            .map_err(|e| Error::Io("SIGTERM handler failed", e))?;
        let mut sigint = signal(SignalKind::interrupt())
            .map_err(|e| Error::Io("SIGINT handler failed", e))?;

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .map_err(|e| Error::Io("interrupt handler failed", e))?;
        info!("Received interrupt signal");
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let sessions = Arc::new(load_sessions(args.cache_file.as_deref(), args.cache_size).await?);
    let fleet = MockFleet::new(args.fleet_host.clone());
    let proxy = Proxy::new(fleet, sessions.clone(), args.proxy_config())?;

    let server = HttpProxyServer::new(SocketAddr::new(args.host, args.port), proxy);
    server.start().await?;

    let shutdown_token = CancellationToken::new();
    let signal_shutdown_token = shutdown_token.clone();
    let signals = tokio::spawn(async move {
        let result = wait_for_signal().await;
        info!("Shutting down");
        signal_shutdown_token.cancel();
        result
    });

    shutdown_token.cancelled().await;
    server.shutdown().await;

    if let Some(path) = &args.cache_file {
        sessions.export_to_file(path).await?;
        info!(path = %path.display(), vehicles = sessions.len(), "saved session cache");
    }

    match signals.await {
        Ok(result) => result,
        Err(e) => {
            warn!("signal task failed: {}", e);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::CommandFactory;

    #[test]
    fn test_args() {
        Args::command().debug_assert();

        let args = Args::try_parse_from([
            "vcmd-proxy",
            "--port",
            "8443",
            "--lock-wait-budget",
            "additional",
            "--timeout-ms",
            "2500",
        ])
        .unwrap();

        let config = args.proxy_config();
        assert_eq!(args.port, 8443);
        assert_eq!(config.lock_wait_budget, LockWaitBudget::Additional);
        assert_eq!(config.timeout, Duration::from_millis(2500));
        assert_eq!(config.max_body_bytes, 512);
        assert_eq!(config.body_read_limit(), 2 * 1024 * 1024);
    }

    #[tokio::test]
    async fn test_load_sessions_falls_back_to_empty() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("missing.cbor");
        let sessions = load_sessions(Some(&missing), 4).await.unwrap();
        assert!(sessions.is_empty());
        assert_eq!(sessions.capacity(), 4);

        let corrupt = dir.path().join("corrupt.cbor");
        tokio::fs::write(&corrupt, b"not a session cache").await.unwrap();
        let sessions = load_sessions(Some(&corrupt), 4).await.unwrap();
        assert!(sessions.is_empty());
    }

    fn record(counter: u32) -> vcmd_session_cache::SessionRecord {
        vcmd_session_cache::SessionRecord::new(
            &b"secret"[..],
            &b"epoch"[..],
            counter,
            chrono::Utc::now() + chrono::Duration::hours(1),
        )
    }

    #[tokio::test]
    async fn test_load_sessions_restores_saved_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.cbor");

        let saved = SessionCache::new(4).unwrap();
        saved.put(
            "5YJ3E1EA7PF000001",
            vcmd_session_cache::Domain::Infotainment,
            record(7),
        );
        saved.export_to_file(&path).await.unwrap();

        let sessions = load_sessions(Some(&path), 4).await.unwrap();
        assert!(sessions.contains_vehicle("5YJ3E1EA7PF000001"));
    }

    #[tokio::test]
    async fn test_load_sessions_uses_configured_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.cbor");

        let saved = SessionCache::new(8).unwrap();
        for n in 1..=3u32 {
            saved.put(
                format!("5YJ3E1EA7PF00000{n}"),
                vcmd_session_cache::Domain::VehicleSecurity,
                record(n),
            );
        }
        saved.export_to_file(&path).await.unwrap();

        let sessions = load_sessions(Some(&path), 2).await.unwrap();
        assert_eq!(sessions.capacity(), 2);
        assert_eq!(
            sessions.vehicle_ids(),
            vec![
                "5YJ3E1EA7PF000003".to_string(),
                "5YJ3E1EA7PF000002".to_string()
            ]
        );

        let sessions = load_sessions(Some(&path), 16).await.unwrap();
        assert_eq!(sessions.capacity(), 16);
        assert_eq!(sessions.len(), 3);
    }
}
