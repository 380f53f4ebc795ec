//! Recon context service
//!
//! Hosts the per-host context registry used by security-analysis workers:
//! - Bounded per-host history (requests, forms, resources, URL notes)
//! - Least-recently-active host eviction
//! - Periodic background cleanup with a final pass on shutdown

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{info, warn};
use validator::Validate;

use context_registry::{ContextRegistry, RegistryConfig};
use telemetry::{init_tracing, metrics, LoggingConfig};

/// Application configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Config {
    #[serde(default)]
    log: LoggingConfig,

    #[serde(default)]
    registry: RegistryConfig,

    /// Seconds between stats log lines, 0 disables the reporter
    #[serde(default = "default_stats_interval_secs")]
    stats_interval_secs: u64,
}

fn default_stats_interval_secs() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log: LoggingConfig::default(),
            registry: RegistryConfig::default(),
            stats_interval_secs: default_stats_interval_secs(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = load_config()?;

    init_tracing(&config.log);

    info!("Starting recon context service v{}", env!("CARGO_PKG_VERSION"));

    config
        .registry
        .validate()
        .context("Invalid registry configuration")?;
    config
        .registry
        .limits
        .check_ceilings()
        .context("Context limits exceed sanity ceilings")?;

    info!(
        max_contexts = config.registry.max_contexts,
        cleanup_interval_secs = config.registry.cleanup_interval_secs,
        limits = ?config.registry.limits,
        "Loaded registry config"
    );

    let registry =
        ContextRegistry::new(&config.registry).context("Failed to create context registry")?;

    let _stats_handle = (config.stats_interval_secs > 0).then(|| {
        start_stats_reporter(
            registry.clone(),
            Duration::from_secs(config.stats_interval_secs),
        )
    });

    shutdown_signal().await;

    info!("Shutting down...");
    registry.shutdown().await;

    let snapshot = metrics().snapshot();
    info!(
        contexts_created = snapshot.contexts_created,
        capacity_evictions = snapshot.capacity_evictions,
        stale_evictions = snapshot.stale_evictions,
        cleanup_sweeps = snapshot.cleanup_sweeps,
        items_cleaned = snapshot.items_cleaned,
        "Shutdown complete"
    );
    Ok(())
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        // Start with defaults
        .add_source(config::Config::try_from(&Config::default())?)
        // Load from config file if exists
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        // Override with environment variables, e.g. RECON__REGISTRY__MAX_CONTEXTS
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("RECON")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    config
        .try_deserialize()
        .context("Failed to deserialize configuration")
}

/// Periodically logs registry totals and the metrics snapshot.
fn start_stats_reporter(
    registry: Arc<ContextRegistry>,
    period: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if registry.is_stopped() {
                break;
            }

            let stats = registry.stats();
            let snapshot = metrics().snapshot();
            info!(
                contexts = stats.total_contexts,
                max_contexts = stats.max_contexts,
                memory_bytes = stats.total_memory_bytes,
                requests = stats.total_requests,
                url_patterns = stats.total_url_patterns,
                forms = stats.total_forms,
                resources = stats.total_resources,
                sweeps = snapshot.cleanup_sweeps,
                evictions = snapshot.capacity_evictions + snapshot.stale_evictions,
                "Registry stats"
            );

            if stats.total_contexts >= stats.max_contexts {
                warn!(max_contexts = stats.max_contexts, "Registry at capacity");
            }
        }
    })
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
