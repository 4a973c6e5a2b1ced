//! Matchforge orchestrator entry point
//!
//! Startup order matters: the store connection and the Kubernetes client are
//! both load-bearing, so either failing aborts the process and leaves the
//! restart to the supervisor. Everything after that is the loop.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use kube::Client;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use matchforge::config::Config;
use matchforge::metrics::{describe as describe_metrics, LogLineCounter};
use matchforge::orchestrator::{Context, Orchestrator};
use matchforge::store::RedisStore;
use matchforge::submit::KubeJobSubmitter;

/// Matchforge - matchmaking-function orchestrator
#[derive(Parser, Debug)]
#[command(name = "matchforge", version, about, long_about = None)]
struct Cli {
    /// Path to the matchmaker configuration file
    #[arg(
        long,
        env = "MATCHFORGE_CONFIG",
        default_value = "config/matchmaker_config.yaml"
    )]
    config: PathBuf,

    /// Listen address for the Prometheus metrics exporter
    #[arg(long, env = "MATCHFORGE_METRICS_ADDR", default_value = "0.0.0.0:9555")]
    metrics_addr: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Config loads before tracing so the debug flag can pick the default
    // filter; a load failure is reported once logging is up and the
    // defaults carry the process.
    let (config, config_err) = match Config::load(&cli.config) {
        Ok(config) => (config, None),
        Err(err) => (Config::default(), Some(err)),
    };

    let default_filter = if config.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(LogLineCounter)
        .init();

    if let Some(err) = config_err {
        error!(
            error = %err,
            path = %cli.config.display(),
            "Unable to load config file, continuing with defaults"
        );
    }
    if config.debug {
        warn!("Debug logging configured. Not recommended for production!");
    }

    PrometheusBuilder::new()
        .with_http_listener(cli.metrics_addr)
        .install()
        .context("failed to install the Prometheus metrics exporter")?;
    describe_metrics();
    info!(addr = %cli.metrics_addr, "Prometheus metrics exporter listening");

    let redis_url = config.redis_url();
    info!(url = %redis_url, "Attempting to connect to Redis");
    let store = RedisStore::connect(&redis_url)
        .await
        .context("failed to connect to state storage")?;
    info!("Connected to Redis");

    info!("Attempting to acquire Kubernetes credentials");
    let client = Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;
    let submitter = KubeJobSubmitter::from_env(client);
    info!(namespace = %submitter.namespace(), "Kubernetes credentials acquired");

    let ctx = Arc::new(Context::new(Arc::new(store), Arc::new(submitter), config));
    let shutdown = CancellationToken::new();
    let mut orchestrator = Orchestrator::new(ctx, shutdown.clone());

    tokio::select! {
        result = orchestrator.run() => {
            result.context("orchestration loop aborted")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, cancelling in-flight launches");
            shutdown.cancel();
        }
    }

    Ok(())
}
