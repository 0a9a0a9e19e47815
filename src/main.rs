//! Connmon Binary Entry Point
//!
//! This binary runs the complete connectivity monitor: it loads the YAML
//! configuration, schedules one probe per configured host with an
//! independent random start jitter, and exposes the resulting Prometheus
//! metrics over HTTP until shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use connmon::{
    AppConfig, PingMetrics, PingProbe, ScheduleSpec, Scheduler, SpeedtestMetrics, SpeedtestProbe,
    server::{AppState, create_router},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Bounded wait for in-flight probes after the shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Connmon - Connectivity Monitor
#[derive(Parser, Debug)]
#[command(name = "connmon", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "configs/config.yaml",
        env = "CONNMON_CONFIG"
    )]
    config: String,

    /// Server bind address (overrides config file)
    #[arg(long, env = "CONNMON_SERVER_BIND")]
    server_bind: Option<String>,

    /// Server port (overrides config file)
    #[arg(long, env = "CONNMON_SERVER_PORT")]
    server_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,connmon=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Connmon - Connectivity Monitor");

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration from file
    tracing::info!("Loading configuration from: {}", cli.config);
    let mut config = AppConfig::load(&cli.config)?;

    // Apply CLI/env overrides (CLI > ENV > config file), then re-validate
    if let Some(bind) = cli.server_bind {
        config.server.bind = bind;
    }
    if let Some(port) = cli.server_port {
        config.server.port = port;
    }
    config.validate()?;

    tracing::info!(
        "Server: {}:{}, ping hosts: {}, speedtest hosts: {}",
        config.server.bind,
        config.server.port,
        config.ping.hosts.len(),
        config.speedtest.hosts.len(),
    );

    // Build the shared metric registry and per-kind families
    let registry = prometheus::Registry::new();
    let ping_metrics = Arc::new(PingMetrics::register(&registry)?);
    let speedtest_metrics = Arc::new(SpeedtestMetrics::register(&registry)?);

    // Schedule one probe per host, each with its own start jitter
    let mut scheduler = Scheduler::new();

    for host in &config.ping.hosts {
        let spec = ScheduleSpec::every(config.ping.interval)?
            .with_initial_delay(random_jitter(config.ping.max_jitter));
        let probe =
            PingProbe::new(host.clone(), ping_metrics.clone()).with_count(config.ping.count);
        scheduler.schedule(Arc::new(probe), spec);
    }

    for host in &config.speedtest.hosts {
        let spec = ScheduleSpec::every(config.speedtest.interval)?
            .with_initial_delay(random_jitter(config.speedtest.max_jitter));
        let probe = SpeedtestProbe::new(host.clone(), speedtest_metrics.clone())
            .with_timeout(config.speedtest.effective_timeout());
        scheduler.schedule(Arc::new(probe), spec);
    }

    tracing::info!("Scheduled {} probes", scheduler.task_count());

    // Build the exposition router
    let app = create_router(AppState { registry });

    // Parse bind address
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;

    tracing::info!("Metrics exposed on: http://{}/metrics", addr);
    tracing::info!("Press Ctrl+C to shutdown");

    // Start server with graceful shutdown
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(scheduler))
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Uniform random delay in `[0, max]`, independent per call.
fn random_jitter(max: Duration) -> Duration {
    if max.is_zero() {
        Duration::ZERO
    } else {
        max.mul_f64(rand::random::<f64>())
    }
}

/// Setup graceful shutdown signal handler.
async fn shutdown_signal(scheduler: Scheduler) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }

    tracing::info!("Shutting down probes...");
    scheduler.shutdown(SHUTDOWN_GRACE).await;
}
