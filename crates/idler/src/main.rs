//! faas-idler - scale-to-zero controller
//!
//! Periodically compares every deployed function against its recent
//! invocation rate and scales idle, opted-in functions down to zero.

use anyhow::{Context, Result};
use clap::Parser;
use idler_lib::{
    api,
    config::is_truthy,
    gateway::build_http_client,
    health::components,
    Credentials, ControllerMetrics, GatewayClient, HealthRegistry, PrometheusClient,
    ReconcilerBuilder, ScaleClient, Settings, StructuredLogger,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const IDLER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Scale idle gateway functions to zero replicas
#[derive(Parser, Debug)]
#[command(name = "faas-idler")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log scaling decisions without sending them to the gateway
    #[arg(long, env = "DRY_RUN")]
    dry_run: bool,
}

fn init_tracing(write_debug: bool) {
    let default_level = if write_debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(fmt::layer().json())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(is_truthy(std::env::var("write_debug").ok().as_deref()));
    info!("Starting faas-idler");

    let settings = Settings::load(cli.dry_run).context("Invalid configuration")?;
    let credentials = Arc::new(Credentials::load(&settings.secret_mount_path));
    let http = build_http_client(settings.http_timeout)?;

    let gateway = GatewayClient::new(http.clone(), settings.gateway_url.clone(), credentials);
    let info = gateway
        .version()
        .await
        .with_context(|| format!("Unable to reach gateway at {}", settings.gateway_url))?;

    let logger = StructuredLogger::new(settings.gateway_url.as_str());
    logger.log_startup(
        IDLER_VERSION,
        &info.version.release,
        &info.version.sha,
        settings.dry_run,
        &settings.inactivity_window(),
    );

    let prometheus = PrometheusClient::new(http, &settings.prometheus_host, settings.prometheus_port)
        .context("Invalid Prometheus address")?;
    info!(url = %prometheus.query_url(), "Metrics backend configured");

    let health_registry = HealthRegistry::new();
    health_registry.register(components::GATEWAY).await;
    health_registry.register(components::METRICS_BACKEND).await;
    health_registry.register(components::RECONCILER).await;
    health_registry.set_ready(true).await;

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        ControllerMetrics::new(),
    ));
    api::spawn_server(settings.api_port, app_state);

    let reconciler = ReconcilerBuilder::new()
        .inventory(Arc::new(gateway.clone()))
        .metrics_source(Arc::new(prometheus))
        .scaler(Arc::new(ScaleClient::new(gateway, settings.dry_run)))
        .interval(settings.reconcile_interval)
        .inactivity_window(settings.inactivity_window())
        .health(health_registry)
        .gateway_label(settings.gateway_url.as_str())
        .build()?;

    reconciler.run_forever().await;

    Ok(())
}
