//! Portfolio Alerts Binary
//!
//! Starts the price poller, the WebSocket alert gateway and the health server.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin portfolio-alerts
//! ```
//!
//! # Environment Variables
//!
//! ## Optional
//! - `ALPHA_VANTAGE_API_KEY`: Quote provider key (default: demo)
//! - `ALPHA_VANTAGE_BASE_URL`: Provider base URL (default: <https://www.alphavantage.co>)
//! - `PRICE_POLL_INTERVAL_SECS`: Poll interval (default: 60)
//! - `PRICE_ALERT_THRESHOLD_PCT`: Alert threshold in percent (default: 0.1)
//! - `PRICE_POLL_MAX_CONCURRENCY`: Concurrent quote fetches (default: 5)
//! - `QUOTE_FETCH_TIMEOUT_SECS`: Per-quote timeout (default: 10)
//! - `PORTFOLIO_STORE_TIMEOUT_SECS`: Per portfolio-store call timeout (default: 5)
//! - `PORTFOLIO_SEED_PATH`: JSON holdings seed file
//! - `PORT`: WebSocket gateway port (default: 5000)
//! - `ALERTS_HEALTH_PORT`: Health check HTTP port (default: 8082)
//! - `OUTBOUND_BUFFER`: Per-connection outbound queue (default: 32)
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: portfolio-alerts)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use portfolio_alerts::infrastructure::health::ServiceStatus;
use portfolio_alerts::infrastructure::{metrics, telemetry};
use portfolio_alerts::{
    AlertServiceConfig, AlphaVantageQuoteSource, ClientRegistry, GatewayServer, GatewayState,
    HealthServer, HealthServerState, InMemoryPortfolioStore, PricePoller, WebSocketAlertDelivery,
    init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    // Initialize telemetry (tracing + optional OpenTelemetry)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting portfolio alert service");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics().context("failed to install Prometheus recorder")?;

    let config = AlertServiceConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let store = Arc::new(match &config.portfolio_seed_path {
        Some(path) => InMemoryPortfolioStore::from_seed_file(path)?,
        None => {
            tracing::warn!("PORTFOLIO_SEED_PATH not set, starting with no holdings");
            InMemoryPortfolioStore::new()
        }
    });

    let quotes = Arc::new(AlphaVantageQuoteSource::new(
        config.credentials.clone(),
        &config.quote_source,
    )?);

    let registry = Arc::new(ClientRegistry::new());

    let poller = Arc::new(
        PricePoller::new(
            config.poller.poller_config(),
            quotes,
            store,
            Arc::new(WebSocketAlertDelivery),
            Arc::clone(&registry),
        )
        .with_report_hook(metrics::record_cycle),
    );

    // Initialize health server
    let status: Arc<dyn ServiceStatus> = Arc::clone(&poller) as Arc<dyn ServiceStatus>;
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        status,
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );

    // Initialize WebSocket gateway
    let gateway_state = Arc::new(GatewayState::new(
        Arc::clone(&registry),
        config.server.outbound_buffer,
        shutdown_token.clone(),
    ));
    let gateway = GatewayServer::new(config.server.gateway_port, gateway_state);

    // Spawn health server
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    // Spawn gateway (bind failure stops the service)
    let gateway_shutdown = shutdown_token.clone();
    tokio::spawn(async move {
        if let Err(e) = gateway.run().await {
            tracing::error!(error = %e, "Alert gateway error");
            gateway_shutdown.cancel();
        }
    });

    // Spawn price poller
    let poller_task = tokio::spawn(Arc::clone(&poller).run(shutdown_token.clone()));

    tracing::info!("Portfolio alert service ready");

    await_shutdown(shutdown_token).await;

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, poller_task).await.is_err() {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Price poller did not stop in time"
        );
    }

    tracing::info!("Portfolio alert service stopped");
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Log the parsed configuration.
fn log_config(config: &AlertServiceConfig) {
    tracing::info!(
        interval_secs = config.poller.interval.as_secs(),
        threshold_pct = %config.poller.threshold_pct,
        max_concurrency = config.poller.max_concurrency,
        gateway_port = config.server.gateway_port,
        health_port = config.server.health_port,
        "Configuration loaded"
    );
    tracing::debug!(
        base_url = %config.quote_source.base_url,
        quote_timeout_secs = config.poller.quote_timeout.as_secs(),
        store_timeout_secs = config.poller.store_timeout.as_secs(),
        outbound_buffer = config.server.outbound_buffer,
        "Adapter settings"
    );
    if config.credentials.is_demo() {
        tracing::warn!("ALPHA_VANTAGE_API_KEY not set, using the public demo key");
    }
}

/// Load .env file from any ancestor directory.
fn load_dotenv_from_ancestors() {
    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT) or an internal cancellation.
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
        () = shutdown_token.cancelled() => {
            tracing::warn!("Internal failure, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
