//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, poller status reporting, and Prometheus metrics.
//! Used by container orchestrators, load balancers, and monitoring systems.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Kubernetes liveness probe (simple OK)
//! - `GET /readyz` - Kubernetes readiness probe (ready after the first cycle)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{AlertDeliveryPort, PortfolioStorePort, QuoteSourcePort};
use crate::application::services::{CycleReport, PricePoller};
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Status Source
// =============================================================================

/// Live service state the health endpoint reports on.
pub trait ServiceStatus: Send + Sync {
    /// Users with a live push connection.
    fn online_users(&self) -> usize;
    /// Symbols held in the last-price cache.
    fn tracked_symbols(&self) -> usize;
    /// Cycles that ran to completion.
    fn cycles_completed(&self) -> u64;
    /// Most recent cycle report.
    fn last_cycle(&self) -> Option<CycleReport>;
}

impl<Q, P, D> ServiceStatus for PricePoller<Q, P, D>
where
    Q: QuoteSourcePort + 'static,
    P: PortfolioStorePort + 'static,
    D: AlertDeliveryPort + 'static,
{
    fn online_users(&self) -> usize {
        self.registry().online_count()
    }

    fn tracked_symbols(&self) -> usize {
        self.cache().len()
    }

    fn cycles_completed(&self) -> u64 {
        Self::cycles_completed(self)
    }

    fn last_cycle(&self) -> Option<CycleReport> {
        self.last_report()
    }
}

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Service version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Users with a live connection.
    pub online_users: usize,
    /// Symbols with a cached price.
    pub tracked_symbols: usize,
    /// Completed cycles since start.
    pub cycles_completed: u64,
    /// Most recent cycle, if any.
    pub last_cycle: Option<CycleReport>,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Last cycle completed normally.
    Healthy,
    /// No cycle yet, or every quote in the last cycle failed.
    Degraded,
    /// Last cycle could not list held symbols.
    Unhealthy,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    status: Arc<dyn ServiceStatus>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(version: String, status: Arc<dyn ServiceStatus>) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            status,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

/// Health routes over `state`.
pub fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if state.status.cycles_completed() > 0 {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let last_cycle = state.status.last_cycle();

    HealthResponse {
        status: determine_health_status(last_cycle.as_ref()),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        online_users: state.status.online_users(),
        tracked_symbols: state.status.tracked_symbols(),
        cycles_completed: state.status.cycles_completed(),
        last_cycle,
    }
}

fn determine_health_status(last_cycle: Option<&CycleReport>) -> HealthStatus {
    match last_cycle {
        None => HealthStatus::Degraded,
        Some(report) if report.listing_failed => HealthStatus::Unhealthy,
        Some(report) if report.symbols > 0 && report.quotes_fetched == 0 => HealthStatus::Degraded,
        Some(_) => HealthStatus::Healthy,
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================
