//! Prometheus Metrics Module
//!
//! Exposes application metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Cycles**: Completed and failed price cycles, duration, overrun ticks
//! - **Quotes**: Quote fetch failures
//! - **Alerts**: Alerts raised and their delivery outcomes
//! - **State**: Online connections and tracked symbols
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::application::services::CycleReport;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Later calls return the handle installed by the first one.
///
/// # Errors
///
/// Returns `BuildError` if the recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();

    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Cycle counters
    describe_counter!(
        "portfolio_alerts_cycles_total",
        "Total price cycles by outcome"
    );
    describe_counter!(
        "portfolio_alerts_skipped_ticks_total",
        "Schedule ticks dropped because a cycle overran the interval"
    );
    describe_histogram!(
        "portfolio_alerts_cycle_duration_seconds",
        "Wall-clock duration of a price cycle"
    );

    // Quote and alert counters
    describe_counter!(
        "portfolio_alerts_quote_failures_total",
        "Quote fetches that failed or timed out"
    );
    describe_counter!(
        "portfolio_alerts_alerts_total",
        "Threshold-breaching price moves detected"
    );
    describe_counter!(
        "portfolio_alerts_holder_lookup_failures_total",
        "Holder lookups that failed or timed out"
    );
    describe_counter!(
        "portfolio_alerts_deliveries_total",
        "Alert pushes by outcome"
    );

    // State gauges
    describe_gauge!(
        "portfolio_alerts_online_connections",
        "Users with a live push connection"
    );
    describe_gauge!(
        "portfolio_alerts_tracked_symbols",
        "Symbols held in the last-price cache"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Metric labels for alert delivery outcomes.
#[derive(Debug, Clone, Copy)]
pub enum DeliveryOutcome {
    /// Pushed to the live connection.
    Delivered,
    /// Push attempted but failed.
    Failed,
    /// Holder had no live connection.
    Offline,
}

impl DeliveryOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::Failed => "failed",
            Self::Offline => "offline",
        }
    }
}

/// Record every counter carried by a completed cycle report.
#[allow(clippy::cast_possible_truncation)]
pub fn record_cycle(report: &CycleReport) {
    let outcome = if report.listing_failed {
        "listing_failed"
    } else {
        "completed"
    };
    counter!("portfolio_alerts_cycles_total", "outcome" => outcome).increment(1);
    record_cycle_duration(Duration::from_millis(report.duration_ms));

    counter!("portfolio_alerts_skipped_ticks_total").increment(report.ticks_overrun);
    counter!("portfolio_alerts_quote_failures_total").increment(report.quote_failures as u64);
    counter!("portfolio_alerts_alerts_total").increment(report.alerts as u64);
    counter!("portfolio_alerts_holder_lookup_failures_total")
        .increment(report.holder_lookup_failures as u64);

    record_deliveries(DeliveryOutcome::Delivered, report.deliveries as u64);
    record_deliveries(DeliveryOutcome::Failed, report.delivery_failures as u64);
    record_deliveries(DeliveryOutcome::Offline, report.recipients_offline as u64);

    set_tracked_symbols(report.tracked_symbols);
}

/// Record alert delivery outcomes.
pub fn record_deliveries(outcome: DeliveryOutcome, count: u64) {
    counter!(
        "portfolio_alerts_deliveries_total",
        "outcome" => outcome.as_str()
    )
    .increment(count);
}

/// Record price cycle duration.
pub fn record_cycle_duration(duration: Duration) {
    histogram!("portfolio_alerts_cycle_duration_seconds").record(duration.as_secs_f64());
}

/// Update the online connection count.
#[allow(clippy::cast_precision_loss)]
pub fn set_online_connections(count: usize) {
    gauge!("portfolio_alerts_online_connections").set(count as f64);
}

/// Update the tracked symbol count.
#[allow(clippy::cast_precision_loss)]
pub fn set_tracked_symbols(count: usize) {
    gauge!("portfolio_alerts_tracked_symbols").set(count as f64);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_outcome_as_str() {
        assert_eq!(DeliveryOutcome::Delivered.as_str(), "delivered");
        assert_eq!(DeliveryOutcome::Failed.as_str(), "failed");
        assert_eq!(DeliveryOutcome::Offline.as_str(), "offline");
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        set_online_connections(3);
        set_tracked_symbols(2);
        record_deliveries(DeliveryOutcome::Delivered, 1);
        record_cycle_duration(Duration::from_millis(15));
    }
}
