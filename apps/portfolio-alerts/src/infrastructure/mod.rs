//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Alpha Vantage `GLOBAL_QUOTE` quote source.
pub mod alpha_vantage;

/// In-memory portfolio store with JSON seeding.
pub mod portfolio;

/// WebSocket gateway and alert delivery adapter.
pub mod gateway;

/// Configuration loading.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Logging and OpenTelemetry tracing integration.
pub mod telemetry;
