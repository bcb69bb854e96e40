#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements,
        clippy::manual_assert,
        clippy::unused_async
    )
)]

//! Portfolio Alerts - Real-Time Price Alert Engine
//!
//! Polls current prices for every symbol held in any portfolio, compares
//! each with the last observed price, and pushes a notification over a
//! live WebSocket to each online holder when the move exceeds a threshold.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core alert logic and data types
//!   - `market`: Symbols, user ids, quotes
//!   - `alerts`: Delta evaluation and alert text
//!   - `price_cache`: Last observed price per symbol
//!   - `connections`: User → live connection registry
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Quote source, portfolio store, alert delivery
//!   - `services`: The recurring price poller
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `alpha_vantage`: HTTP quote source
//!   - `portfolio`: In-memory portfolio store
//!   - `gateway`: WebSocket endpoint and delivery adapter
//!   - `config`: Environment configuration
//!   - `health`: Health check HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//!                   ┌────────────────┐   held symbols   ┌─────────────────┐
//!                   │  Price Poller  │◄─────────────────│ Portfolio Store │
//!  Alpha Vantage ──►│  (every 60s)   │◄─── holders ─────│                 │
//!                   └───────┬────────┘                  └─────────────────┘
//!                           │ alert
//!                           ▼
//!                   ┌────────────────┐      ┌──────────────┐
//!                   │  Connection    │─────►│  WebSocket   │──► Client 1
//!                   │  Registry      │      │  Gateway     │──► Client N
//!                   └────────────────┘      └──────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core alert types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::alerts::{AlertPayload, DEFAULT_THRESHOLD_PCT, PriceAlert, PriceObservation};
pub use domain::connections::ConnectionRegistry;
pub use domain::market::{InvalidSymbol, Quote, Symbol, UserId};
pub use domain::price_cache::LastPriceCache;

// Ports and services
pub use application::ports::{
    AlertDeliveryPort, DeliveryFailure, PortfolioStorePort, ProviderError, QuoteSourcePort,
    QuoteUnavailable,
};
pub use application::services::{CycleReport, PricePoller, PricePollerConfig};

// Infrastructure config
pub use infrastructure::config::{
    AlertServiceConfig, ConfigError, Credentials, PollerSettings, QuoteSourceSettings,
    ServerSettings,
};

// Adapters
pub use infrastructure::alpha_vantage::{AlphaVantageError, AlphaVantageQuoteSource};
pub use infrastructure::gateway::{
    ClientHandle, ClientRegistry, GatewayError, GatewayServer, GatewayState, WebSocketAlertDelivery,
};
pub use infrastructure::portfolio::{InMemoryPortfolioStore, SeedError};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState, ServiceStatus};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
