//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the price-alert cycle and the port interfaces
//! through which it reaches quotes, portfolios and live connections.

/// Port interfaces for external systems (quote provider, portfolio store, push delivery).
pub mod ports;

/// Application services driving the recurring price cycle.
pub mod services;
