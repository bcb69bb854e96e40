//! Domain Layer - Core alerting types and business rules.
//!
//! This layer contains the price-move rules and the two pieces of
//! process-local state the alert engine owns. Nothing here performs I/O.

/// Price delta evaluation and alert text.
pub mod alerts;

/// User → live connection handle registry.
pub mod connections;

/// Tickers, holder identities and quotes.
pub mod market;

/// Last observed price per symbol.
pub mod price_cache;
