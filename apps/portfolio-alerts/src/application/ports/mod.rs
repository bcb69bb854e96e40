//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `QuoteSourcePort`: current price per symbol
//! - `PortfolioStorePort`: held symbols and their holders
//! - `AlertDeliveryPort`: best-effort push over a live connection

mod alert_delivery_port;
mod portfolio_store_port;
mod quote_source_port;

pub use alert_delivery_port::{AlertDeliveryPort, DeliveryFailure};
#[cfg(test)]
pub use portfolio_store_port::MockPortfolioStorePort;
pub use portfolio_store_port::{PortfolioStorePort, ProviderError};
pub use quote_source_port::{QuoteSourcePort, QuoteUnavailable};
