//! Quote Source Port (Driven Port)
//!
//! Interface for fetching the current price of a single symbol.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::market::{Quote, Symbol};

/// Why a quote could not be produced.
///
/// The poller treats every variant the same way (skip the symbol and log);
/// the variants only exist for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuoteUnavailable {
    /// Provider has no quote for the symbol.
    #[error("no quote found for {symbol}")]
    NotFound {
        /// Requested symbol.
        symbol: String,
    },

    /// Provider refused the request because of rate limiting.
    #[error("quote provider rate limited: {message}")]
    RateLimited {
        /// Provider note.
        message: String,
    },

    /// Provider answered with an error.
    #[error("quote provider error: {message}")]
    Provider {
        /// Error details.
        message: String,
    },

    /// Transport failure or non-success HTTP status.
    #[error("quote provider unreachable: {message}")]
    Network {
        /// Error details.
        message: String,
    },

    /// Response could not be interpreted.
    #[error("malformed quote response: {message}")]
    Malformed {
        /// Error details.
        message: String,
    },

    /// No answer within the per-fetch deadline.
    #[error("quote fetch for {symbol} timed out after {after:?}")]
    Timeout {
        /// Requested symbol.
        symbol: String,
        /// Deadline that elapsed.
        after: Duration,
    },
}

/// Port for fetching current prices.
#[async_trait]
pub trait QuoteSourcePort: Send + Sync {
    /// Fetch the current quote for `symbol`.
    async fn fetch_quote(&self, symbol: &Symbol) -> Result<Quote, QuoteUnavailable>;
}
