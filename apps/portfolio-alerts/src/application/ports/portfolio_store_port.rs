//! Portfolio Store Port (Driven Port)
//!
//! Read-only view of holdings needed by the alert engine. Portfolio
//! editing lives in another service.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::market::{Symbol, UserId};

/// Portfolio store failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// Store could not be reached or answered with an error.
    #[error("portfolio store unavailable: {message}")]
    Unavailable {
        /// Error details.
        message: String,
    },

    /// No answer within the deadline.
    #[error("portfolio store {operation} timed out after {after:?}")]
    Timeout {
        /// Operation that timed out.
        operation: &'static str,
        /// Deadline that elapsed.
        after: Duration,
    },
}

/// Port for resolving held symbols and their holders.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PortfolioStorePort: Send + Sync {
    /// Every symbol held by at least one portfolio.
    async fn list_distinct_symbols(&self) -> Result<BTreeSet<Symbol>, ProviderError>;

    /// Users holding at least one unit of `symbol`.
    async fn get_holders(&self, symbol: &Symbol) -> Result<BTreeSet<UserId>, ProviderError>;
}
