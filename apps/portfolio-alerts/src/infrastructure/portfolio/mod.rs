//! In-memory portfolio store.
//!
//! Holds `(user, symbol, quantity)` rows and answers the two questions the
//! poller asks: which symbols are held at all, and who holds a given one.
//! A row counts as a holding only while its quantity is positive.
//!
//! Rows can be seeded from a JSON file:
//!
//! ```json
//! [
//!   { "user": "64f1c0ffee", "symbol": "AAPL", "quantity": 10 },
//!   { "user": "64f1c0ffee", "symbol": "MSFT", "quantity": "2.5" }
//! ]
//! ```

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::application::ports::{PortfolioStorePort, ProviderError};
use crate::domain::market::{InvalidSymbol, Symbol, UserId};

/// Failure loading a holdings seed file.
#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    /// File could not be read.
    #[error("failed to read seed file {path}: {source}")]
    Read {
        /// Seed file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// File is not a JSON array of holdings.
    #[error("failed to parse seed file {path}: {source}")]
    Parse {
        /// Seed file path.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
    /// A row names an invalid ticker.
    #[error("seed row {row}: {source}")]
    Symbol {
        /// Zero-based row index.
        row: usize,
        /// Validation failure.
        source: InvalidSymbol,
    },
    /// A row has a blank user id.
    #[error("seed row {row}: user id cannot be empty")]
    EmptyUser {
        /// Zero-based row index.
        row: usize,
    },
    /// Summing duplicate rows overflowed the quantity.
    #[error("seed row {row}: quantity overflow for {user}/{symbol}")]
    QuantityOverflow {
        /// Zero-based row index.
        row: usize,
        /// Holder of the overflowing position.
        user: UserId,
        /// Symbol of the overflowing position.
        symbol: Symbol,
    },
}

#[derive(Debug, Deserialize)]
struct SeedRow {
    user: String,
    symbol: String,
    quantity: Decimal,
}

/// In-memory implementation of `PortfolioStorePort`.
#[derive(Debug, Default)]
pub struct InMemoryPortfolioStore {
    holdings: RwLock<HashMap<(UserId, Symbol), Decimal>>,
}

impl InMemoryPortfolioStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a store from a JSON seed file.
    ///
    /// Rows for the same user and symbol are summed.
    ///
    /// # Errors
    ///
    /// Returns `SeedError` if the file cannot be read or parsed, or a row is
    /// invalid.
    pub fn from_seed_file(path: impl AsRef<Path>) -> Result<Self, SeedError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| SeedError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let rows: Vec<SeedRow> = serde_json::from_str(&raw).map_err(|source| SeedError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let store = Self::new();
        {
            let mut holdings = store.holdings.write();
            for (row, entry) in rows.into_iter().enumerate() {
                let symbol = Symbol::new(&entry.symbol);
                symbol
                    .validate()
                    .map_err(|source| SeedError::Symbol { row, source })?;
                let user = UserId::new(&entry.user);
                if user.is_empty() {
                    return Err(SeedError::EmptyUser { row });
                }
                let held = holdings
                    .entry((user, symbol))
                    .or_insert(Decimal::ZERO);
                *held = held.checked_add(entry.quantity).ok_or_else(|| {
                    SeedError::QuantityOverflow {
                        row,
                        user: UserId::new(&entry.user),
                        symbol: Symbol::new(&entry.symbol),
                    }
                })?;
            }
        }

        tracing::info!(
            path = %path.display(),
            holdings = store.len(),
            "Portfolio seed loaded"
        );
        Ok(store)
    }

    /// Set the quantity `user` holds of `symbol`.
    pub fn add_holding(&self, user: UserId, symbol: Symbol, quantity: Decimal) {
        self.holdings.write().insert((user, symbol), quantity);
    }

    /// Drop the row for `user` and `symbol`. Returns whether it existed.
    pub fn remove_holding(&self, user: &UserId, symbol: &Symbol) -> bool {
        self.holdings
            .write()
            .remove(&(user.clone(), symbol.clone()))
            .is_some()
    }

    /// Number of rows, including non-positive ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.holdings.read().len()
    }

    /// Whether the store has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.holdings.read().is_empty()
    }
}

#[async_trait]
impl PortfolioStorePort for InMemoryPortfolioStore {
    async fn list_distinct_symbols(&self) -> Result<BTreeSet<Symbol>, ProviderError> {
        let holdings = self.holdings.read();
        Ok(holdings
            .iter()
            .filter(|(_, quantity)| quantity.is_sign_positive() && !quantity.is_zero())
            .map(|((_, symbol), _)| symbol.clone())
            .collect())
    }

    async fn get_holders(&self, symbol: &Symbol) -> Result<BTreeSet<UserId>, ProviderError> {
        let holdings = self.holdings.read();
        Ok(holdings
            .iter()
            .filter(|((_, s), quantity)| {
                s == symbol && quantity.is_sign_positive() && !quantity.is_zero()
            })
            .map(|((user, _), _)| user.clone())
            .collect())
    }
}
