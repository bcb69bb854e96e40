//! Market Types
//!
//! Value objects shared by every layer: tickers, holder identities and
//! freshly fetched quotes.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Longest ticker accepted by [`Symbol::validate`].
const MAX_SYMBOL_LEN: usize = 12;

// =============================================================================
// Symbol
// =============================================================================

/// An equity ticker.
///
/// Always stored trimmed and uppercase, so `"aapl "` and `"AAPL"` are the
/// same cache key and the same subscriber-resolution key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Create a new symbol, normalized to uppercase.
    #[must_use]
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(value.as_ref().trim().to_uppercase())
    }

    /// Get the symbol string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validate the ticker shape.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidSymbol`] if the ticker is empty, too long, or
    /// contains characters outside `[A-Z0-9.-]`.
    pub fn validate(&self) -> Result<(), InvalidSymbol> {
        if self.0.is_empty() {
            return Err(InvalidSymbol::Empty);
        }
        if self.0.len() > MAX_SYMBOL_LEN {
            return Err(InvalidSymbol::TooLong(self.0.clone()));
        }
        if !self
            .0
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
        {
            return Err(InvalidSymbol::InvalidCharacters(self.0.clone()));
        }
        Ok(())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for Symbol {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for Symbol {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<Symbol> for String {
    fn from(value: Symbol) -> Self {
        value.0
    }
}

/// Rejected ticker.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidSymbol {
    /// Blank ticker.
    #[error("symbol cannot be empty")]
    Empty,
    /// Ticker longer than the accepted maximum.
    #[error("symbol exceeds maximum length: {0}")]
    TooLong(String),
    /// Ticker contains characters outside `[A-Z0-9.-]`.
    #[error("symbol contains invalid characters: {0}")]
    InvalidCharacters(String),
}

// =============================================================================
// User Identity
// =============================================================================

/// Identity of a portfolio holder, as issued by the authentication service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Create a user id, trimming surrounding whitespace.
    #[must_use]
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(value.as_ref().trim().to_string())
    }

    /// Get the id string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id is blank.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

// =============================================================================
// Quote
// =============================================================================

/// Current price of a symbol at fetch time.
///
/// Produced fresh every poll cycle and never persisted beyond the
/// last-price cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// Quoted symbol.
    pub symbol: Symbol,
    /// Last traded price.
    pub price: Decimal,
    /// When the quote was fetched.
    pub as_of: DateTime<Utc>,
}

impl Quote {
    /// Create a quote stamped with the current time.
    #[must_use]
    pub fn new(symbol: Symbol, price: Decimal) -> Self {
        Self {
            symbol,
            price,
            as_of: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_new_normalizes_case_and_whitespace() {
        assert_eq!(Symbol::new(" aapl ").as_str(), "AAPL");
        assert_eq!(Symbol::from("msft"), Symbol::new("MSFT"));
    }

    #[test]
    fn symbol_hash_treats_case_variants_as_one_key() {
        use std::collections::HashSet;

        let set: HashSet<Symbol> = ["AAPL", "aapl", "Aapl", "MSFT"]
            .into_iter()
            .map(Symbol::new)
            .collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn symbol_deserialize_normalizes() {
        let s: Symbol = serde_json::from_str("\"tsla\"").unwrap();
        assert_eq!(s.as_str(), "TSLA");
        assert_eq!(serde_json::to_string(&s).unwrap(), "\"TSLA\"");
    }

    #[test]
    fn symbol_validate() {
        assert!(Symbol::new("AAPL").validate().is_ok());
        assert!(Symbol::new("BRK.B").validate().is_ok());
        assert!(Symbol::new("RELIANCE.BSE").validate().is_ok());
        assert_eq!(Symbol::new("  ").validate(), Err(InvalidSymbol::Empty));
        assert!(matches!(
            Symbol::new("A".repeat(13)).validate(),
            Err(InvalidSymbol::TooLong(_))
        ));
        assert!(matches!(
            Symbol::new("AA PL").validate(),
            Err(InvalidSymbol::InvalidCharacters(_))
        ));
    }

    #[test]
    fn user_id_trims() {
        let user = UserId::new("  64f1c0ffee  ");
        assert_eq!(user.as_str(), "64f1c0ffee");
        assert!(!user.is_empty());
        assert!(UserId::new("   ").is_empty());
    }

    #[test]
    fn quote_new_stamps_fetch_time() {
        let before = Utc::now();
        let quote = Quote::new(Symbol::new("AAPL"), Decimal::new(10005, 2));
        assert!(quote.as_of >= before);
        assert_eq!(quote.price, Decimal::new(10005, 2));
    }
}
