//! Last-Price Cache
//!
//! Process-local map of symbol to last observed price. Written only by the
//! price poller; quote fetches within a cycle may complete concurrently, so
//! every write goes through one short critical section.
//!
//! Entries are created on the first successful quote, overwritten on every
//! later one and never evicted.

use std::collections::HashMap;

use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::domain::market::Symbol;

/// Last observed price per symbol.
#[derive(Debug, Default)]
pub struct LastPriceCache {
    prices: Mutex<HashMap<Symbol, Decimal>>,
}

impl LastPriceCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `price` for `symbol`, returning the price it replaced.
    ///
    /// The read of the prior entry and the overwrite happen under the same
    /// lock, so two observations of one symbol can never both see the same
    /// prior price.
    pub fn observe(&self, symbol: &Symbol, price: Decimal) -> Option<Decimal> {
        self.prices.lock().insert(symbol.clone(), price)
    }

    /// Last observed price for `symbol`.
    #[must_use]
    pub fn get(&self, symbol: &Symbol) -> Option<Decimal> {
        self.prices.lock().get(symbol).copied()
    }

    /// Number of symbols ever observed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.prices.lock().len()
    }

    /// Whether no symbol has been observed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prices.lock().is_empty()
    }

    /// Copy of every entry, sorted by symbol.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(Symbol, Decimal)> {
        let mut entries: Vec<_> = self
            .prices
            .lock()
            .iter()
            .map(|(symbol, price)| (symbol.clone(), *price))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_has_no_prior() {
        let cache = LastPriceCache::new();
        assert!(cache.is_empty());

        let prior = cache.observe(&Symbol::new("AAPL"), Decimal::new(10000, 2));

        assert_eq!(prior, None);
        assert_eq!(cache.get(&Symbol::new("AAPL")), Some(Decimal::new(10000, 2)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn observation_overwrites_and_returns_prior() {
        let cache = LastPriceCache::new();
        let aapl = Symbol::new("AAPL");

        cache.observe(&aapl, Decimal::new(10000, 2));
        let prior = cache.observe(&aapl, Decimal::new(10005, 2));

        assert_eq!(prior, Some(Decimal::new(10000, 2)));
        assert_eq!(cache.get(&aapl), Some(Decimal::new(10005, 2)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn lookups_are_case_normalized() {
        let cache = LastPriceCache::new();
        cache.observe(&Symbol::new("aapl"), Decimal::ONE);
        assert_eq!(cache.get(&Symbol::new("AAPL")), Some(Decimal::ONE));
    }

    #[test]
    fn snapshot_is_sorted() {
        let cache = LastPriceCache::new();
        cache.observe(&Symbol::new("MSFT"), Decimal::TEN);
        cache.observe(&Symbol::new("AAPL"), Decimal::ONE);

        let snapshot = cache.snapshot();
        assert_eq!(
            snapshot,
            vec![
                (Symbol::new("AAPL"), Decimal::ONE),
                (Symbol::new("MSFT"), Decimal::TEN)
            ]
        );
    }

    #[test]
    fn concurrent_observers_each_see_a_distinct_prior() {
        use std::sync::Arc;
        use std::thread;

        let cache = Arc::new(LastPriceCache::new());
        let symbol = Symbol::new("SHARED");
        let mut handles = vec![];

        for i in 0..16i64 {
            let c = Arc::clone(&cache);
            let s = symbol.clone();
            handles.push(thread::spawn(move || c.observe(&s, Decimal::from(i))));
        }

        let priors: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        // Exactly one writer saw an empty slot; every other prior is unique.
        assert_eq!(priors.iter().filter(|p| p.is_none()).count(), 1);
        let mut seen: Vec<_> = priors.into_iter().flatten().collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 15);
    }
}
