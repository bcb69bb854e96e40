//! Price Move Detection
//!
//! Pure delta evaluation between the last observed price of a symbol and a
//! freshly fetched one, plus the human-readable alert text pushed to
//! holders.
//!
//! # Rules
//!
//! - No prior price: the new price becomes the baseline, never an alert.
//! - Prior price of zero: the percentage is undefined, no alert.
//! - Otherwise `change = (current - previous) / previous * 100` and an
//!   alert fires iff `|change| > threshold` (strict).

use std::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::domain::market::Symbol;

/// Default alert threshold: 0.1 percent.
pub const DEFAULT_THRESHOLD_PCT: Decimal = Decimal::from_parts(1, 0, 0, false, 1);

// =============================================================================
// Observation
// =============================================================================

/// Outcome of comparing a fresh price with the cached one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PriceObservation {
    /// First sighting of the symbol; the price is now the baseline.
    Baseline,
    /// Move within the threshold.
    Within {
        /// Signed percentage change.
        change_pct: Decimal,
    },
    /// Move beyond the threshold.
    Breach(PriceAlert),
    /// Prior price was zero, so no percentage can be computed.
    Undefined,
}

impl PriceObservation {
    /// Evaluate a fresh price against the previously cached one.
    #[must_use]
    pub fn evaluate(
        symbol: &Symbol,
        previous: Option<Decimal>,
        current: Decimal,
        threshold_pct: Decimal,
    ) -> Self {
        let Some(previous) = previous else {
            return Self::Baseline;
        };

        let Some(change_pct) = percent_change(previous, current) else {
            return Self::Undefined;
        };

        if change_pct.abs() > threshold_pct {
            Self::Breach(PriceAlert {
                symbol: symbol.clone(),
                previous,
                current,
                change_pct,
            })
        } else {
            Self::Within { change_pct }
        }
    }

    /// The alert, if this observation is a breach.
    #[must_use]
    pub fn into_alert(self) -> Option<PriceAlert> {
        match self {
            Self::Breach(alert) => Some(alert),
            _ => None,
        }
    }
}

/// Signed percentage change from `previous` to `current`.
///
/// Returns `None` when `previous` is zero or the arithmetic overflows.
#[must_use]
pub fn percent_change(previous: Decimal, current: Decimal) -> Option<Decimal> {
    if previous.is_zero() {
        return None;
    }
    current
        .checked_sub(previous)?
        .checked_div(previous)?
        .checked_mul(Decimal::ONE_HUNDRED)
}

// =============================================================================
// Alert
// =============================================================================

/// A threshold-breaching price move for one symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceAlert {
    /// Symbol that moved.
    pub symbol: Symbol,
    /// Cached price before the move.
    pub previous: Decimal,
    /// Freshly fetched price.
    pub current: Decimal,
    /// Signed percentage change.
    pub change_pct: Decimal,
}

impl PriceAlert {
    /// Text pushed to every online holder.
    ///
    /// Example: `AAPL price has changed by +0.20%! New price: $100.20`
    #[must_use]
    pub fn message(&self) -> String {
        let change = two_places(self.change_pct);
        let sign = if change.is_sign_positive() { "+" } else { "" };
        format!(
            "{} price has changed by {sign}{change}%! New price: ${}",
            self.symbol,
            two_places(self.current)
        )
    }

    /// Wire payload for the live connection.
    #[must_use]
    pub fn payload(&self) -> AlertPayload {
        AlertPayload {
            message: self.message(),
        }
    }
}

impl fmt::Display for PriceAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

/// Push message sent over a live connection: `{"message": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertPayload {
    /// Human-readable alert text.
    pub message: String,
}

/// Round half away from zero and pin the scale to exactly two places.
fn two_places(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    if rounded.is_zero() {
        rounded = Decimal::ZERO;
    }
    rounded.rescale(2);
    rounded
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use proptest::prelude::*;
    use test_case::test_case;

    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn aapl() -> Symbol {
        Symbol::new("AAPL")
    }

    #[test]
    fn default_threshold_is_one_tenth_percent() {
        assert_eq!(DEFAULT_THRESHOLD_PCT, dec("0.1"));
    }

    #[test]
    fn first_sighting_is_baseline() {
        let obs =
            PriceObservation::evaluate(&aapl(), None, dec("100.00"), DEFAULT_THRESHOLD_PCT);
        assert_eq!(obs, PriceObservation::Baseline);
    }

    #[test]
    fn zero_previous_is_undefined() {
        let obs = PriceObservation::evaluate(
            &aapl(),
            Some(Decimal::ZERO),
            dec("5.00"),
            DEFAULT_THRESHOLD_PCT,
        );
        assert_eq!(obs, PriceObservation::Undefined);
    }

    #[test_case("100.00", "100.05", false ; "small rise stays quiet")]
    #[test_case("100.00", "100.10", false ; "exactly at threshold stays quiet")]
    #[test_case("100.00", "100.11", true ; "just above threshold fires")]
    #[test_case("100.00", "100.20", true ; "rise fires")]
    #[test_case("100.00", "99.80", true ; "drop fires")]
    #[test_case("100.00", "99.90", false ; "drop at threshold stays quiet")]
    #[test_case("100.00", "100.00", false ; "unchanged stays quiet")]
    fn threshold_table(previous: &str, current: &str, fires: bool) {
        let obs = PriceObservation::evaluate(
            &aapl(),
            Some(dec(previous)),
            dec(current),
            DEFAULT_THRESHOLD_PCT,
        );
        assert_eq!(matches!(obs, PriceObservation::Breach(_)), fires);
    }

    #[test]
    fn alert_message_for_rise() {
        let alert = PriceObservation::evaluate(
            &aapl(),
            Some(dec("100.00")),
            dec("100.20"),
            DEFAULT_THRESHOLD_PCT,
        )
        .into_alert()
        .unwrap();

        assert_eq!(alert.change_pct, dec("0.2"));
        assert_eq!(
            alert.message(),
            "AAPL price has changed by +0.20%! New price: $100.20"
        );
    }

    #[test]
    fn alert_message_for_drop() {
        let alert = PriceObservation::evaluate(
            &Symbol::new("msft"),
            Some(dec("400")),
            dec("390.5"),
            DEFAULT_THRESHOLD_PCT,
        )
        .into_alert()
        .unwrap();

        assert_eq!(
            alert.message(),
            "MSFT price has changed by -2.38%! New price: $390.50"
        );
    }

    #[test]
    fn payload_serializes_message_only() {
        let alert = PriceAlert {
            symbol: aapl(),
            previous: dec("100"),
            current: dec("101"),
            change_pct: dec("1"),
        };
        let json = serde_json::to_value(alert.payload()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "message": "AAPL price has changed by +1.00%! New price: $101.00"
            })
        );
    }

    #[test]
    fn two_places_rounds_half_away_from_zero() {
        assert_eq!(two_places(dec("0.125")).to_string(), "0.13");
        assert_eq!(two_places(dec("-0.125")).to_string(), "-0.13");
        assert_eq!(two_places(dec("7")).to_string(), "7.00");
        assert_eq!(two_places(dec("-0.001")).to_string(), "0.00");
    }

    proptest! {
        #[test]
        fn fires_iff_move_exceeds_threshold(
            previous_cents in 1i64..10_000_000,
            current_cents in 0i64..10_000_000,
        ) {
            let previous = Decimal::new(previous_cents, 2);
            let current = Decimal::new(current_cents, 2);
            let change = percent_change(previous, current).unwrap();

            let obs = PriceObservation::evaluate(
                &aapl(),
                Some(previous),
                current,
                DEFAULT_THRESHOLD_PCT,
            );

            prop_assert_eq!(
                matches!(obs, PriceObservation::Breach(_)),
                change.abs() > DEFAULT_THRESHOLD_PCT
            );
        }
    }
}
