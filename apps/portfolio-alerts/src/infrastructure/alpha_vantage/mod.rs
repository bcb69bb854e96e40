//! Alpha Vantage quote source adapter.
//!
//! Implements `QuoteSourcePort` with the `GLOBAL_QUOTE` endpoint:
//!
//! ```text
//! GET {base_url}/query?function=GLOBAL_QUOTE&symbol={SYMBOL}&apikey={KEY}
//! ```
//!
//! The provider answers HTTP 200 for most failures and signals them in the
//! body instead: `"Note"` / `"Information"` for throttling, `"Error Message"`
//! for bad requests, and an empty `"Global Quote"` object for unknown
//! tickers.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::application::ports::{QuoteSourcePort, QuoteUnavailable};
use crate::domain::market::{Quote, Symbol};
use crate::infrastructure::config::{Credentials, QuoteSourceSettings};

/// Alpha Vantage adapter construction error.
#[derive(Debug, thiserror::Error)]
pub enum AlphaVantageError {
    /// HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

/// Alpha Vantage quote source.
#[derive(Debug)]
pub struct AlphaVantageQuoteSource {
    client: reqwest::Client,
    credentials: Credentials,
    base_url: String,
}

impl AlphaVantageQuoteSource {
    /// Create a new adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        credentials: Credentials,
        settings: &QuoteSourceSettings,
    ) -> Result<Self, AlphaVantageError> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| AlphaVantageError::Client(e.to_string()))?;

        Ok(Self {
            client,
            credentials,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Create an adapter against `base_url` with a fixed timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_base_url(
        credentials: Credentials,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AlphaVantageError> {
        Self::new(
            credentials,
            &QuoteSourceSettings {
                base_url: base_url.into(),
                request_timeout: timeout,
            },
        )
    }

    async fn fetch_global_quote(&self, symbol: &Symbol) -> Result<GlobalQuoteResponse, QuoteUnavailable> {
        let url = format!("{}/query", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("function", "GLOBAL_QUOTE"),
                ("symbol", symbol.as_str()),
                ("apikey", self.credentials.api_key()),
            ])
            .send()
            .await
            .map_err(|e| QuoteUnavailable::Network {
                message: e.without_url().to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(QuoteUnavailable::Provider {
                message: format!("HTTP {}: {}", status.as_u16(), truncate(&body, 200)),
            });
        }

        response
            .json()
            .await
            .map_err(|e| QuoteUnavailable::Malformed {
                message: e.without_url().to_string(),
            })
    }
}

#[async_trait]
impl QuoteSourcePort for AlphaVantageQuoteSource {
    async fn fetch_quote(&self, symbol: &Symbol) -> Result<Quote, QuoteUnavailable> {
        let response = self.fetch_global_quote(symbol).await?;
        let data = response.into_quote_data(symbol)?;

        if let Some(returned) = data.symbol.as_deref()
            && Symbol::new(returned) != *symbol
        {
            tracing::debug!(requested = %symbol, returned, "Provider returned a different symbol");
        }

        let raw_price = data.price.ok_or_else(|| QuoteUnavailable::Malformed {
            message: format!("missing price for {symbol}"),
        })?;
        let price = parse_price(&raw_price)?;

        tracing::debug!(
            symbol = %symbol,
            price = %price,
            latest_trading_day = data.latest_trading_day.as_deref().unwrap_or("unknown"),
            "Quote fetched"
        );

        Ok(Quote::new(symbol.clone(), price))
    }
}

// =============================================================================
// API response types
// =============================================================================

#[derive(Debug, Deserialize)]
struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote")]
    global_quote: Option<GlobalQuoteData>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GlobalQuoteData {
    #[serde(rename = "01. symbol")]
    symbol: Option<String>,
    #[serde(rename = "05. price")]
    price: Option<String>,
    #[serde(rename = "07. latest trading day")]
    latest_trading_day: Option<String>,
}

impl GlobalQuoteResponse {
    fn into_quote_data(self, symbol: &Symbol) -> Result<GlobalQuoteData, QuoteUnavailable> {
        if let Some(message) = self.note.or(self.information) {
            return Err(QuoteUnavailable::RateLimited { message });
        }
        if let Some(message) = self.error_message {
            return Err(QuoteUnavailable::Provider { message });
        }

        match self.global_quote {
            Some(data) if data.symbol.is_some() || data.price.is_some() => Ok(data),
            _ => Err(QuoteUnavailable::NotFound {
                symbol: symbol.to_string(),
            }),
        }
    }
}

fn parse_price(raw: &str) -> Result<Decimal, QuoteUnavailable> {
    let price = Decimal::from_str(raw.trim()).map_err(|e| QuoteUnavailable::Malformed {
        message: format!("invalid price {raw:?}: {e}"),
    })?;

    if price.is_sign_negative() && !price.is_zero() {
        return Err(QuoteUnavailable::Malformed {
            message: format!("negative price {raw:?}"),
        });
    }

    Ok(price.normalize())
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn source_for(server: &MockServer) -> AlphaVantageQuoteSource {
        AlphaVantageQuoteSource::with_base_url(
            Credentials::new("test-key".to_string()),
            server.uri(),
            Duration::from_secs(2),
        )
        .unwrap()
    }

    async fn mount_body(server: &MockServer, symbol: &str, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/query"))
            .and(query_param("function", "GLOBAL_QUOTE"))
            .and(query_param("symbol", symbol))
            .and(query_param("apikey", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn parses_global_quote() {
        let server = MockServer::start().await;
        mount_body(
            &server,
            "IBM",
            json!({
                "Global Quote": {
                    "01. symbol": "IBM",
                    "02. open": "182.3500",
                    "05. price": "184.1200",
                    "07. latest trading day": "2026-10-15",
                    "10. change percent": "0.9704%"
                }
            }),
        )
        .await;

        let quote = source_for(&server)
            .fetch_quote(&Symbol::new("ibm"))
            .await
            .unwrap();

        assert_eq!(quote.symbol, Symbol::new("IBM"));
        assert_eq!(quote.price, Decimal::new(18412, 2));
    }

    #[tokio::test]
    async fn quote_is_keyed_by_requested_symbol() {
        let server = MockServer::start().await;
        mount_body(
            &server,
            "BRK.B",
            json!({"Global Quote": {"01. symbol": "BRK-B", "05. price": "450.00"}}),
        )
        .await;

        let quote = source_for(&server)
            .fetch_quote(&Symbol::new("BRK.B"))
            .await
            .unwrap();

        assert_eq!(quote.symbol.as_str(), "BRK.B");
    }

    #[tokio::test]
    async fn empty_global_quote_is_not_found() {
        let server = MockServer::start().await;
        mount_body(&server, "NOPE", json!({"Global Quote": {}})).await;

        let err = source_for(&server)
            .fetch_quote(&Symbol::new("NOPE"))
            .await
            .unwrap_err();

        assert!(matches!(err, QuoteUnavailable::NotFound { .. }));
    }

    #[tokio::test]
    async fn note_is_rate_limit() {
        let server = MockServer::start().await;
        mount_body(
            &server,
            "AAPL",
            json!({"Note": "Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute."}),
        )
        .await;

        let err = source_for(&server)
            .fetch_quote(&Symbol::new("AAPL"))
            .await
            .unwrap_err();

        assert!(matches!(err, QuoteUnavailable::RateLimited { .. }));
    }

    #[tokio::test]
    async fn information_is_rate_limit() {
        let server = MockServer::start().await;
        mount_body(
            &server,
            "AAPL",
            json!({"Information": "Daily request limit reached."}),
        )
        .await;

        let err = source_for(&server)
            .fetch_quote(&Symbol::new("AAPL"))
            .await
            .unwrap_err();

        assert!(matches!(err, QuoteUnavailable::RateLimited { .. }));
    }

    #[tokio::test]
    async fn error_message_is_provider_error() {
        let server = MockServer::start().await;
        mount_body(
            &server,
            "AAPL",
            json!({"Error Message": "Invalid API call."}),
        )
        .await;

        let err = source_for(&server)
            .fetch_quote(&Symbol::new("AAPL"))
            .await
            .unwrap_err();

        assert!(matches!(err, QuoteUnavailable::Provider { .. }));
    }

    #[tokio::test]
    async fn http_error_is_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/query"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let err = source_for(&server)
            .fetch_quote(&Symbol::new("AAPL"))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn unparseable_price_is_malformed() {
        let server = MockServer::start().await;
        mount_body(
            &server,
            "AAPL",
            json!({"Global Quote": {"01. symbol": "AAPL", "05. price": "n/a"}}),
        )
        .await;

        let err = source_for(&server)
            .fetch_quote(&Symbol::new("AAPL"))
            .await
            .unwrap_err();

        assert!(matches!(err, QuoteUnavailable::Malformed { .. }));
    }

    #[tokio::test]
    async fn non_json_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/query"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = source_for(&server)
            .fetch_quote(&Symbol::new("AAPL"))
            .await
            .unwrap_err();

        assert!(matches!(err, QuoteUnavailable::Malformed { .. }));
    }

    #[tokio::test]
    async fn unreachable_provider_is_network_error() {
        let source = AlphaVantageQuoteSource::with_base_url(
            Credentials::new("test-key".to_string()),
            "http://127.0.0.1:9",
            Duration::from_secs(1),
        )
        .unwrap();

        let err = source.fetch_quote(&Symbol::new("AAPL")).await.unwrap_err();

        assert!(matches!(err, QuoteUnavailable::Network { .. }));
    }

    #[test]
    fn parse_price_rejects_negative() {
        assert!(parse_price("-1.00").is_err());
        assert_eq!(parse_price(" 0.0000 ").unwrap(), Decimal::ZERO);
        assert_eq!(parse_price("184.1200").unwrap().to_string(), "184.12");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("ok", 10), "ok");
    }
}
