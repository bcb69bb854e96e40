//! Alert Service Configuration Settings
//!
//! Configuration types for the price-alert service, loaded from environment
//! variables. Absent or unparseable values fall back to defaults; values
//! that parse but are out of range fail startup.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::application::services::PricePollerConfig;
use crate::domain::alerts::DEFAULT_THRESHOLD_PCT;

/// Public demo key accepted by Alpha Vantage for a handful of tickers.
pub const DEMO_API_KEY: &str = "demo";

/// Quote provider credentials.
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
}

impl Credentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(api_key: String) -> Self {
        Self { api_key }
    }

    /// Get the API key.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Whether the public demo key is in use.
    #[must_use]
    pub fn is_demo(&self) -> bool {
        self.api_key == DEMO_API_KEY
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// Quote provider settings.
#[derive(Debug, Clone)]
pub struct QuoteSourceSettings {
    /// Provider base URL, without the `/query` path.
    pub base_url: String,
    /// HTTP request timeout.
    pub request_timeout: Duration,
}

impl Default for QuoteSourceSettings {
    fn default() -> Self {
        Self {
            base_url: "https://www.alphavantage.co".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Price poller settings.
#[derive(Debug, Clone)]
pub struct PollerSettings {
    /// Time between cycle starts.
    pub interval: Duration,
    /// Alert threshold in percent (exclusive).
    pub threshold_pct: Decimal,
    /// Concurrent quote fetches and holder lookups.
    pub max_concurrency: usize,
    /// Per-quote timeout.
    pub quote_timeout: Duration,
    /// Per portfolio-store call timeout.
    pub store_timeout: Duration,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            threshold_pct: DEFAULT_THRESHOLD_PCT,
            max_concurrency: 5,
            quote_timeout: Duration::from_secs(10),
            store_timeout: Duration::from_secs(5),
        }
    }
}

impl PollerSettings {
    /// Poller configuration derived from these settings.
    #[must_use]
    pub const fn poller_config(&self) -> PricePollerConfig {
        PricePollerConfig {
            interval: self.interval,
            threshold_pct: self.threshold_pct,
            max_concurrent_fetches: self.max_concurrency,
            quote_timeout: self.quote_timeout,
            store_timeout: self.store_timeout,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// WebSocket gateway port.
    pub gateway_port: u16,
    /// Health check and metrics HTTP port.
    pub health_port: u16,
    /// Per-connection outbound message buffer.
    pub outbound_buffer: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            gateway_port: 5000,
            health_port: 8082,
            outbound_buffer: 32,
        }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone, Default)]
pub struct AlertServiceConfig {
    /// Quote provider credentials.
    pub credentials: Credentials,
    /// Quote provider settings.
    pub quote_source: QuoteSourceSettings,
    /// Poller settings.
    pub poller: PollerSettings,
    /// Server settings.
    pub server: ServerSettings,
    /// Optional JSON holdings seed file.
    pub portfolio_seed_path: Option<PathBuf>,
}

impl Default for Credentials {
    fn default() -> Self {
        Self::new(DEMO_API_KEY.to_string())
    }
}

impl AlertServiceConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but out of range.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let api_key = env
            .string("ALPHA_VANTAGE_API_KEY")
            .unwrap_or_else(|| DEMO_API_KEY.to_string());

        let poller_defaults = PollerSettings::default();
        let poller = PollerSettings {
            interval: env.positive_secs("PRICE_POLL_INTERVAL_SECS", poller_defaults.interval)?,
            threshold_pct: env.threshold("PRICE_ALERT_THRESHOLD_PCT", poller_defaults.threshold_pct)?,
            max_concurrency: env.positive_usize(
                "PRICE_POLL_MAX_CONCURRENCY",
                poller_defaults.max_concurrency,
            )?,
            quote_timeout: env.positive_secs("QUOTE_FETCH_TIMEOUT_SECS", poller_defaults.quote_timeout)?,
            store_timeout: env.positive_secs(
                "PORTFOLIO_STORE_TIMEOUT_SECS",
                poller_defaults.store_timeout,
            )?,
        };

        let quote_source = QuoteSourceSettings {
            base_url: env
                .string("ALPHA_VANTAGE_BASE_URL")
                .map_or_else(|| QuoteSourceSettings::default().base_url, |url| {
                    url.trim_end_matches('/').to_string()
                }),
            request_timeout: poller.quote_timeout,
        };

        let server_defaults = ServerSettings::default();
        let server = ServerSettings {
            gateway_port: env.parsed("PORT", server_defaults.gateway_port),
            health_port: env.parsed("ALERTS_HEALTH_PORT", server_defaults.health_port),
            outbound_buffer: env.positive_usize("OUTBOUND_BUFFER", server_defaults.outbound_buffer)?,
        };

        Ok(Self {
            credentials: Credentials::new(api_key),
            quote_source,
            poller,
            server,
            portfolio_seed_path: env.string("PORTFOLIO_SEED_PATH").map(PathBuf::from),
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable parsed but is out of range.
    #[error("invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Raw value.
        value: String,
        /// Why it was rejected.
        reason: &'static str,
    },
}

/// Environment reader over a key lookup.
struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Non-blank trimmed value.
    fn string(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parsed<T: FromStr>(&self, key: &str, default: T) -> T {
        let Some(raw) = self.string(key) else {
            return default;
        };
        raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Unparseable configuration value, using default");
            default
        })
    }

    fn positive_usize(&self, key: &str, default: usize) -> Result<usize, ConfigError> {
        let value = self.parsed(key, default);
        if value == 0 {
            return Err(invalid(key, "0", "must be greater than zero"));
        }
        Ok(value)
    }

    fn positive_secs(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        let secs = self.parsed(key, default.as_secs());
        if secs == 0 {
            return Err(invalid(key, "0", "must be greater than zero"));
        }
        Ok(Duration::from_secs(secs))
    }

    fn threshold(&self, key: &str, default: Decimal) -> Result<Decimal, ConfigError> {
        let value = self.parsed(key, default);
        if value.is_sign_negative() && !value.is_zero() {
            return Err(invalid(key, &value.to_string(), "must not be negative"));
        }
        Ok(value)
    }
}

fn invalid(key: &str, value: &str, reason: &'static str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason,
    }
}
