//! Configuration Module
//!
//! Configuration loading for the price-alert service.

mod settings;

pub use settings::{
    AlertServiceConfig, ConfigError, Credentials, DEMO_API_KEY, PollerSettings,
    QuoteSourceSettings, ServerSettings,
};
