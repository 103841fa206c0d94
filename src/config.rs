// Runtime configuration for the checkout backends

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("Configuration error: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CheckoutConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout_ms: u64,
    // Card-entry automation runs for tens of seconds
    pub card_entry_timeout_ms: u64,
    pub progress_tick_ms: u64,
    pub max_trip_pages: usize,
    pub user_agent: String,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            api_key: String::new(),
            timeout_ms: 20_000,
            card_entry_timeout_ms: 180_000,
            progress_tick_ms: 1_500,
            max_trip_pages: 10,
            user_agent: concat!("checkout-orchestrator/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl CheckoutConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    // Missing keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("CHECKOUT_BASE_URL") {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(key) = lookup("CHECKOUT_API_KEY") {
            config.api_key = key;
        }
        if let Some(raw) = lookup("CHECKOUT_TIMEOUT_MS") {
            config.timeout_ms = parse_number("CHECKOUT_TIMEOUT_MS", &raw)?;
        }
        if let Some(raw) = lookup("CHECKOUT_CARD_ENTRY_TIMEOUT_MS") {
            config.card_entry_timeout_ms = parse_number("CHECKOUT_CARD_ENTRY_TIMEOUT_MS", &raw)?;
        }
        if let Some(raw) = lookup("CHECKOUT_PROGRESS_TICK_MS") {
            config.progress_tick_ms = parse_number("CHECKOUT_PROGRESS_TICK_MS", &raw)?;
        }
        if let Some(raw) = lookup("CHECKOUT_MAX_TRIP_PAGES") {
            config.max_trip_pages = parse_number("CHECKOUT_MAX_TRIP_PAGES", &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("base_url must not be empty".to_string()));
        }
        if self.timeout_ms == 0 || self.card_entry_timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeouts must be positive".to_string()));
        }
        if self.max_trip_pages == 0 {
            return Err(ConfigError::Invalid(
                "max_trip_pages must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn card_entry_timeout(&self) -> Duration {
        Duration::from_millis(self.card_entry_timeout_ms)
    }

    pub fn progress_tick(&self) -> Duration {
        Duration::from_millis(self.progress_tick_ms.max(1))
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
    })
}
