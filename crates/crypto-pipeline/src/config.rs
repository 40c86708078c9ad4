//! Pipeline configuration
//!
//! Read from the environment. Every setting has a default, so an empty
//! environment yields a working configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use agent_core::GenerationOptions;

use crate::error::{PipelineError, Result};
use crate::model::CandleWindow;
use crate::retry::RetryPolicy;
use crate::stages::FetchSettings;

/// Coins the analyze stage looks at, independent of the request
pub const DEFAULT_WATCH_LIST: [&str; 10] = [
    "BTC", "ETH", "BNB", "SOL", "XRP", "USDC", "USDT", "ADA", "AVAX", "DOGE",
];

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub watch_list: Vec<String>,
    pub vs_currency: String,
    pub candle_window: CandleWindow,
    pub data_dir: PathBuf,
    pub data_file: String,
    pub retry: RetryPolicy,
    pub symbol_delay: Duration,
    /// Model override; `None` means the provider's default
    pub llm_model: Option<String>,
    pub llm_temperature: f32,
    pub review_enabled: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            watch_list: DEFAULT_WATCH_LIST.iter().map(ToString::to_string).collect(),
            vs_currency: "usd".into(),
            candle_window: CandleWindow::default(),
            data_dir: PathBuf::from("data"),
            data_file: "crypto_data.json".into(),
            retry: RetryPolicy::default(),
            symbol_delay: Duration::from_secs(1),
            llm_model: None,
            llm_temperature: 0.7,
            review_enabled: false,
        }
    }
}

fn parse<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| PipelineError::Config(format!("invalid value for {key}: '{raw}'")))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(PipelineError::Config(format!("invalid value for {key}: '{raw}'"))),
    }
}

/// Upper-cased, trimmed, empties dropped
pub fn parse_symbol_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value source; unset or blank keys keep their default
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(raw) = get("WATCH_LIST") {
            config.watch_list = parse_symbol_list(&raw);
        }
        if let Some(raw) = get("VS_CURRENCY") {
            config.vs_currency = raw.trim().to_lowercase();
        }
        if let Some(raw) = get("CANDLE_DAYS") {
            let days: u16 = parse("CANDLE_DAYS", &raw)?;
            config.candle_window = CandleWindow::new(days)
                .map_err(|e| PipelineError::Config(format!("CANDLE_DAYS: {e}")))?;
        }
        if let Some(raw) = get("DATA_DIR") {
            config.data_dir = PathBuf::from(raw.trim());
        }
        if let Some(raw) = get("DATA_FILE") {
            config.data_file = raw.trim().to_string();
        }
        if let Some(raw) = get("RATE_LIMIT_MAX_ATTEMPTS") {
            config.retry.max_attempts = parse("RATE_LIMIT_MAX_ATTEMPTS", &raw)?;
            if config.retry.max_attempts == 0 {
                return Err(PipelineError::Config(
                    "RATE_LIMIT_MAX_ATTEMPTS must be at least 1".into(),
                ));
            }
        }
        if let Some(raw) = get("RATE_LIMIT_BACKOFF_SECS") {
            config.retry.backoff = Duration::from_secs(parse("RATE_LIMIT_BACKOFF_SECS", &raw)?);
        }
        if let Some(raw) = get("SYMBOL_DELAY_MS") {
            config.symbol_delay = Duration::from_millis(parse("SYMBOL_DELAY_MS", &raw)?);
        }
        if let Some(raw) = get("LLM_MODEL") {
            config.llm_model = Some(raw.trim().to_string());
        }
        if let Some(raw) = get("LLM_TEMPERATURE") {
            config.llm_temperature = parse("LLM_TEMPERATURE", &raw)?;
        }
        if let Some(raw) = get("REVIEW_ENABLED") {
            config.review_enabled = parse_bool("REVIEW_ENABLED", &raw)?;
        }

        Ok(config)
    }

    /// Generation options, falling back to `default_model` when no override is set
    pub fn generation_options(&self, default_model: &str) -> GenerationOptions {
        GenerationOptions::default()
            .with_model(self.llm_model.as_deref().unwrap_or(default_model))
            .with_temperature(self.llm_temperature)
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            currency: self.vs_currency.clone(),
            candle_window: self.candle_window,
            data_file: self.data_file.clone(),
            retry: self.retry,
            symbol_delay: self.symbol_delay,
        }
    }
}
