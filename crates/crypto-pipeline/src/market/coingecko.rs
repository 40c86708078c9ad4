//! CoinGecko Client
//!
//! Public REST API v3. Non-2xx responses become `Transport` errors, with 429
//! split out as `RateLimited` so callers can retry it.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;

use super::MarketDataSource;
use crate::error::{PipelineError, Result};
use crate::model::{Candle, CandleWindow, DateRange, MarketChart, Quote};

const BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// CoinGecko connection settings
#[derive(Clone, Debug)]
pub struct CoinGeckoConfig {
    pub base_url: String,

    /// Optional demo API key, sent as `x-cg-demo-api-key`
    pub api_key: Option<String>,

    pub timeout_secs: u64,
}

impl Default for CoinGeckoConfig {
    fn default() -> Self {
        Self {
            base_url: BASE_URL.into(),
            api_key: None,
            timeout_secs: 30,
        }
    }
}

impl CoinGeckoConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("COINGECKO_BASE_URL").unwrap_or_else(|_| BASE_URL.into()),
            api_key: std::env::var("COINGECKO_API_KEY").ok().filter(|k| !k.is_empty()),
            ..Default::default()
        }
    }
}

pub struct CoinGeckoClient {
    client: Client,
    config: CoinGeckoConfig,
}

impl CoinGeckoClient {
    pub fn new(config: CoinGeckoConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(CoinGeckoConfig::from_env())
    }

    async fn make_request<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint);
        tracing::debug!(%url, "CoinGecko request");

        let mut request = self
            .client
            .get(&url)
            .query(params)
            .header("Accept", "application/json");
        if let Some(key) = &self.config.api_key {
            request = request.header("x-cg-demo-api-key", key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(if status == StatusCode::TOO_MANY_REQUESTS {
                PipelineError::RateLimited {
                    status: status.as_u16(),
                    body,
                }
            } else {
                PipelineError::Transport {
                    status: status.as_u16(),
                    body,
                }
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl MarketDataSource for CoinGeckoClient {
    async fn latest_quotes(&self, ids: &[&str], currency: &str) -> Result<HashMap<String, Quote>> {
        let params = [
            ("vs_currency", currency.to_string()),
            ("ids", ids.join(",")),
        ];
        let quotes: Vec<Quote> = self.make_request("/coins/markets", &params).await?;
        Ok(quotes.into_iter().map(|q| (q.id.clone(), q)).collect())
    }

    async fn market_chart_range(
        &self,
        id: &str,
        range: &DateRange,
        currency: &str,
    ) -> Result<MarketChart> {
        let (from, to) = range.unix_bounds();
        let params = [
            ("vs_currency", currency.to_string()),
            ("from", from.to_string()),
            ("to", to.to_string()),
        ];
        self.make_request(&format!("/coins/{id}/market_chart/range"), &params)
            .await
    }

    async fn ohlcv(&self, id: &str, currency: &str, window: CandleWindow) -> Result<Vec<Candle>> {
        let params = [
            ("vs_currency", currency.to_string()),
            ("days", window.to_string()),
        ];
        self.make_request(&format!("/coins/{id}/ohlc"), &params).await
    }

    async fn health_check(&self) -> bool {
        self.make_request::<serde_json::Value>("/ping", &[])
            .await
            .is_ok()
    }

    fn name(&self) -> &str {
        "CoinGecko"
    }
}
