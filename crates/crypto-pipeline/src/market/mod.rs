//! Market Data Integration
//!
//! Abstraction over price providers plus the symbol → provider-id table.

mod coingecko;
mod mock;

pub use coingecko::{CoinGeckoClient, CoinGeckoConfig};
pub use mock::MockMarketSource;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::{PipelineError, Result};
use crate::model::{Candle, CandleWindow, DateRange, MarketChart, Quote};

/// Ticker symbol → CoinGecko coin id
pub const COIN_MAPPING: [(&str, &str); 11] = [
    ("BTC", "bitcoin"),
    ("ETH", "ethereum"),
    ("SOL", "solana"),
    ("USDT", "tether"),
    ("USDC", "usd-coin"),
    ("BNB", "binancecoin"),
    ("XRP", "ripple"),
    ("ADA", "cardano"),
    ("DOGE", "dogecoin"),
    ("DOT", "polkadot"),
    ("AVAX", "avalanche-2"),
];

/// Resolve a ticker symbol (case-insensitive) or a known coin id to a coin id
pub fn resolve_coin_id(symbol: &str) -> Result<&'static str> {
    let upper = symbol.trim().to_uppercase();
    let lower = symbol.trim().to_lowercase();
    COIN_MAPPING
        .iter()
        .find(|(sym, id)| *sym == upper || *id == lower)
        .map(|(_, id)| *id)
        .ok_or_else(|| PipelineError::UnknownSymbol(symbol.to_string()))
}

/// Canonical ticker symbol for a coin id
pub fn symbol_for(id: &str) -> Option<&'static str> {
    COIN_MAPPING.iter().find(|(_, i)| *i == id).map(|(sym, _)| *sym)
}

/// Price provider (Strategy pattern)
///
/// Implement this for each data provider: CoinGecko, a test double, ...
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Current quotes keyed by coin id
    async fn latest_quotes(&self, ids: &[&str], currency: &str) -> Result<HashMap<String, Quote>>;

    /// Historical prices over a date range
    async fn market_chart_range(
        &self,
        id: &str,
        range: &DateRange,
        currency: &str,
    ) -> Result<MarketChart>;

    /// OHLC(V) candles for the last `window` days
    async fn ohlcv(&self, id: &str, currency: &str, window: CandleWindow) -> Result<Vec<Candle>>;

    /// Check if the provider is reachable
    async fn health_check(&self) -> bool;

    /// Provider name
    fn name(&self) -> &str;
}
