//! Mock Market Source
//!
//! For tests and offline demos. Returns static quotes and deterministic
//! synthetic series, with optional rate-limit and failure injection.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{Duration, NaiveTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal_macros::dec;

use super::MarketDataSource;
use crate::error::{PipelineError, Result};
use crate::model::{Candle, CandleWindow, DateRange, MarketChart, PricePoint, Quote};

const DAY_MS: i64 = 86_400_000;

/// Mock market source with static prices
#[derive(Default)]
pub struct MockMarketSource {
    /// Calls (of any kind) that still answer with HTTP 429
    rate_limited_calls: AtomicUsize,
    failing_ids: HashSet<String>,
    calls: AtomicUsize,
}

impl MockMarketSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` calls fail with a rate-limit error
    #[must_use]
    pub fn with_rate_limits(self, n: usize) -> Self {
        self.rate_limited_calls.store(n, Ordering::SeqCst);
        self
    }

    /// Every call for `id` fails with a transport error
    #[must_use]
    pub fn failing_for(mut self, id: impl Into<String>) -> Self {
        self.failing_ids.insert(id.into());
        self
    }

    /// Total calls received, including failed ones
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// (price, symbol, name)
    fn base_price(id: &str) -> Option<(Decimal, &'static str, &'static str)> {
        match id {
            "bitcoin" => Some((dec!(97500), "btc", "Bitcoin")),
            "ethereum" => Some((dec!(3450), "eth", "Ethereum")),
            "solana" => Some((dec!(195), "sol", "Solana")),
            "tether" => Some((dec!(1.00), "usdt", "Tether")),
            "usd-coin" => Some((dec!(1.00), "usdc", "USDC")),
            "binancecoin" => Some((dec!(690), "bnb", "BNB")),
            "ripple" => Some((dec!(2.35), "xrp", "XRP")),
            "cardano" => Some((dec!(0.95), "ada", "Cardano")),
            "dogecoin" => Some((dec!(0.38), "doge", "Dogecoin")),
            "polkadot" => Some((dec!(7.20), "dot", "Polkadot")),
            "avalanche-2" => Some((dec!(42.00), "avax", "Avalanche")),
            _ => None,
        }
    }

    /// Count the call and apply injected failures
    fn check(&self, id: &str) -> Result<(Decimal, &'static str, &'static str)> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let limited = self
            .rate_limited_calls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if limited {
            return Err(PipelineError::RateLimited {
                status: 429,
                body: "You've exceeded the Rate Limit".into(),
            });
        }

        if self.failing_ids.contains(id) {
            return Err(PipelineError::Transport {
                status: 500,
                body: format!("upstream failure for {id}"),
            });
        }

        Self::base_price(id).ok_or_else(|| PipelineError::Transport {
            status: 404,
            body: "coin not found".into(),
        })
    }

    /// Deterministic wiggle around the base price
    fn synthetic_price(base: f64, step: i64) -> f64 {
        let wave = [0.0, 0.012, -0.008, 0.02, -0.015, 0.005, 0.01];
        let idx = usize::try_from(step.rem_euclid(7)).unwrap_or(0);
        base * (1.0 + wave[idx])
    }
}

#[async_trait]
impl MarketDataSource for MockMarketSource {
    async fn latest_quotes(&self, ids: &[&str], _currency: &str) -> Result<HashMap<String, Quote>> {
        let mut quotes = HashMap::new();
        for id in ids {
            let (price, symbol, name) = self.check(id)?;
            quotes.insert(
                (*id).to_string(),
                Quote {
                    id: (*id).to_string(),
                    symbol: symbol.into(),
                    name: name.into(),
                    current_price: Some(price),
                    market_cap: None,
                    total_volume: None,
                    high_24h: None,
                    low_24h: None,
                    price_change_percentage_24h: Some(dec!(1.5)),
                    last_updated: Some(Utc::now()),
                },
            );
        }
        Ok(quotes)
    }

    async fn market_chart_range(
        &self,
        id: &str,
        range: &DateRange,
        _currency: &str,
    ) -> Result<MarketChart> {
        let (base, _, _) = self.check(id)?;
        let base = base.to_f64().unwrap_or_default();

        let days = (range.to - range.from).num_days();
        let start_ms = range.from.and_time(NaiveTime::MIN).and_utc().timestamp_millis();
        let prices = (0..=days)
            .map(|d| PricePoint(start_ms + d * DAY_MS, Self::synthetic_price(base, d)))
            .collect();

        Ok(MarketChart {
            prices,
            ..Default::default()
        })
    }

    async fn ohlcv(&self, id: &str, _currency: &str, window: CandleWindow) -> Result<Vec<Candle>> {
        let (base, _, _) = self.check(id)?;
        let base = base.to_f64().unwrap_or_default();

        let days = i64::from(window.days());
        let start = (Utc::now() - Duration::days(days)).timestamp_millis();
        Ok((0..days)
            .map(|d| {
                let open = Self::synthetic_price(base, d);
                let close = Self::synthetic_price(base, d + 1);
                Candle {
                    time: start + d * DAY_MS,
                    open,
                    high: open.max(close) * 1.01,
                    low: open.min(close) * 0.99,
                    close,
                    volume: None,
                }
            })
            .collect())
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "MockMarket"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[tokio::test]
    async fn test_mock_quotes() {
        let source = MockMarketSource::new();
        let quotes = source.latest_quotes(&["bitcoin"], "usd").await.unwrap();
        assert_eq!(quotes["bitcoin"].current_price, Some(dec!(97500)));
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_rate_limits_are_consumed() {
        let source = MockMarketSource::new().with_rate_limits(2);
        for _ in 0..2 {
            let err = source.latest_quotes(&["bitcoin"], "usd").await.unwrap_err();
            assert!(err.is_rate_limited());
        }
        assert!(source.latest_quotes(&["bitcoin"], "usd").await.is_ok());
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn test_chart_has_one_point_per_day() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let range = DateRange::last_days(7, today).unwrap();
        let chart = MockMarketSource::new()
            .market_chart_range("ethereum", &range, "usd")
            .await
            .unwrap();
        assert_eq!(chart.prices.len(), 8);
        assert!(chart.prices.windows(2).all(|w| w[1].0 - w[0].0 == DAY_MS));
    }

    #[tokio::test]
    async fn test_failing_id() {
        let source = MockMarketSource::new().failing_for("solana");
        let err = source
            .ohlcv("solana", "usd", CandleWindow::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Transport { status: 500, .. }));
    }
}
