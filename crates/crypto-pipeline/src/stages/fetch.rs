//! Fetch stage
//!
//! For every requested symbol: current quote, historical chart and candles,
//! each fetched and retried on its own. One bad symbol or data type never
//! stops the others. Every successful fetch is persisted right away.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use super::{Stage, errors_value, failure};
use crate::error::{PipelineError, Result};
use crate::market::{MarketDataSource, resolve_coin_id, symbol_for};
use crate::model::{
    CandleWindow, CoinData, CryptoData, CryptoPrices, DateRange, merge_crypto_data,
};
use crate::retry::RetryPolicy;
use crate::state::{PipelineState, StateUpdate};
use crate::store::MarketDataStore;

#[derive(Clone, Debug)]
pub struct FetchSettings {
    pub currency: String,
    pub candle_window: CandleWindow,
    /// Store key for the market data cache
    pub data_file: String,
    pub retry: RetryPolicy,
    /// Pause between symbols, successful or not
    pub symbol_delay: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            currency: "usd".into(),
            candle_window: CandleWindow::default(),
            data_file: "crypto_data.json".into(),
            retry: RetryPolicy::default(),
            symbol_delay: Duration::from_secs(1),
        }
    }
}

pub struct FetchStage {
    source: Arc<dyn MarketDataSource>,
    store: Arc<dyn MarketDataStore>,
    settings: FetchSettings,
}

/// Per-run accumulators
#[derive(Default)]
struct Progress {
    processed: Vec<String>,
    coin_ids: Vec<&'static str>,
    errors: Vec<String>,
    rate_limit_waits: usize,
}

impl FetchStage {
    pub fn new(
        source: Arc<dyn MarketDataSource>,
        store: Arc<dyn MarketDataStore>,
        settings: FetchSettings,
    ) -> Self {
        Self {
            source,
            store,
            settings,
        }
    }

    /// Merge one symbol's fresh data into the working set and persist it
    fn record(&self, data: &mut CryptoData, symbol: &str, fresh: CoinData) {
        let delta = CryptoData::from([(symbol.to_string(), fresh)]);
        if let Err(e) = self.store.save(&self.settings.data_file, &delta) {
            tracing::warn!(symbol, error = %e, "Failed to persist market data");
        }
        merge_crypto_data(data, delta);
    }

    async fn fetch_symbol(
        &self,
        symbol: &str,
        id: &'static str,
        range: &DateRange,
        data: &mut CryptoData,
        prices: &mut CryptoPrices,
        progress: &mut Progress,
    ) {
        let currency = self.settings.currency.as_str();
        let retry = self.settings.retry;
        let waits = &mut progress.rate_limit_waits;

        // 1. current quote
        let ids = [id];
        match retry
            .run(|| self.source.latest_quotes(&ids, currency), |_, _| *waits += 1)
            .await
        {
            Ok(mut quotes) => match quotes.remove(id) {
                Some(quote) => {
                    if let Some(price) = quote.current_price {
                        prices.insert(symbol.to_string(), price);
                    }
                    self.record(
                        data,
                        symbol,
                        CoinData {
                            price: Some(quote),
                            ..Default::default()
                        },
                    );
                    tracing::debug!(symbol, "Price data fetched");
                }
                None => progress.errors.push(format!("No price data found for {symbol}")),
            },
            Err(e) => progress
                .errors
                .push(format!("Error fetching price data for {symbol}: {e}")),
        }

        // 2. historical chart
        match retry
            .run(
                || self.source.market_chart_range(id, range, currency),
                |_, _| *waits += 1,
            )
            .await
        {
            Ok(chart) if !chart.prices.is_empty() => {
                self.record(
                    data,
                    symbol,
                    CoinData {
                        market_chart: Some(chart),
                        ..Default::default()
                    },
                );
                tracing::debug!(symbol, "Market chart fetched");
            }
            Ok(_) => progress
                .errors
                .push(format!("No market chart data found for {symbol}")),
            Err(e) => progress
                .errors
                .push(format!("Error fetching market chart data for {symbol}: {e}")),
        }

        // 3. candles
        let window = self.settings.candle_window;
        match retry
            .run(|| self.source.ohlcv(id, currency, window), |_, _| *waits += 1)
            .await
        {
            Ok(candles) if !candles.is_empty() => {
                self.record(
                    data,
                    symbol,
                    CoinData {
                        ohlcv: Some(candles),
                        ..Default::default()
                    },
                );
                tracing::debug!(symbol, "OHLCV fetched");
            }
            Ok(_) => progress
                .errors
                .push(format!("No OHLCV data found for {symbol}")),
            Err(e) => progress
                .errors
                .push(format!("Error fetching OHLCV data for {symbol}: {e}")),
        }
    }

    async fn fetch(&self, state: &PipelineState) -> Result<StateUpdate> {
        if state.query.is_empty() {
            return Err(PipelineError::InvalidRequest("no symbols requested".into()));
        }

        let range = DateRange::last_days(
            self.settings.candle_window.days(),
            Utc::now().date_naive(),
        )?;

        let mut data = self.store.load(&self.settings.data_file).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Could not load cached market data, starting empty");
            CryptoData::new()
        });
        tracing::info!(cached_symbols = data.len(), "Loaded cached market data");
        merge_crypto_data(&mut data, state.crypto_data.clone());

        let mut prices = state.crypto_prices.clone();
        let mut progress = Progress::default();

        for raw in &state.query {
            let id = match resolve_coin_id(raw) {
                Ok(id) => id,
                Err(e) => {
                    tracing::warn!(symbol = %raw, "Unknown symbol, skipping");
                    progress.errors.push(format!("Invalid symbol in query: {e}"));
                    continue;
                }
            };

            if progress.coin_ids.contains(&id) {
                tracing::debug!(symbol = %raw, coin_id = id, "Duplicate of an earlier symbol, skipping");
                continue;
            }
            // pause between fetched symbols, never before the first
            if !progress.coin_ids.is_empty() && !self.settings.symbol_delay.is_zero() {
                tokio::time::sleep(self.settings.symbol_delay).await;
            }

            // "bitcoin" and "btc" both land under "BTC"
            let symbol = symbol_for(id).map_or_else(|| raw.trim().to_uppercase(), str::to_string);
            tracing::info!(symbol = %symbol, coin_id = id, "Fetching market data");
            progress.coin_ids.push(id);

            self.fetch_symbol(&symbol, id, &range, &mut data, &mut prices, &mut progress)
                .await;
            progress.processed.push(symbol);
        }

        let data_file = match self.store.save(&self.settings.data_file, &data) {
            Ok(location) => location,
            Err(e) => {
                tracing::warn!(error = %e, "Final save of market data failed");
                String::new()
            }
        };

        let Progress {
            processed,
            coin_ids,
            errors,
            rate_limit_waits,
        } = progress;

        let mut content = format!(
            "Data retrieved for {} out of {} cryptocurrencies.\n",
            processed.len(),
            state.query.len()
        );
        if !processed.is_empty() {
            let mut sorted = processed.clone();
            sorted.sort();
            content.push_str(&format!("Successfully processed: {}\n", sorted.join(", ")));
        }
        if !errors.is_empty() {
            content.push_str("\nErrors:\n");
            content.push_str(&errors.join("\n"));
        }

        let mut update = StateUpdate {
            crypto_data: Some(data),
            crypto_prices: Some(prices),
            ..StateUpdate::message(content)
        }
        .with_meta("timestamp", Utc::now().to_rfc3339())
        .with_meta("source", self.source.name())
        .with_meta("symbols", state.query.clone())
        .with_meta("processed_symbols", processed)
        .with_meta("coin_ids", coin_ids)
        .with_meta("errors", errors_value(&errors))
        .with_meta("data_file", data_file)
        .with_meta("rate_limit_waits", rate_limit_waits);

        if !errors.is_empty() {
            update = update.with_error(errors.join("\n"));
        }
        Ok(update)
    }
}

#[async_trait]
impl Stage for FetchStage {
    fn name(&self) -> &'static str {
        "fetch"
    }

    async fn run(&self, state: &PipelineState) -> StateUpdate {
        match self.fetch(state).await {
            Ok(update) => update,
            Err(e) => {
                tracing::error!(error = %e, "Fetch stage failed");
                failure("I encountered an error while fetching cryptocurrency data", &e)
                    .with_meta("symbols", state.query.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::MockMarketSource;
    use crate::model::RiskProfile;
    use crate::store::MemoryStore;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    fn stage(source: MockMarketSource, store: Arc<MemoryStore>) -> FetchStage {
        FetchStage::new(Arc::new(source), store, no_delay())
    }

    fn state(symbols: &[&str]) -> PipelineState {
        PipelineState::new(
            symbols.iter().map(ToString::to_string).collect(),
            RiskProfile::default(),
        )
    }

    #[tokio::test]
    async fn test_unknown_symbol_does_not_block_others() {
        let store = Arc::new(MemoryStore::new());
        let update = stage(MockMarketSource::new(), store.clone())
            .run(&state(&["BTC", "FAKE"]))
            .await;

        let data = update.crypto_data.unwrap();
        let btc = &data["BTC"];
        assert!(btc.price.is_some() && btc.market_chart.is_some() && btc.ohlcv.is_some());
        assert!(!data.contains_key("FAKE"));
        assert_eq!(update.crypto_prices.unwrap()["BTC"], dec!(97500));

        let error = update.error.unwrap();
        assert!(error.contains("FAKE"));
        assert!(!error.contains("BTC"));

        let content = &update.messages[0].content;
        assert!(content.starts_with("Data retrieved for 1 out of 2 cryptocurrencies."));
        assert!(content.contains("Successfully processed: BTC"));
        assert!(content.contains("Invalid symbol in query: Invalid cryptocurrency symbol: FAKE"));

        assert_eq!(update.metadata["processed_symbols"], serde_json::json!(["BTC"]));
        assert_eq!(update.metadata["coin_ids"], serde_json::json!(["bitcoin"]));
        assert_eq!(update.metadata["source"], "MockMarket");
        assert_eq!(update.metadata["data_file"], "memory://crypto_data.json");

        assert!(store.load("crypto_data.json").unwrap().contains_key("BTC"));
    }

    #[tokio::test]
    async fn test_clean_run_clears_error() {
        let update = stage(MockMarketSource::new(), Arc::new(MemoryStore::new()))
            .run(&state(&["eth", "SOL"]))
            .await;
        assert!(update.error.is_none());
        assert!(update.metadata["errors"].is_null());
        let data = update.crypto_data.unwrap();
        assert!(data.contains_key("ETH") && data.contains_key("SOL"));
    }

    #[tokio::test]
    async fn test_failing_data_type_is_recorded_per_symbol() {
        let update = stage(
            MockMarketSource::new().failing_for("solana"),
            Arc::new(MemoryStore::new()),
        )
        .run(&state(&["SOL", "BTC"]))
        .await;

        let error = update.error.unwrap();
        assert!(error.contains("Error fetching price data for SOL"));
        assert!(error.contains("Error fetching market chart data for SOL"));
        assert!(error.contains("Error fetching OHLCV data for SOL"));
        // attempted, so still counted as processed
        assert_eq!(
            update.metadata["processed_symbols"],
            serde_json::json!(["SOL", "BTC"])
        );
        assert!(update.crypto_data.unwrap()["BTC"].price.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_waits_are_counted() {
        let update = stage(
            MockMarketSource::new().with_rate_limits(2),
            Arc::new(MemoryStore::new()),
        )
        .run(&state(&["BTC"]))
        .await;

        assert!(update.error.is_none());
        assert_eq!(update.metadata["rate_limit_waits"], 2);
        assert!(update.crypto_data.unwrap()["BTC"].price.is_some());
    }

    #[tokio::test]
    async fn test_empty_query_is_stage_failure() {
        let update = stage(MockMarketSource::new(), Arc::new(MemoryStore::new()))
            .run(&state(&[]))
            .await;
        assert!(update.crypto_data.is_none());
        assert_eq!(update.metadata["error_type"], "InvalidRequestError");
        assert!(
            update.messages[0]
                .content
                .starts_with("I encountered an error while fetching cryptocurrency data:")
        );
    }

    #[tokio::test]
    async fn test_cached_symbols_are_kept() {
        let cached = CryptoData::from([("DOGE".to_string(), CoinData::default())]);
        let store = Arc::new(MemoryStore::with_entry("crypto_data.json", cached));
        let update = stage(MockMarketSource::new(), store)
            .run(&state(&["BTC"]))
            .await;
        let data = update.crypto_data.unwrap();
        assert!(data.contains_key("DOGE"));
        assert!(data.contains_key("BTC"));
    }

    /// Memory store that counts saves and can start failing at a given save
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore,
        saves: AtomicUsize,
        fail_from: Option<usize>,
    }

    impl MarketDataStore for CountingStore {
        fn load(&self, key: &str) -> Result<CryptoData> {
            self.inner.load(key)
        }

        fn save(&self, key: &str, data: &CryptoData) -> Result<String> {
            let n = self.saves.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_from.is_some_and(|from| n >= from) {
                return Err(std::io::Error::other("disk full").into());
            }
            self.inner.save(key, data)
        }
    }

    fn no_delay() -> FetchSettings {
        FetchSettings {
            symbol_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_aliases_of_one_coin_are_fetched_once() {
        let market = Arc::new(MockMarketSource::new());
        let update = FetchStage::new(market.clone(), Arc::new(MemoryStore::new()), no_delay())
            .run(&state(&["BTC", "bitcoin", "btc"]))
            .await;

        assert_eq!(market.calls(), 3);
        assert_eq!(update.metadata["processed_symbols"], serde_json::json!(["BTC"]));
        assert_eq!(update.metadata["coin_ids"], serde_json::json!(["bitcoin"]));
        assert!(update.messages[0].content.contains("Successfully processed: BTC\n"));
        assert!(update.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_only_between_fetched_symbols() {
        let stage = FetchStage::new(
            Arc::new(MockMarketSource::new()),
            Arc::new(MemoryStore::new()),
            FetchSettings::default(),
        );

        let started = Instant::now();
        stage.run(&state(&["BTC"])).await;
        assert!(started.elapsed() < Duration::from_secs(1));

        // an unknown first entry does not count as a fetched symbol
        let started = Instant::now();
        stage.run(&state(&["FAKE", "BTC"])).await;
        assert!(started.elapsed() < Duration::from_secs(1));

        let started = Instant::now();
        let update = stage.run(&state(&["BTC", "ETH"])).await;
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(1));
        assert!(elapsed < Duration::from_secs(2));
        assert!(update.error.is_none());
    }

    #[tokio::test]
    async fn test_each_successful_fetch_is_saved() {
        let store = Arc::new(CountingStore::default());
        let update = FetchStage::new(
            Arc::new(MockMarketSource::new().failing_for("solana")),
            store.clone(),
            no_delay(),
        )
        .run(&state(&["BTC", "SOL", "ETH"]))
        .await;

        // 3 fetches each for BTC and ETH, none for SOL, then the final save
        assert_eq!(store.saves.load(Ordering::SeqCst), 7);
        assert!(update.error.unwrap().contains("SOL"));
    }

    #[tokio::test]
    async fn test_saved_data_survives_later_store_failure() {
        let store = Arc::new(CountingStore {
            fail_from: Some(4),
            ..Default::default()
        });
        let update = FetchStage::new(Arc::new(MockMarketSource::new()), store.clone(), no_delay())
            .run(&state(&["BTC", "ETH"]))
            .await;

        let stored = store.load("crypto_data.json").unwrap();
        let btc = &stored["BTC"];
        assert!(btc.price.is_some() && btc.market_chart.is_some() && btc.ohlcv.is_some());
        assert!(!stored.contains_key("ETH"));

        // the run itself still has everything, only the final location is missing
        assert!(update.crypto_data.unwrap().contains_key("ETH"));
        assert_eq!(update.metadata["data_file"], "");
        assert!(update.error.is_none());
    }
}
