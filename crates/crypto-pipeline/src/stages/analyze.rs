//! Analyze stage
//!
//! Indicators plus a model-written narrative for each watch-list coin that
//! has cached chart data. A coin without data is skipped and reported; a
//! failed narration is replaced by an inline error text.

use std::sync::Arc;

use agent_core::{GenerationOptions, LlmProvider};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use super::{Stage, errors_value};
use crate::error::{PipelineError, Result};
use crate::indicators::{Trend, moving_average, rsi_default, support_resistance, trend};
use crate::model::{AnalysisRecord, CryptoData, Indicators};
use crate::prompts::{TECHNICAL_ANALYSIS_SYSTEM, technical_analysis_prompt};
use crate::state::{PipelineState, StateUpdate};

/// Number of most recent chart points fed to the indicators
pub const SERIES_WINDOW: usize = 7;

pub struct AnalyzeStage {
    provider: Arc<dyn LlmProvider>,
    watch_list: Vec<String>,
    options: GenerationOptions,
}

impl AnalyzeStage {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        watch_list: Vec<String>,
        options: GenerationOptions,
    ) -> Self {
        Self {
            provider,
            watch_list: watch_list
                .iter()
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect(),
            options,
        }
    }

    /// The watch-list and the query are configured separately; say so when they differ
    fn log_divergence(&self, query: &[String]) {
        let upper: Vec<String> = query.iter().map(|s| s.trim().to_uppercase()).collect();
        let not_watched: Vec<&str> = upper
            .iter()
            .filter(|s| !self.watch_list.contains(s))
            .map(String::as_str)
            .collect();
        if !not_watched.is_empty() {
            tracing::warn!(symbols = ?not_watched, "Requested symbols are not on the watch-list and will not be analyzed");
        }

        let not_requested: Vec<&str> = self
            .watch_list
            .iter()
            .filter(|s| !upper.contains(s))
            .map(String::as_str)
            .collect();
        if !not_requested.is_empty() {
            tracing::debug!(symbols = ?not_requested, "Watch-list symbols analyzed from cache only");
        }
    }

    async fn analyze_coin(&self, coin: &str, data: &CryptoData) -> Result<AnalysisRecord> {
        let chart = data
            .get(coin)
            .and_then(|d| d.market_chart.as_ref())
            .ok_or(PipelineError::InsufficientData {
                indicator: "price series",
                needed: SERIES_WINDOW,
                available: 0,
            })?;

        let prices = chart.last_prices(SERIES_WINDOW);
        let Some(&current_price) = prices.last() else {
            return Err(PipelineError::InsufficientData {
                indicator: "price series",
                needed: SERIES_WINDOW,
                available: 0,
            });
        };

        let indicators = Indicators {
            ma7: moving_average(&prices, 7)?,
            ma3: moving_average(&prices, 3)?,
            rsi: rsi_default(&prices),
        };
        let levels = support_resistance(&prices)?;
        tracing::debug!(
            coin,
            ma7 = indicators.ma7,
            ma3 = indicators.ma3,
            rsi = indicators.rsi,
            support = levels.support,
            resistance = levels.resistance,
            "Indicators computed"
        );

        let volumes: Vec<f64> = {
            let start = chart.total_volumes.len().saturating_sub(SERIES_WINDOW);
            chart.total_volumes[start..].iter().map(|p| p.value()).collect()
        };
        let volume_trend = if volumes.len() >= 2 {
            trend(&volumes)
        } else {
            Trend::Neutral
        };
        let volume_series = if volumes.is_empty() {
            vec![0.0; prices.len()]
        } else {
            volumes
        };

        let market_data = json!({
            "price": {
                "current": current_price,
                "historical": prices,
            },
            "market_chart": {
                "price_trend": trend(&prices),
                "volume_trend": volume_trend,
            },
            "ohlcv": {
                "close": prices,
                "volume": volume_series,
            }
        });
        let prompt = technical_analysis_prompt(coin, &serde_json::to_string_pretty(&market_data)?);

        let llm_analysis = match self
            .provider
            .prompt(TECHNICAL_ANALYSIS_SYSTEM, &prompt, &self.options)
            .await
        {
            Ok(completion) => completion.content,
            Err(e) => {
                tracing::warn!(coin, error = %e, "Narration failed");
                format!("Error generating LLM analysis: {e}")
            }
        };

        Ok(AnalysisRecord {
            coin: coin.to_string(),
            current_price,
            indicators,
            levels,
            llm_analysis,
        })
    }
}

fn summary_line(record: &AnalysisRecord) -> String {
    format!(
        "{}: price ${:.2}, RSI {:.1}, MA7 ${:.2}, MA3 ${:.2}, support ${:.2}, resistance ${:.2}",
        record.coin,
        record.current_price,
        record.indicators.rsi,
        record.indicators.ma7,
        record.indicators.ma3,
        record.levels.support,
        record.levels.resistance,
    )
}

#[async_trait]
impl Stage for AnalyzeStage {
    fn name(&self) -> &'static str {
        "analyze"
    }

    async fn run(&self, state: &PipelineState) -> StateUpdate {
        self.log_divergence(&state.query);

        let mut records = Vec::new();
        let mut errors = Vec::new();
        for coin in &self.watch_list {
            match self.analyze_coin(coin, &state.crypto_data).await {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(coin = %coin, error = %e, "Skipping coin");
                    errors.push(format!("{coin}: {e}"));
                }
            }
        }

        let mut content = format!(
            "Technical analysis completed for {} of {} watch-list coins.\n",
            records.len(),
            self.watch_list.len()
        );
        for record in &records {
            content.push('\n');
            content.push_str(&summary_line(record));
        }
        if !errors.is_empty() {
            content.push_str("\n\nSkipped:\n");
            content.push_str(&errors.join("\n"));
        }

        let coins: Vec<String> = records.iter().map(|r| r.coin.clone()).collect();
        let mut update = StateUpdate {
            technical_analysis: Some(records),
            ..StateUpdate::message(content)
        }
        .with_meta("timestamp", Utc::now().to_rfc3339())
        .with_meta("model", self.options.model.as_str())
        .with_meta("watch_list", self.watch_list.clone())
        .with_meta("coins_analyzed", coins.clone())
        .with_meta("errors", errors_value(&errors));

        if coins.is_empty() {
            let reason = if errors.is_empty() {
                "Watch-list is empty".to_string()
            } else {
                format!("No coin could be analyzed:\n{}", errors.join("\n"))
            };
            update = update.with_error(reason);
        }
        update
    }
}
