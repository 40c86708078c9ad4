//! Pipeline Orchestrator
//!
//! Runs the stages in order over one state value. A stage's error is kept in
//! the state and the next stage still runs; `run` always returns a state.

use std::sync::Arc;
use std::time::Instant;

use agent_core::{GenerationOptions, LlmProvider};
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::market::{MarketDataSource, resolve_coin_id, symbol_for};
use crate::model::RiskProfile;
use crate::stages::{AnalyzeStage, FetchStage, PlanStage, ReviewStage, Stage};
use crate::state::PipelineState;
use crate::store::{JsonFileStore, MarketDataStore};

/// One pipeline invocation: which symbols, for which risk profile
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRequest {
    #[serde(default = "default_query")]
    pub query: Vec<String>,

    #[serde(default)]
    pub risk_profile: RiskProfile,
}

fn default_query() -> Vec<String> {
    vec!["BTC".into(), "ETH".into()]
}

impl Default for PipelineRequest {
    fn default() -> Self {
        Self {
            query: default_query(),
            risk_profile: RiskProfile::default(),
        }
    }
}

impl PipelineRequest {
    pub fn new(query: Vec<String>, risk_profile: RiskProfile) -> Self {
        Self {
            query,
            risk_profile,
        }
    }

    /// Trimmed, empties dropped, one entry per coin.
    ///
    /// Known symbols and coin ids are rewritten to their ticker, so
    /// `["BTC", "bitcoin"]` becomes `["BTC"]`. Unknown entries are kept as
    /// given for the fetch stage to report.
    #[must_use]
    pub fn normalized(self) -> Self {
        let mut query: Vec<String> = Vec::with_capacity(self.query.len());
        for raw in self.query {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let symbol = resolve_coin_id(raw)
                .ok()
                .and_then(symbol_for)
                .map_or_else(|| raw.to_string(), str::to_string);
            if !query.iter().any(|s| s.eq_ignore_ascii_case(&symbol)) {
                query.push(symbol);
            }
        }
        Self {
            query,
            risk_profile: self.risk_profile,
        }
    }
}

fn millis(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}

pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    /// Pipeline over an explicit stage list
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self { stages }
    }

    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub async fn run(&self, request: PipelineRequest) -> PipelineState {
        let request = request.normalized();
        let mut state = PipelineState::new(request.query, request.risk_profile);
        let run_started = Instant::now();

        tracing::info!(
            run_id = %state.run_id,
            symbols = ?state.query,
            risk_profile = %state.risk_profile,
            "Pipeline started"
        );

        for stage in &self.stages {
            let name = stage.name();
            let started = Instant::now();
            tracing::info!(run_id = %state.run_id, stage = name, "Stage started");

            let mut update = stage.run(&state).await;
            for message in &mut update.messages {
                message.name.get_or_insert_with(|| name.to_string());
            }

            let elapsed_ms = millis(started);
            match &update.error {
                Some(error) => tracing::warn!(
                    run_id = %state.run_id,
                    stage = name,
                    elapsed_ms,
                    error = %error,
                    "Stage finished with error"
                ),
                None => tracing::info!(run_id = %state.run_id, stage = name, elapsed_ms, "Stage finished"),
            }

            state = state.apply(update);
        }

        tracing::info!(
            run_id = %state.run_id,
            elapsed_ms = millis(run_started),
            has_plan = state.portfolio_plan.is_some(),
            "Pipeline finished"
        );
        state
    }
}

/// Builder wiring collaborators and configuration into the standard stages.
///
/// `model`, `watch_list` and `review` win over the matching [`PipelineConfig`]
/// fields no matter which is set first.
pub struct PipelineBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    market: Option<Arc<dyn MarketDataSource>>,
    store: Option<Arc<dyn MarketDataStore>>,
    config: PipelineConfig,
    default_model: String,
    model: Option<String>,
    watch_list: Option<Vec<String>>,
    review: Option<bool>,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            market: None,
            store: None,
            config: PipelineConfig::default(),
            default_model: GenerationOptions::default().model,
            model: None,
            watch_list: None,
            review: None,
        }
    }

    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn market(mut self, market: Arc<dyn MarketDataSource>) -> Self {
        self.market = Some(market);
        self
    }

    /// Defaults to a JSON file store under the configured data directory
    pub fn store(mut self, store: Arc<dyn MarketDataStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Model used when the configuration has no override
    pub fn default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn watch_list(mut self, symbols: Vec<String>) -> Self {
        self.watch_list = Some(symbols);
        self
    }

    pub fn review(mut self, enabled: bool) -> Self {
        self.review = Some(enabled);
        self
    }

    pub fn build(mut self) -> Result<Pipeline> {
        if let Some(model) = self.model.take() {
            self.config.llm_model = Some(model);
        }
        if let Some(symbols) = self.watch_list.take() {
            self.config.watch_list = symbols;
        }
        if let Some(enabled) = self.review {
            self.config.review_enabled = enabled;
        }

        let provider = self
            .provider
            .ok_or_else(|| PipelineError::Config("LLM provider is required".into()))?;
        let market = self
            .market
            .ok_or_else(|| PipelineError::Config("Market data source is required".into()))?;
        let store: Arc<dyn MarketDataStore> = match self.store {
            Some(store) => store,
            None => Arc::new(JsonFileStore::new(self.config.data_dir.clone())),
        };

        let options = self.config.generation_options(&self.default_model);

        let mut stages: Vec<Box<dyn Stage>> = vec![
            Box::new(FetchStage::new(market, store, self.config.fetch_settings())),
            Box::new(AnalyzeStage::new(
                provider.clone(),
                self.config.watch_list.clone(),
                options.clone(),
            )),
            Box::new(PlanStage::new(provider.clone(), options.clone())),
        ];
        if self.config.review_enabled {
            stages.push(Box::new(ReviewStage::new(provider, options)));
        }

        Ok(Pipeline::new(stages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateUpdate;
    use agent_core::MockProvider;
    use async_trait::async_trait;

    struct Fixed(&'static str, Option<&'static str>);

    #[async_trait]
    impl Stage for Fixed {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn run(&self, _state: &PipelineState) -> StateUpdate {
            let update = StateUpdate::message(format!("{} ran", self.0));
            match self.1 {
                Some(error) => update.with_error(error),
                None => update,
            }
        }
    }

    #[tokio::test]
    async fn test_error_does_not_stop_later_stages() {
        let stages: Vec<Box<dyn Stage>> = vec![
            Box::new(Fixed("one", Some("broken"))),
            Box::new(Fixed("two", None)),
        ];
        let pipeline = Pipeline::new(stages);
        let state = pipeline.run(PipelineRequest::default()).await;

        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages.messages()[0].name.as_deref(), Some("one"));
        assert_eq!(state.messages.messages()[1].content, "two ran");
        // cleared by the successful second stage
        assert!(state.error.is_none());
    }

    #[test]
    fn test_request_defaults_and_normalization() {
        let request: PipelineRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request.query, ["BTC", "ETH"]);
        assert_eq!(request.risk_profile, RiskProfile::moderate());

        let request = PipelineRequest::new(
            vec![" BTC".into(), "btc".into(), String::new(), "ETH".into()],
            RiskProfile::default(),
        )
        .normalized();
        assert_eq!(request.query, ["BTC", "ETH"]);

        let request = PipelineRequest::new(
            vec!["BTC".into(), "bitcoin".into(), "eth".into(), "fake".into(), "FAKE".into()],
            RiskProfile::default(),
        )
        .normalized();
        assert_eq!(request.query, ["BTC", "ETH", "fake"]);

        let request: PipelineRequest = serde_json::from_str(r#"{"risk_profile": "  "}"#).unwrap();
        assert_eq!(request.risk_profile, RiskProfile::moderate());
    }

    #[test]
    fn test_builder_requires_collaborators() {
        assert!(matches!(
            Pipeline::builder().build(),
            Err(PipelineError::Config(_))
        ));

        let pipeline = Pipeline::builder()
            .provider(Arc::new(MockProvider::new()))
            .market(Arc::new(crate::market::MockMarketSource::new()))
            .store(Arc::new(crate::store::MemoryStore::new()))
            .review(true)
            .build()
            .unwrap();
        assert_eq!(pipeline.stage_names(), ["fetch", "analyze", "plan", "review"]);
    }

    #[tokio::test]
    async fn test_builder_overrides_survive_later_config() {
        let provider = Arc::new(MockProvider::new());
        let pipeline = Pipeline::builder()
            .provider(provider.clone())
            .market(Arc::new(crate::market::MockMarketSource::new()))
            .store(Arc::new(crate::store::MemoryStore::new()))
            .review(true)
            .model("gpt-4o")
            .watch_list(vec!["eth".into()])
            .config(PipelineConfig {
                symbol_delay: std::time::Duration::ZERO,
                ..Default::default()
            })
            .build()
            .unwrap();
        assert_eq!(pipeline.stage_names(), ["fetch", "analyze", "plan", "review"]);

        let state = pipeline
            .run(PipelineRequest::new(vec!["ETH".into()], RiskProfile::default()))
            .await;
        assert_eq!(state.technical_analysis.len(), 1);
        assert_eq!(state.technical_analysis[0].coin, "ETH");
        assert_eq!(state.portfolio_plan.as_ref().unwrap().model, "gpt-4o");
        assert!(state.portfolio_review.is_some());
    }
}
