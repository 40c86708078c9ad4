//! Pipeline State
//!
//! One record per pipeline run. Stages never mutate it: each reads the
//! current value and returns a [`StateUpdate`], which the orchestrator folds
//! in with [`PipelineState::apply`].

use std::collections::BTreeMap;

use agent_core::{Message, Transcript};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::model::{AnalysisRecord, CryptoData, CryptoPrices, PortfolioPlan, RiskProfile};

/// Diagnostic key/value pairs written by the last stage
pub type Metadata = BTreeMap<String, Value>;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    pub run_id: Uuid,

    /// Human-readable stage outputs, append-only
    pub messages: Transcript,

    /// Requested symbols, fixed for the whole run
    pub query: Vec<String>,

    pub risk_profile: RiskProfile,

    pub crypto_data: CryptoData,

    pub crypto_prices: CryptoPrices,

    pub technical_analysis: Vec<AnalysisRecord>,

    pub portfolio_plan: Option<PortfolioPlan>,

    pub portfolio_review: Option<String>,

    /// Error of the last stage that ran, `None` if it succeeded
    pub error: Option<String>,

    pub metadata: Metadata,
}

impl PipelineState {
    pub fn new(query: Vec<String>, risk_profile: RiskProfile) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            query,
            risk_profile,
            ..Default::default()
        }
    }

    /// Fold a stage's output into a new state value.
    ///
    /// Messages are appended. Data fields are replaced only when the update
    /// carries them. `error` and `metadata` always take the update's value.
    #[must_use]
    pub fn apply(mut self, update: StateUpdate) -> Self {
        self.messages.extend(update.messages);
        if let Some(data) = update.crypto_data {
            self.crypto_data = data;
        }
        if let Some(prices) = update.crypto_prices {
            self.crypto_prices = prices;
        }
        if let Some(analysis) = update.technical_analysis {
            self.technical_analysis = analysis;
        }
        if update.portfolio_plan.is_some() {
            self.portfolio_plan = update.portfolio_plan;
        }
        if update.portfolio_review.is_some() {
            self.portfolio_review = update.portfolio_review;
        }
        self.error = update.error;
        self.metadata = update.metadata;
        self
    }
}

/// Partial state produced by one stage
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StateUpdate {
    pub messages: Vec<Message>,
    pub crypto_data: Option<CryptoData>,
    pub crypto_prices: Option<CryptoPrices>,
    pub technical_analysis: Option<Vec<AnalysisRecord>>,
    pub portfolio_plan: Option<PortfolioPlan>,
    pub portfolio_review: Option<String>,
    pub error: Option<String>,
    pub metadata: Metadata,
}

impl StateUpdate {
    /// Update carrying a single assistant message
    pub fn message(content: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::assistant(content)],
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    #[must_use]
    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CoinData;
    use agent_core::Role;
    use rust_decimal_macros::dec;

    #[test]
    fn test_apply_appends_messages() {
        let state = PipelineState::new(vec!["BTC".into()], RiskProfile::default())
            .apply(StateUpdate::message("first"))
            .apply(StateUpdate::message("second"));

        let contents: Vec<_> = state.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["first", "second"]);
        assert!(state.messages.iter().all(|m| m.role == Role::Assistant));
    }

    #[test]
    fn test_apply_keeps_untouched_fields() {
        let data = CryptoData::from([("BTC".to_string(), CoinData::default())]);
        let state = PipelineState::new(vec!["BTC".into()], RiskProfile::default()).apply(StateUpdate {
            crypto_data: Some(data.clone()),
            crypto_prices: Some(CryptoPrices::from([("BTC".to_string(), dec!(97500))])),
            ..Default::default()
        });

        let next = state.apply(StateUpdate::message("failed").with_error("boom"));
        assert_eq!(next.crypto_data, data);
        assert_eq!(next.crypto_prices["BTC"], dec!(97500));
        assert_eq!(next.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_error_cleared_and_metadata_replaced() {
        let state = PipelineState::default()
            .apply(StateUpdate::message("a").with_error("bad").with_meta("stage", "fetch"))
            .apply(StateUpdate::message("b").with_meta("model", "mock"));

        assert!(state.error.is_none());
        assert!(!state.metadata.contains_key("stage"));
        assert_eq!(state.metadata["model"], "mock");
    }

    #[test]
    fn test_state_serializes_messages_as_list() {
        let state = PipelineState::new(vec!["ETH".into()], RiskProfile::aggressive())
            .apply(StateUpdate::message("hello"));
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["messages"][0]["content"], "hello");
        assert_eq!(json["risk_profile"], "aggressive");
        assert!(json["portfolio_plan"].is_null());
    }
}
