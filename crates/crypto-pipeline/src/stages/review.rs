//! Review stage (optional)
//!
//! Asks the model to critique the finished plan.

use std::sync::Arc;

use agent_core::{GenerationOptions, LlmProvider};
use async_trait::async_trait;
use chrono::Utc;

use super::{Stage, failure};
use crate::error::{PipelineError, Result};
use crate::prompts::{REVIEW_SYSTEM, review_prompt};
use crate::state::{PipelineState, StateUpdate};

pub struct ReviewStage {
    provider: Arc<dyn LlmProvider>,
    options: GenerationOptions,
}

impl ReviewStage {
    pub fn new(provider: Arc<dyn LlmProvider>, options: GenerationOptions) -> Self {
        Self { provider, options }
    }

    async fn review(&self, state: &PipelineState) -> Result<String> {
        let plan = state
            .portfolio_plan
            .as_ref()
            .ok_or_else(|| PipelineError::Precondition("No portfolio plan available for review".into()))?;

        let completion = self
            .provider
            .prompt(REVIEW_SYSTEM, &review_prompt(plan), &self.options)
            .await?;
        Ok(completion.content)
    }
}

#[async_trait]
impl Stage for ReviewStage {
    fn name(&self) -> &'static str {
        "review"
    }

    async fn run(&self, state: &PipelineState) -> StateUpdate {
        match self.review(state).await {
            Ok(review) => {
                let update = StateUpdate::message(review.clone())
                    .with_meta("timestamp", Utc::now().to_rfc3339())
                    .with_meta("model", self.options.model.as_str());
                StateUpdate {
                    portfolio_review: Some(review),
                    ..update
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Review stage failed");
                failure("I encountered an error while reviewing the portfolio", &e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CryptoPrices, PortfolioPlan, RiskProfile};
    use agent_core::MockProvider;

    #[tokio::test]
    async fn test_review_requires_plan() {
        let stage = ReviewStage::new(Arc::new(MockProvider::new()), GenerationOptions::default());
        let update = stage.run(&PipelineState::default()).await;
        assert!(update.portfolio_review.is_none());
        assert_eq!(update.metadata["error_type"], "PreconditionError");
    }

    #[tokio::test]
    async fn test_review_stored() {
        let provider = Arc::new(MockProvider::new().then_reply("Too concentrated in BTC."));
        let stage = ReviewStage::new(provider.clone(), GenerationOptions::default());
        let state = PipelineState {
            portfolio_plan: Some(PortfolioPlan {
                analysis: "100% BTC".into(),
                timestamp: Utc::now(),
                technical_analysis: Vec::new(),
                prices_analyzed: CryptoPrices::new(),
                risk_profile: RiskProfile::conservative(),
                model: "mock".into(),
            }),
            ..Default::default()
        };

        let update = stage.run(&state).await;
        assert_eq!(update.portfolio_review.as_deref(), Some("Too concentrated in BTC."));
        assert!(provider.prompts()[0].user.contains("Please review this portfolio"));
        assert!(provider.prompts()[0].user.contains("100% BTC"));
    }
}
