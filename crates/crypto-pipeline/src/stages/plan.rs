//! Plan stage
//!
//! One allocation call over all analyses and current prices. Refuses to run
//! without both.

use std::sync::Arc;

use agent_core::{GenerationOptions, LlmProvider};
use async_trait::async_trait;
use chrono::Utc;

use super::{Stage, failure};
use crate::error::{PipelineError, Result};
use crate::model::PortfolioPlan;
use crate::prompts::{PORTFOLIO_SYSTEM, portfolio_prompt};
use crate::state::{PipelineState, StateUpdate};

pub struct PlanStage {
    provider: Arc<dyn LlmProvider>,
    options: GenerationOptions,
}

impl PlanStage {
    pub fn new(provider: Arc<dyn LlmProvider>, options: GenerationOptions) -> Self {
        Self { provider, options }
    }

    async fn plan(&self, state: &PipelineState) -> Result<PortfolioPlan> {
        if state.technical_analysis.is_empty() || state.crypto_prices.is_empty() {
            return Err(PipelineError::Precondition(
                "No technical analysis or price data available for portfolio suggestions".into(),
            ));
        }

        let prompt = portfolio_prompt(
            &state.technical_analysis,
            &state.crypto_prices,
            &state.risk_profile,
        )?;
        let completion = self
            .provider
            .prompt(PORTFOLIO_SYSTEM, &prompt, &self.options)
            .await?;

        Ok(PortfolioPlan {
            analysis: completion.content,
            timestamp: Utc::now(),
            technical_analysis: state.technical_analysis.clone(),
            prices_analyzed: state.crypto_prices.clone(),
            risk_profile: state.risk_profile.clone(),
            model: completion.model,
        })
    }
}

#[async_trait]
impl Stage for PlanStage {
    fn name(&self) -> &'static str {
        "plan"
    }

    async fn run(&self, state: &PipelineState) -> StateUpdate {
        match self.plan(state).await {
            Ok(plan) => {
                let coins: Vec<String> = plan.technical_analysis.iter().map(|a| a.coin.clone()).collect();
                let update = StateUpdate::message(plan.analysis.clone())
                    .with_meta("timestamp", plan.timestamp.to_rfc3339())
                    .with_meta("model", plan.model.as_str())
                    .with_meta("risk_profile", plan.risk_profile.as_str())
                    .with_meta("coins_analyzed", coins);
                StateUpdate {
                    portfolio_plan: Some(plan),
                    ..update
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Plan stage failed");
                failure("I encountered an error while generating portfolio suggestions", &e)
            }
        }
    }
}
