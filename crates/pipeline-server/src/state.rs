//! Application State

use std::sync::Arc;

use agent_core::LlmProvider;
use crypto_pipeline::{MarketDataSource, Pipeline};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Fully wired pipeline, shared by all requests
    pub pipeline: Arc<Pipeline>,

    /// LLM provider (Ollama, OpenAI, mock)
    pub provider: Arc<dyn LlmProvider>,

    /// Market data source (CoinGecko or mock)
    pub market: Arc<dyn MarketDataSource>,
}
