//! HTTP Handlers

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use serde::Serialize;
use serde_json::{Value, json};

use crypto_pipeline::PipelineRequest;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub llm_provider: String,
    pub llm_connected: bool,
    pub market_source: String,
    pub stages: Vec<&'static str>,
}

/// Routes without middleware; layers are added in `main`
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/portfolio", post(portfolio_handler))
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let llm_connected = state.provider.health_check().await.unwrap_or(false);

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        llm_provider: state.provider.name().to_string(),
        llm_connected,
        market_source: state.market.name().to_string(),
        stages: state.pipeline.stage_names(),
    })
}

/// Run the pipeline. Always answers with the final state; stage failures
/// show up in its `error` field and messages.
pub async fn portfolio_handler(
    State(state): State<AppState>,
    Json(request): Json<PipelineRequest>,
) -> Json<Value> {
    tracing::info!(symbols = ?request.query, risk_profile = %request.risk_profile, "Portfolio request");

    let result = state.pipeline.run(request).await;
    if let Some(error) = &result.error {
        tracing::warn!(run_id = %result.run_id, error = %error, "Pipeline finished with error");
    }

    Json(json!({ "result": result }))
}
