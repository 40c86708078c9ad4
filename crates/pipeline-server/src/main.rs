//! Crypto pipeline HTTP server
//!
//! Exposes one pipeline run per request: `POST /api/portfolio` with a list
//! of symbols and a risk profile returns the final pipeline state.

mod handlers;
mod state;

use std::sync::Arc;

use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crypto_pipeline::{
    CoinGeckoClient, JsonFileStore, MarketDataSource, MockMarketSource, Pipeline, PipelineConfig,
};

use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment first so RUST_LOG from .env applies
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = PipelineConfig::from_env()?;

    // LLM provider
    let (kind, provider) = agent_runtime::provider_from_env()?;
    match provider.health_check().await {
        Ok(true) => tracing::info!("✓ Connected to {}", provider.name()),
        Ok(false) | Err(_) => {
            tracing::warn!("⚠ {} not available - analysis and planning will fail", provider.name());
        }
    }

    // Market data
    let market: Arc<dyn MarketDataSource> =
        match std::env::var("MARKET_SOURCE").unwrap_or_else(|_| "coingecko".into()).as_str() {
            "mock" => Arc::new(MockMarketSource::new()),
            "coingecko" => Arc::new(CoinGeckoClient::from_env()?),
            other => anyhow::bail!("unknown MARKET_SOURCE '{other}' (expected coingecko or mock)"),
        };
    if market.health_check().await {
        tracing::info!("✓ Market source {} reachable", market.name());
    } else {
        tracing::warn!("⚠ Market source {} not reachable", market.name());
    }

    tracing::info!(
        provider = ?kind,
        watch_list = ?config.watch_list,
        data_dir = %config.data_dir.display(),
        review = config.review_enabled,
        "Pipeline configuration"
    );

    let pipeline = Pipeline::builder()
        .provider(provider.clone())
        .market(market.clone())
        .store(Arc::new(JsonFileStore::new(config.data_dir.clone())))
        .default_model(kind.default_model())
        .config(config)
        .build()?;

    let state = AppState {
        pipeline: Arc::new(pipeline),
        provider,
        market,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = handlers::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    tracing::info!("🚀 Server starting on http://{}", addr);
    tracing::info!("   Endpoints:");
    tracing::info!("   GET  /health         - Health check");
    tracing::info!("   POST /api/portfolio  - Run fetch, analysis and planning");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
