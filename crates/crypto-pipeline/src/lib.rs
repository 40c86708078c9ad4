//! # crypto-pipeline
//!
//! Staged cryptocurrency analysis: fetch market data, compute short-term
//! indicators, have a language model narrate them, then have it propose a
//! portfolio allocation.
//!
//! ## Flow
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │    fetch     │──▶│   analyze    │──▶│     plan     │──▶│   review     │
//! │ quotes/chart │   │ MA7 MA3 RSI  │   │  allocation  │   │  (optional)  │
//! │ OHLCV, cache │   │ + narration  │   │  narrative   │   │   critique   │
//! └──────┬───────┘   └──────────────┘   └──────────────┘   └──────────────┘
//!        │
//!        ▼
//!  MarketDataStore (merge-on-save, keyed by symbol)
//! ```
//!
//! Every stage reads the current [`PipelineState`] and returns a
//! [`StateUpdate`]. A stage that fails records `error` and a message; the
//! next stage still runs. [`Pipeline::run`] always returns a state.
//!
//! ## Example
//!
//! ```ignore
//! let pipeline = Pipeline::builder()
//!     .provider(Arc::new(MockProvider::new()))
//!     .market(Arc::new(MockMarketSource::new()))
//!     .store(Arc::new(MemoryStore::new()))
//!     .build()?;
//!
//! let state = pipeline
//!     .run(PipelineRequest::new(vec!["BTC".into()], RiskProfile::moderate()))
//!     .await;
//! ```

pub mod config;
pub mod error;
pub mod indicators;
pub mod market;
pub mod model;
pub mod pipeline;
pub mod prompts;
pub mod retry;
pub mod stages;
pub mod state;
pub mod store;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use market::{CoinGeckoClient, CoinGeckoConfig, MarketDataSource, MockMarketSource};
pub use model::{AnalysisRecord, CoinData, CryptoData, CryptoPrices, PortfolioPlan, RiskProfile};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineRequest};
pub use retry::RetryPolicy;
pub use stages::Stage;
pub use state::{PipelineState, StateUpdate};
pub use store::{JsonFileStore, MarketDataStore, MemoryStore};
