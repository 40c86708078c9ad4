//! Pipeline Stages
//!
//! Each stage reads the current [`PipelineState`] and returns a
//! [`StateUpdate`]. Stages never fail outright: problems are reported in the
//! update's `error` field and its message.

mod analyze;
mod fetch;
mod plan;
mod review;

pub use analyze::AnalyzeStage;
pub use fetch::{FetchSettings, FetchStage};
pub use plan::PlanStage;
pub use review::ReviewStage;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::PipelineError;
use crate::state::{PipelineState, StateUpdate};

#[async_trait]
pub trait Stage: Send + Sync {
    /// Short name used in logs and message attribution
    fn name(&self) -> &'static str;

    async fn run(&self, state: &PipelineState) -> StateUpdate;
}

/// Whole-stage failure: user-facing message, error text, error kind
fn failure(message_prefix: &str, error: &PipelineError) -> StateUpdate {
    StateUpdate::message(format!("{message_prefix}: {error}"))
        .with_error(error.to_string())
        .with_meta("timestamp", Utc::now().to_rfc3339())
        .with_meta("error_type", error.kind())
}

/// `null` for an empty list, so consumers can tell "no errors" at a glance
fn errors_value(errors: &[String]) -> serde_json::Value {
    if errors.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::json!(errors)
    }
}
