//! Indicator Calculator
//!
//! Pure functions over a closing-price series ordered oldest to newest.
//! No I/O, no state.

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::model::Levels;

/// Default RSI lookback
pub const RSI_PERIOD: usize = 14;

/// RSI returned when the series is too short to compute one
pub const RSI_NEUTRAL: f64 = 50.0;

/// Mean of the last `period` prices.
///
/// Fails with `InsufficientData` when fewer than `period` prices exist,
/// instead of silently averaging a shorter window.
#[allow(clippy::cast_precision_loss)]
pub fn moving_average(prices: &[f64], period: usize) -> Result<f64> {
    if period == 0 {
        return Err(PipelineError::InvalidRequest(
            "moving average period must be positive".into(),
        ));
    }
    if prices.len() < period {
        return Err(PipelineError::InsufficientData {
            indicator: "moving average",
            needed: period,
            available: prices.len(),
        });
    }
    let window = &prices[prices.len() - period..];
    Ok(window.iter().sum::<f64>() / period as f64)
}

/// Relative Strength Index over the last `period` deltas.
///
/// - fewer than `period + 1` prices: [`RSI_NEUTRAL`]
/// - no losses in the window: exactly 100.0
#[allow(clippy::cast_precision_loss)]
pub fn rsi(prices: &[f64], period: usize) -> f64 {
    if period == 0 || prices.len() < period + 1 {
        tracing::debug!(points = prices.len(), period, "not enough data for RSI, using neutral value");
        return RSI_NEUTRAL;
    }

    let deltas: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();
    let recent = &deltas[deltas.len() - period..];

    let avg_gain = recent.iter().map(|d| d.max(0.0)).sum::<f64>() / period as f64;
    let avg_loss = recent.iter().map(|d| (-d).max(0.0)).sum::<f64>() / period as f64;

    if avg_loss == 0.0 {
        return 100.0;
    }

    let rs = avg_gain / avg_loss;
    100.0 - (100.0 / (1.0 + rs))
}

/// RSI with the default 14-period lookback
pub fn rsi_default(prices: &[f64]) -> f64 {
    rsi(prices, RSI_PERIOD)
}

/// Naive support/resistance: the minimum and maximum of the window.
///
/// This is a deliberate simplification, not peak detection.
pub fn support_resistance(prices: &[f64]) -> Result<Levels> {
    if prices.is_empty() {
        return Err(PipelineError::InsufficientData {
            indicator: "support/resistance",
            needed: 1,
            available: 0,
        });
    }
    let support = prices.iter().copied().fold(f64::INFINITY, f64::min);
    let resistance = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Ok(Levels {
        support,
        resistance,
    })
}

/// Direction of a series, first point against last
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Neutral,
}

/// `Up` if the last value is above the first, `Down` otherwise.
/// Series with fewer than two points are `Neutral`.
pub fn trend(values: &[f64]) -> Trend {
    match (values.first(), values.last()) {
        (Some(first), Some(last)) if values.len() >= 2 => {
            if last > first {
                Trend::Up
            } else {
                Trend::Down
            }
        }
        _ => Trend::Neutral,
    }
}
