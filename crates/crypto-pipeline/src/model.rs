//! Domain Models
//!
//! Market data as fetched from the price source, the per-coin analysis
//! record and the portfolio plan. Quoted monetary values use `rust_decimal`;
//! price series stay `f64` since they only feed indicator math.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Market data keyed by ticker symbol (e.g. "BTC")
pub type CryptoData = BTreeMap<String, CoinData>;

/// Current prices keyed by ticker symbol
pub type CryptoPrices = BTreeMap<String, Decimal>;

/// A market quote for one coin
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Provider identifier (e.g. "bitcoin")
    pub id: String,

    /// Ticker symbol as reported by the provider (e.g. "btc")
    pub symbol: String,

    pub name: String,

    #[serde(default)]
    pub current_price: Option<Decimal>,

    #[serde(default)]
    pub market_cap: Option<Decimal>,

    #[serde(default)]
    pub total_volume: Option<Decimal>,

    #[serde(default)]
    pub high_24h: Option<Decimal>,

    #[serde(default)]
    pub low_24h: Option<Decimal>,

    #[serde(default)]
    pub price_change_percentage_24h: Option<Decimal>,

    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

/// One `[timestamp_ms, value]` sample
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PricePoint(pub i64, pub f64);

impl PricePoint {
    pub const fn value(self) -> f64 {
        self.1
    }
}

/// Historical series over a date range
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketChart {
    pub prices: Vec<PricePoint>,

    #[serde(default)]
    pub market_caps: Vec<PricePoint>,

    #[serde(default)]
    pub total_volumes: Vec<PricePoint>,
}

impl MarketChart {
    /// The most recent `n` prices, oldest first
    pub fn last_prices(&self, n: usize) -> Vec<f64> {
        let start = self.prices.len().saturating_sub(n);
        self.prices[start..].iter().map(|p| p.value()).collect()
    }
}

/// An OHLCV candle. Volume is optional; some endpoints return only OHLC.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct Candle {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<f64>,
}

impl TryFrom<Vec<f64>> for Candle {
    type Error = String;

    #[allow(clippy::cast_possible_truncation)]
    fn try_from(row: Vec<f64>) -> std::result::Result<Self, Self::Error> {
        match row.as_slice() {
            [time, open, high, low, close, rest @ ..] => Ok(Self {
                time: *time as i64,
                open: *open,
                high: *high,
                low: *low,
                close: *close,
                volume: rest.first().copied(),
            }),
            _ => Err(format!(
                "candle needs at least 5 values [time, open, high, low, close], got {}",
                row.len()
            )),
        }
    }
}

impl From<Candle> for Vec<f64> {
    #[allow(clippy::cast_precision_loss)]
    fn from(c: Candle) -> Self {
        let mut row = vec![c.time as f64, c.open, c.high, c.low, c.close];
        if let Some(volume) = c.volume {
            row.push(volume);
        }
        row
    }
}

/// Everything fetched for one symbol.
///
/// Each data type is fetched independently, so any of them may be absent.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CoinData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Quote>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_chart: Option<MarketChart>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ohlcv: Option<Vec<Candle>>,
}

impl CoinData {
    /// Shallow merge: fields present in `newer` overwrite, others are kept
    pub fn merge(&mut self, newer: Self) {
        if newer.price.is_some() {
            self.price = newer.price;
        }
        if newer.market_chart.is_some() {
            self.market_chart = newer.market_chart;
        }
        if newer.ohlcv.is_some() {
            self.ohlcv = newer.ohlcv;
        }
    }
}

/// Merge `newer` into `base` symbol by symbol
pub fn merge_crypto_data(base: &mut CryptoData, newer: CryptoData) {
    for (symbol, data) in newer {
        base.entry(symbol).or_default().merge(data);
    }
}

/// Valid day windows for candle requests
pub const CANDLE_WINDOWS: [u16; 7] = [1, 7, 14, 30, 90, 180, 365];

/// Number of days of candles to request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct CandleWindow(u16);

impl CandleWindow {
    pub fn new(days: u16) -> Result<Self> {
        if CANDLE_WINDOWS.contains(&days) {
            Ok(Self(days))
        } else {
            Err(PipelineError::InvalidRequest(
                "days must be one of: 1, 7, 14, 30, 90, 180, 365".into(),
            ))
        }
    }

    pub const fn days(self) -> u16 {
        self.0
    }
}

impl Default for CandleWindow {
    fn default() -> Self {
        Self(7)
    }
}

impl TryFrom<u16> for CandleWindow {
    type Error = PipelineError;

    fn try_from(days: u16) -> Result<Self> {
        Self::new(days)
    }
}

impl From<CandleWindow> for u16 {
    fn from(window: CandleWindow) -> Self {
        window.0
    }
}

impl fmt::Display for CandleWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated historical date range: in the past, ordered, at most a year
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub const MAX_SPAN_DAYS: i64 = 365;

    pub fn new(from: NaiveDate, to: NaiveDate, today: NaiveDate) -> Result<Self> {
        if from > today || to > today {
            return Err(PipelineError::InvalidRequest(
                "Cannot request data for future dates".into(),
            ));
        }
        if from > to {
            return Err(PipelineError::InvalidRequest(
                "from_date must be before to_date".into(),
            ));
        }
        let max_span = Duration::days(Self::MAX_SPAN_DAYS);
        if to - from > max_span {
            return Err(PipelineError::InvalidRequest(
                "Date range cannot exceed 365 days".into(),
            ));
        }
        if from < today - max_span {
            return Err(PipelineError::InvalidRequest(
                "Cannot request data from more than 365 days ago".into(),
            ));
        }
        Ok(Self { from, to })
    }

    /// `[today - days, today]`
    pub fn last_days(days: u16, today: NaiveDate) -> Result<Self> {
        Self::new(today - Duration::days(i64::from(days)), today, today)
    }

    /// Unix seconds at midnight UTC of each bound
    pub fn unix_bounds(&self) -> (i64, i64) {
        let midnight = |d: NaiveDate| {
            d.and_hms_opt(0, 0, 0)
                .map_or(0, |dt| dt.and_utc().timestamp())
        };
        (midnight(self.from), midnight(self.to))
    }
}

/// Free-form risk classification ("conservative", "moderate", "aggressive", ...)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct RiskProfile(String);

impl RiskProfile {
    pub fn new(profile: impl Into<String>) -> Self {
        let profile = profile.into();
        if profile.trim().is_empty() {
            Self::default()
        } else {
            Self(profile.trim().to_string())
        }
    }

    pub fn conservative() -> Self {
        Self("conservative".into())
    }

    pub fn moderate() -> Self {
        Self("moderate".into())
    }

    pub fn aggressive() -> Self {
        Self("aggressive".into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RiskProfile {
    fn default() -> Self {
        Self::moderate()
    }
}

impl From<String> for RiskProfile {
    fn from(profile: String) -> Self {
        Self::new(profile)
    }
}

impl From<RiskProfile> for String {
    fn from(profile: RiskProfile) -> Self {
        profile.0
    }
}

impl fmt::Display for RiskProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computed indicator values
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Indicators {
    pub ma7: f64,
    pub ma3: f64,
    pub rsi: f64,
}

/// Support/resistance band
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Levels {
    pub support: f64,
    pub resistance: f64,
}

/// Per-coin technical analysis
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub coin: String,
    pub current_price: f64,
    pub indicators: Indicators,
    pub levels: Levels,
    /// Model narrative, or an inline error text if narration failed
    pub llm_analysis: String,
}

/// Allocation narrative together with the inputs that produced it
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PortfolioPlan {
    pub analysis: String,
    pub timestamp: DateTime<Utc>,
    pub technical_analysis: Vec<AnalysisRecord>,
    pub prices_analyzed: CryptoPrices,
    pub risk_profile: RiskProfile,
    pub model: String,
}
