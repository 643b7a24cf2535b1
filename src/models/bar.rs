//! OHLCV bar model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single closed OHLCV bar for one symbol and timeframe.
///
/// Bars are immutable once stored; the `(symbol, timeframe, timestamp)`
/// triple is the identity and a re-arrival replaces the stored row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Stock symbol (e.g. "VNM").
    pub symbol: String,
    /// Timeframe label (e.g. "1H").
    pub timeframe: String,
    /// Close time of the bar window.
    pub timestamp: DateTime<Utc>,
    /// Opening price.
    pub open: f64,
    /// Highest traded price.
    pub high: f64,
    /// Lowest traded price.
    pub low: f64,
    /// Closing price.
    pub close: f64,
    /// Traded volume.
    #[serde(default)]
    pub volume: f64,
}

impl Bar {
    /// `true` when the bar closed above its open (green candle).
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    /// `true` when the bar closed below its open (red candle).
    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    /// Absolute body size `|close - open|`.
    pub fn body_size(&self) -> f64 {
        (self.close - self.open).abs()
    }

    /// Upper shadow length `high - max(open, close)`.
    pub fn upper_shadow(&self) -> f64 {
        self.high - self.open.max(self.close)
    }

    /// Lower shadow length `min(open, close) - low`.
    pub fn lower_shadow(&self) -> f64 {
        self.open.min(self.close) - self.low
    }

    /// Total bar range `high - low`.
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// OHLC sanity check: all prices finite and
    /// `low <= min(open, close) <= max(open, close) <= high`.
    ///
    /// Bars failing this never enter the pipeline: the feed adapter rejects
    /// them and the worker drops them with an error log.
    pub fn is_well_formed(&self) -> bool {
        let finite = self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite()
            && self.volume.is_finite();
        finite
            && self.low <= self.open.min(self.close)
            && self.open.max(self.close) <= self.high
    }
}
