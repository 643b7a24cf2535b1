//! Technical indicators over the bar series.
//!
//! The signal engine recomputes every indicator from the current history on
//! each closed bar; the functions here therefore take plain slices and
//! return latest values (`rsi`, `macd`, `atr`) or aligned series
//! (`atr_series`).
//!
//! MACD values are kept **raw** everywhere inside the engine. The ÷1000
//! display convention used by the original data source applies only when an
//! [`IndicatorSnapshot`] is rendered into an outbound payload via
//! [`IndicatorSnapshot::display`].

mod atr;
mod ema;
mod macd;
mod rsi;

pub use atr::{atr, atr_series, true_ranges};
pub use ema::ema;
pub use macd::{MacdSnapshot, bullish_crossover, macd};
pub use rsi::rsi;

use serde::{Deserialize, Serialize};

use crate::models::Bar;

/// Divisor applied to MACD values at the payload boundary.
pub const MACD_DISPLAY_SCALE: f64 = 1000.0;

/// Indicator periods, all overridable through configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndicatorConfig {
    /// RSI period.
    pub rsi_period: usize,
    /// MACD fast EMA period.
    pub macd_fast: usize,
    /// MACD slow EMA period.
    pub macd_slow: usize,
    /// MACD signal EMA period.
    pub macd_signal: usize,
    /// ATR period.
    pub atr_period: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            atr_period: 14,
        }
    }
}

/// All indicator values at one bar; fields are absent during warm-up.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    /// RSI value in `[0, 100]`.
    pub rsi: Option<f64>,
    /// MACD line (raw).
    pub macd_line: Option<f64>,
    /// MACD signal line (raw).
    pub macd_signal: Option<f64>,
    /// MACD histogram (raw).
    pub macd_histogram: Option<f64>,
    /// ATR (simple mean of the last `period` true ranges).
    pub atr: Option<f64>,
}

impl IndicatorSnapshot {
    /// Copy of the snapshot with MACD values divided by
    /// [`MACD_DISPLAY_SCALE`] for outbound payloads.
    pub fn display(&self) -> Self {
        Self {
            rsi: self.rsi,
            macd_line: self.macd_line.map(|v| v / MACD_DISPLAY_SCALE),
            macd_signal: self.macd_signal.map(|v| v / MACD_DISPLAY_SCALE),
            macd_histogram: self.macd_histogram.map(|v| v / MACD_DISPLAY_SCALE),
            atr: self.atr,
        }
    }
}

/// Compute all indicators for the latest bar of `bars`.
pub fn snapshot(bars: &[Bar], cfg: &IndicatorConfig) -> IndicatorSnapshot {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();

    let rsi_value = rsi(&closes, cfg.rsi_period);
    let macd_value = macd(&closes, cfg.macd_fast, cfg.macd_slow, cfg.macd_signal);
    let atr_value = atr(bars, cfg.atr_period);

    IndicatorSnapshot {
        rsi: rsi_value,
        macd_line: macd_value.map(|m| m.macd),
        macd_signal: macd_value.map(|m| m.signal),
        macd_histogram: macd_value.map(|m| m.histogram),
        atr: atr_value,
    }
}
