//! Candlestick pattern recognition.
//!
//! Detects the four reversal patterns the pivot detector is built on:
//! Hammer and Bullish Engulfing on the bullish side, Shooting Star and
//! Bearish Engulfing on the bearish side. All detectors are pure functions
//! of one or two bars; thresholds live in [`PatternParams`].
//!
//! At the tail of a bar series the single-bar pattern is checked first, so
//! a bar that is both a Hammer and part of a Bullish Engulfing pair
//! classifies as Hammer.

use serde::{Deserialize, Serialize};

use crate::models::Bar;

// ── Thresholds ────────────────────────────────────────────────────────────

/// Minimum long-shadow / range ratio for hammer and shooting-star shapes.
const MIN_SHADOW_RANGE_RATIO: f64 = 0.4;

/// Minimum long-shadow / range ratio when the body is zero (doji case).
const DOJI_SHADOW_RANGE_RATIO: f64 = 0.6;

/// Maximum opposing-shadow / body ratio (20% margin over the body).
const OPPOSING_SHADOW_BODY_RATIO: f64 = 1.2;

/// Tunable pattern thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatternParams {
    /// Maximum body size as a ratio of the total range.
    pub max_body_ratio: f64,
    /// Minimum long-shadow / body ratio.
    pub min_shadow_body_ratio: f64,
}

impl Default for PatternParams {
    fn default() -> Self {
        Self {
            max_body_ratio: 0.35,
            min_shadow_body_ratio: 1.8,
        }
    }
}

// ── CandlePattern ─────────────────────────────────────────────────────────

/// A detected reversal pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CandlePattern {
    /// Small body at the top of the range with a long lower shadow.
    Hammer,
    /// Bullish body strictly containing the prior bearish body.
    BullishEngulfing,
    /// Small body at the bottom of the range with a long upper shadow.
    ShootingStar,
    /// Bearish body strictly containing the prior bullish body.
    BearishEngulfing,
}

impl CandlePattern {
    /// Stable string form used in reasons and payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hammer => "HAMMER",
            Self::BullishEngulfing => "BULLISH_ENGULFING",
            Self::ShootingStar => "SHOOTING_STAR",
            Self::BearishEngulfing => "BEARISH_ENGULFING",
        }
    }

    /// `true` for the bullish-reversal patterns.
    pub fn is_bullish(self) -> bool {
        matches!(self, Self::Hammer | Self::BullishEngulfing)
    }
}

impl std::fmt::Display for CandlePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Single-bar shapes ─────────────────────────────────────────────────────

/// Hammer: small body near the top, long lower shadow, short upper shadow.
pub fn is_hammer(bar: &Bar, params: &PatternParams) -> bool {
    let range = bar.range();
    if range <= 0.0 {
        return false;
    }

    let body = bar.body_size();
    let lower = bar.lower_shadow();
    let upper = bar.upper_shadow();

    if body / range > params.max_body_ratio {
        return false;
    }
    if lower < range * MIN_SHADOW_RANGE_RATIO {
        return false;
    }
    if body > 0.0 {
        lower / body >= params.min_shadow_body_ratio && upper <= body * OPPOSING_SHADOW_BODY_RATIO
    } else {
        // Doji case: the lower shadow must dominate the range.
        lower >= range * DOJI_SHADOW_RANGE_RATIO
    }
}

/// Shooting star: the hammer's mirror on the high side.
pub fn is_shooting_star(bar: &Bar, params: &PatternParams) -> bool {
    let range = bar.range();
    if range <= 0.0 {
        return false;
    }

    let body = bar.body_size();
    let lower = bar.lower_shadow();
    let upper = bar.upper_shadow();

    if body / range > params.max_body_ratio {
        return false;
    }
    if upper < range * MIN_SHADOW_RANGE_RATIO {
        return false;
    }
    if body > 0.0 {
        upper / body >= params.min_shadow_body_ratio && lower <= body * OPPOSING_SHADOW_BODY_RATIO
    } else {
        upper >= range * DOJI_SHADOW_RANGE_RATIO
    }
}

// ── Two-bar shapes ────────────────────────────────────────────────────────

/// Bullish engulfing: bearish `previous`, bullish `current`, and the current
/// body strictly contains the previous body.
pub fn is_bullish_engulfing(current: &Bar, previous: &Bar) -> bool {
    if !previous.is_bearish() || !current.is_bullish() {
        return false;
    }
    let cur_low = current.open.min(current.close);
    let cur_high = current.open.max(current.close);
    let prev_low = previous.open.min(previous.close);
    let prev_high = previous.open.max(previous.close);
    cur_low < prev_low && cur_high > prev_high
}

/// Bearish engulfing: bullish `previous`, bearish `current`, and the current
/// body strictly contains the previous body.
pub fn is_bearish_engulfing(current: &Bar, previous: &Bar) -> bool {
    if !previous.is_bullish() || !current.is_bearish() {
        return false;
    }
    let cur_low = current.open.min(current.close);
    let cur_high = current.open.max(current.close);
    let prev_low = previous.open.min(previous.close);
    let prev_high = previous.open.max(previous.close);
    cur_low < prev_low && cur_high > prev_high
}

// ── Tail detectors ────────────────────────────────────────────────────────

/// Detect a bullish reversal at the end of `bars`.
///
/// The single-bar Hammer wins over the two-bar Bullish Engulfing.
pub fn bullish_reversal(bars: &[Bar], params: &PatternParams) -> Option<CandlePattern> {
    let current = bars.last()?;

    if is_hammer(current, params) {
        return Some(CandlePattern::Hammer);
    }
    if bars.len() >= 2 && is_bullish_engulfing(current, &bars[bars.len() - 2]) {
        return Some(CandlePattern::BullishEngulfing);
    }
    None
}

/// Detect a bearish reversal at the end of `bars`.
///
/// The single-bar Shooting Star wins over the two-bar Bearish Engulfing.
pub fn bearish_reversal(bars: &[Bar], params: &PatternParams) -> Option<CandlePattern> {
    let current = bars.last()?;

    if is_shooting_star(current, params) {
        return Some(CandlePattern::ShootingStar);
    }
    if bars.len() >= 2 && is_bearish_engulfing(current, &bars[bars.len() - 2]) {
        return Some(CandlePattern::BearishEngulfing);
    }
    None
}

// ── Tests ─────────────────────────────────────────────────────────────────
