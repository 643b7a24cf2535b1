//! Pivot point detection.
//!
//! Pivot-lows are identified by bullish reversal patterns at the tail of
//! the bar series (Hammer, Bullish Engulfing), pivot-highs by bearish ones
//! (Shooting Star, Bearish Engulfing). The bullish check runs first and the
//! bearish check only when it fails, so a single bar never produces both.

use crate::models::{Bar, Pivot, PivotKind};
use crate::patterns::{self, PatternParams};

/// Turns pattern events into append-only pivot lists.
#[derive(Debug, Clone, Default)]
pub struct PivotDetector {
    params: PatternParams,
    lows: Vec<Pivot>,
    highs: Vec<Pivot>,
}

impl PivotDetector {
    /// Detector with the given pattern thresholds.
    pub fn new(params: PatternParams) -> Self {
        Self {
            params,
            lows: Vec::new(),
            highs: Vec::new(),
        }
    }

    /// Inspect the tail of `bars` (whose last element has absolute index
    /// `bar_index`) and record a pivot when a reversal pattern is present.
    ///
    /// Requires at least two bars of history; returns the new pivot, if any.
    pub fn process_bar(&mut self, bars: &[Bar], bar_index: usize) -> Option<Pivot> {
        if bars.len() < 2 {
            return None;
        }
        let current = bars.last()?;

        if let Some(pattern) = patterns::bullish_reversal(bars, &self.params) {
            let pivot = Pivot {
                kind: PivotKind::Low,
                price: current.low,
                timestamp: current.timestamp,
                bar_index,
                pattern,
            };
            self.lows.push(pivot.clone());
            return Some(pivot);
        }

        if let Some(pattern) = patterns::bearish_reversal(bars, &self.params) {
            let pivot = Pivot {
                kind: PivotKind::High,
                price: current.high,
                timestamp: current.timestamp,
                bar_index,
                pattern,
            };
            self.highs.push(pivot.clone());
            return Some(pivot);
        }

        None
    }

    /// All pivot-lows, oldest first.
    pub fn lows(&self) -> &[Pivot] {
        &self.lows
    }

    /// All pivot-highs, oldest first.
    pub fn highs(&self) -> &[Pivot] {
        &self.highs
    }

    /// The most recent `count` pivot-lows, oldest first.
    pub fn recent_lows(&self, count: usize) -> &[Pivot] {
        &self.lows[self.lows.len().saturating_sub(count)..]
    }

    /// The most recent `count` pivot-highs, oldest first.
    pub fn recent_highs(&self, count: usize) -> &[Pivot] {
        &self.highs[self.highs.len().saturating_sub(count)..]
    }

    /// The most recent pivot-low.
    pub fn last_low(&self) -> Option<&Pivot> {
        self.lows.last()
    }

    /// The second most recent pivot-low (used for stop-loss placement).
    pub fn previous_low(&self) -> Option<&Pivot> {
        self.lows.len().checked_sub(2).map(|i| &self.lows[i])
    }

    /// The most recent pivot-high.
    pub fn last_high(&self) -> Option<&Pivot> {
        self.highs.last()
    }

    /// Drop all recorded pivots.
    pub fn clear(&mut self) {
        self.lows.clear();
        self.highs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::CandlePattern;
    use chrono::{Duration, TimeZone, Utc};

    fn bar(i: usize, open: f64, high: f64, low: f64, close: f64) -> Bar {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 2, 0, 0).unwrap();
        Bar {
            symbol: "VNM".to_string(),
            timeframe: "1H".to_string(),
            timestamp: start + Duration::hours(i as i64),
            open,
            high,
            low,
            close,
            volume: 0.0,
        }
    }

    /// Neutral filler bar that forms no pattern.
    fn filler(i: usize, base: f64) -> Bar {
        bar(i, base, base + 1.3, base - 0.3, base + 1.0)
    }

    /// Bullish hammer with its low at `base`.
    fn hammer(i: usize, base: f64) -> Bar {
        bar(i, base + 4.5, base + 5.2, base, base + 5.0)
    }

    /// Bearish shooting star with its high at `top`.
    fn star(i: usize, top: f64) -> Bar {
        bar(i, top - 4.5, top, top - 5.2, top - 5.0)
    }

    #[test]
    fn test_hammer_creates_pivot_low_at_bar_low() {
        let mut detector = PivotDetector::default();
        let bars = vec![filler(0, 100.0), hammer(1, 95.0)];
        let pivot = detector.process_bar(&bars, 1).unwrap();

        assert_eq!(pivot.kind, PivotKind::Low);
        assert_eq!(pivot.price, 95.0);
        assert_eq!(pivot.bar_index, 1);
        assert_eq!(pivot.pattern, CandlePattern::Hammer);
        assert_eq!(detector.lows().len(), 1);
        assert!(detector.highs().is_empty());
    }

    #[test]
    fn test_star_creates_pivot_high_at_bar_high() {
        let mut detector = PivotDetector::default();
        let bars = vec![filler(0, 100.0), star(1, 112.0)];
        let pivot = detector.process_bar(&bars, 1).unwrap();

        assert_eq!(pivot.kind, PivotKind::High);
        assert_eq!(pivot.price, 112.0);
        assert_eq!(detector.highs().len(), 1);
        assert!(detector.lows().is_empty());
    }

    #[test]
    fn test_needs_two_bars() {
        let mut detector = PivotDetector::default();
        let bars = vec![hammer(0, 95.0)];
        assert!(detector.process_bar(&bars, 0).is_none());
    }

    #[test]
    fn test_filler_creates_no_pivot() {
        let mut detector = PivotDetector::default();
        let bars = vec![filler(0, 100.0), filler(1, 101.0)];
        assert!(detector.process_bar(&bars, 1).is_none());
    }

    #[test]
    fn test_bar_index_strictly_increasing() {
        let mut detector = PivotDetector::default();
        let mut bars = vec![filler(0, 100.0)];

        for (i, base) in [(1, 95.0), (2, 97.0), (3, 99.0)] {
            bars.push(hammer(i, base));
            detector.process_bar(&bars, i);
        }

        let indices: Vec<usize> = detector.lows().iter().map(|p| p.bar_index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        assert!(indices.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_accessors() {
        let mut detector = PivotDetector::default();
        let mut bars = vec![filler(0, 100.0)];
        for (i, base) in [(1, 95.0), (2, 97.0), (3, 99.0)] {
            bars.push(hammer(i, base));
            detector.process_bar(&bars, i);
        }

        assert_eq!(detector.last_low().unwrap().price, 99.0);
        assert_eq!(detector.previous_low().unwrap().price, 97.0);
        assert_eq!(detector.recent_lows(2).len(), 2);
        assert_eq!(detector.recent_lows(10).len(), 3);
        assert!(detector.last_high().is_none());

        detector.clear();
        assert!(detector.last_low().is_none());
        assert!(detector.previous_low().is_none());
    }
}
