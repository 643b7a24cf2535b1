//! Pivot points and the support zone derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::patterns::CandlePattern;

/// Whether a pivot marks a local low or a local high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PivotKind {
    /// Local minimum, anchored at the source bar's low.
    Low,
    /// Local maximum, anchored at the source bar's high.
    High,
}

/// A local price extremum identified by a reversal pattern at the tail of
/// the bar series.
///
/// Pivots are append-only per symbol; insertion order equals chronological
/// order and `bar_index` is strictly increasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pivot {
    /// Low or high.
    #[serde(rename = "type")]
    pub kind: PivotKind,
    /// The source bar's low (for a pivot-low) or high (for a pivot-high).
    pub price: f64,
    /// Timestamp of the source bar.
    pub timestamp: DateTime<Utc>,
    /// Index of the source bar in the symbol's full bar sequence.
    pub bar_index: usize,
    /// The reversal pattern that produced this pivot.
    pub pattern: CandlePattern,
}

/// Price band around the most recent pivot-low, width `k * ATR` on each
/// side. Recomputed every bar and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportZone {
    /// The pivot-low the zone is built from.
    pub pivot: Pivot,
    /// Lower edge of the band.
    pub low: f64,
    /// Upper edge of the band.
    pub high: f64,
}

impl SupportZone {
    /// Build a zone of half-width `width` around `pivot.price`.
    pub fn around(pivot: Pivot, width: f64) -> Self {
        let low = pivot.price - width;
        let high = pivot.price + width;
        Self { pivot, low, high }
    }

    /// `true` when the `[bar_low, bar_high]` price range overlaps the zone.
    pub fn touches(&self, bar_low: f64, bar_high: f64) -> bool {
        bar_low <= self.high && bar_high >= self.low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn pivot(price: f64) -> Pivot {
        Pivot {
            kind: PivotKind::Low,
            price,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 2, 0, 0).unwrap(),
            bar_index: 7,
            pattern: CandlePattern::Hammer,
        }
    }

    #[test]
    fn test_zone_bounds() {
        let zone = SupportZone::around(pivot(100.0), 2.0);
        assert_eq!(zone.low, 98.0);
        assert_eq!(zone.high, 102.0);
    }

    #[test]
    fn test_zone_touches_overlap() {
        let zone = SupportZone::around(pivot(100.0), 2.0);
        // bar range straddles the zone
        assert!(zone.touches(97.0, 103.0));
        // bar dips into the zone from above
        assert!(zone.touches(101.0, 110.0));
        // bar entirely above
        assert!(!zone.touches(102.5, 110.0));
        // bar entirely below
        assert!(!zone.touches(90.0, 97.5));
        // edge contact counts
        assert!(zone.touches(102.0, 110.0));
    }

    #[test]
    fn test_pivot_serializes_kind_as_type() {
        let json = serde_json::to_value(pivot(100.0)).unwrap();
        assert_eq!(json["type"], "LOW");
        assert_eq!(json["pattern"], "HAMMER");
        assert_eq!(json["bar_index"], 7);
    }
}
