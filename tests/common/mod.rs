//! Shared fixtures: bar constructors and a bar sequence that ends in a
//! complete BUY setup.

// Each integration test binary compiles this module separately and uses a
// different subset of it.
#![allow(dead_code)]

use bottrade::models::Bar;
use chrono::{DateTime, Duration, TimeZone, Utc};

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 2, 2, 0, 0).unwrap()
}

pub fn bar(i: usize, open: f64, high: f64, low: f64, close: f64) -> Bar {
    Bar {
        symbol: "VNM".to_string(),
        timeframe: "1H".to_string(),
        timestamp: start_time() + Duration::hours(i as i64),
        open,
        high,
        low,
        close,
        volume: 100_000.0,
    }
}

/// Neutral bar: medium body, forms no pattern.
pub fn filler(i: usize, base: f64) -> Bar {
    bar(i, base, base + 1.3, base - 0.3, base + 1.0)
}

/// Bullish hammer with its low at `base`.
pub fn hammer(i: usize, base: f64) -> Bar {
    bar(i, base + 4.5, base + 5.2, base, base + 5.0)
}

/// Bearish shooting star with its high at `top`.
pub fn star(i: usize, top: f64) -> Bar {
    bar(i, top - 4.5, top, top - 5.2, top - 5.0)
}

/// Fifteen bars that end in a complete BUY setup on the last bar.
///
/// Six rising fillers (RSI warm-up), then alternating hammers and shooting
/// stars building five ascending pivot-lows (100, 103, 106, 109, 109.5)
/// and four ascending pivot-highs (112, 115, 118, 121). The final bar is a
/// hammer whose low (109.5) sits just above the fourth pivot-low, inside
/// the support zone, with RSI far above 50. Expected on the last bar:
/// exactly one BUY signal with entry 114.5 and the stop below the fourth
/// pivot-low at 109.
pub fn buy_ladder() -> Vec<Bar> {
    let mut bars = Vec::with_capacity(15);
    for i in 0..6 {
        bars.push(filler(i, 90.0 + i as f64));
    }
    bars.push(hammer(6, 100.0));
    bars.push(star(7, 112.0));
    bars.push(hammer(8, 103.0));
    bars.push(star(9, 115.0));
    bars.push(hammer(10, 106.0));
    bars.push(star(11, 118.0));
    bars.push(hammer(12, 109.0));
    bars.push(star(13, 121.0));
    bars.push(bar(14, 114.0, 114.7, 109.5, 114.5));
    bars
}

/// The pivot-low the ladder's stop-loss derives from.
pub const LADDER_PREV_PIVOT_LOW: f64 = 109.0;

/// The ladder's expected entry price (final close).
pub const LADDER_ENTRY: f64 = 114.5;
