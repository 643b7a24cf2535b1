//! Average True Range (ATR).

use crate::models::Bar;

/// True range of each bar from the second onward:
/// `max(high - low, |high - prev_close|, |low - prev_close|)`.
pub fn true_ranges(bars: &[Bar]) -> Vec<f64> {
    bars.windows(2)
        .map(|pair| {
            let prev_close = pair[0].close;
            let bar = &pair[1];
            (bar.high - bar.low)
                .max((bar.high - prev_close).abs())
                .max((bar.low - prev_close).abs())
        })
        .collect()
}

/// Latest ATR value: the arithmetic mean of the last `period` true ranges.
///
/// This is the convention the signal engine uses for zone widths and
/// stop-loss buffers. Returns `None` until `period + 1` bars exist.
///
/// Not interchangeable with [`atr_series`], which applies Wilder smoothing;
/// the two must never be compared in a single assertion.
pub fn atr(bars: &[Bar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period + 1 {
        return None;
    }
    let ranges = true_ranges(bars);
    let tail = &ranges[ranges.len() - period..];
    Some(tail.iter().sum::<f64>() / period as f64)
}

/// Full ATR series aligned to `bars`, Wilder smoothing after an SMA seed.
///
/// `result[period]` is the simple mean of the first `period` true ranges;
/// each later value is `(prev * (period - 1) + tr) / period`. Values before
/// index `period` are `None`.
pub fn atr_series(bars: &[Bar], period: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; bars.len()];
    if period == 0 || bars.len() < period + 1 {
        return result;
    }

    let ranges = true_ranges(bars);
    let seed = ranges[..period].iter().sum::<f64>() / period as f64;
    result[period] = Some(seed);

    let mut prev = seed;
    for i in (period + 1)..bars.len() {
        // ranges[i - 1] is the true range of bar i.
        prev = (prev * (period as f64 - 1.0) + ranges[i - 1]) / period as f64;
        result[i] = Some(prev);
    }
    result
}
