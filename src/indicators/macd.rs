//! Moving Average Convergence Divergence (MACD).

use serde::{Deserialize, Serialize};

use super::ema::ema;

/// MACD values at a single bar, in **raw** price units.
///
/// The ÷1000 display convention is applied only when a snapshot is rendered
/// into a payload; crossover detection always compares raw values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacdSnapshot {
    /// MACD line (fast EMA - slow EMA).
    pub macd: f64,
    /// Signal line (EMA of the MACD line).
    pub signal: f64,
    /// Histogram (MACD - signal).
    pub histogram: f64,
}

/// Calculate the latest MACD snapshot.
///
/// The fast and slow EMAs are aligned so the slow EMA's first value is
/// index 0 of the MACD line; the signal line is the EMA of that line.
/// Returns `None` until `slow_period + signal_period` closes exist, or when
/// the periods are degenerate (`fast >= slow` or any zero).
///
/// # Example
///
/// ```
/// use bottrade::indicators::macd;
///
/// let closes: Vec<f64> = (1..=50).map(|i| i as f64).collect();
/// let snap = macd(&closes, 12, 26, 9).unwrap();
/// assert!(snap.macd > 0.0); // fast EMA leads in a rising series
/// assert!(macd(&closes[..30], 12, 26, 9).is_none());
/// ```
pub fn macd(
    closes: &[f64],
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
) -> Option<MacdSnapshot> {
    if fast_period == 0 || slow_period == 0 || signal_period == 0 || fast_period >= slow_period {
        return None;
    }
    if closes.len() < slow_period + signal_period {
        return None;
    }

    let fast_ema = ema(closes, fast_period);
    let slow_ema = ema(closes, slow_period);

    // The slow EMA starts `slow - fast` entries later than the fast EMA.
    let offset = slow_period - fast_period;
    let line: Vec<f64> = slow_ema
        .iter()
        .enumerate()
        .map(|(i, slow)| fast_ema[i + offset] - slow)
        .collect();

    let signal_ema = ema(&line, signal_period);
    let macd_line = *line.last()?;
    let signal_line = *signal_ema.last()?;

    Some(MacdSnapshot {
        macd: macd_line,
        signal: signal_line,
        histogram: macd_line - signal_line,
    })
}

/// `true` when the MACD line crossed above the signal line between two
/// consecutive bars' snapshots.
///
/// Both snapshots must exist: during warm-up the crossover is `false`.
pub fn bullish_crossover(previous: Option<&MacdSnapshot>, current: Option<&MacdSnapshot>) -> bool {
    match (previous, current) {
        (Some(prev), Some(cur)) => prev.macd <= prev.signal && cur.macd > cur.signal,
        _ => false,
    }
}
