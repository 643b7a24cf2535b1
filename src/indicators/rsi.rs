//! Relative Strength Index (RSI), Wilder smoothing.

/// Calculate the latest RSI value over `closes`.
///
/// Uses Wilder's smoothing, the convention TradingView and most platforms
/// follow: the first average gain/loss is a simple mean over the first
/// `period` price changes, every later one is
/// `(prev * (period - 1) + change) / period`.
///
/// Returns `None` until at least `period + 1` closes exist. When the
/// average loss is zero the RSI is exactly 100.
///
/// # Example
///
/// ```
/// use bottrade::indicators::rsi;
///
/// let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
/// // Monotonic gains: no losses, RSI pegs at 100.
/// assert_eq!(rsi(&closes, 14), Some(100.0));
/// assert_eq!(rsi(&closes[..10], 14), None);
/// ```
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }

    let mut gains = Vec::with_capacity(closes.len() - 1);
    let mut losses = Vec::with_capacity(closes.len() - 1);
    for pair in closes.windows(2) {
        let change = pair[1] - pair[0];
        if change > 0.0 {
            gains.push(change);
            losses.push(0.0);
        } else {
            gains.push(0.0);
            losses.push(-change);
        }
    }

    let mut avg_gain = gains[..period].iter().sum::<f64>() / period as f64;
    let mut avg_loss = losses[..period].iter().sum::<f64>() / period as f64;

    for i in period..gains.len() {
        avg_gain = (avg_gain * (period as f64 - 1.0) + gains[i]) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + losses[i]) / period as f64;
    }

    if avg_loss == 0.0 {
        return Some(100.0);
    }

    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}
