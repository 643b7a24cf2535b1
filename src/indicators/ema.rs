//! Exponential Moving Average (EMA).

/// Calculate a compact EMA series.
///
/// The first output value is the SMA of the first `period` inputs and
/// corresponds to input index `period - 1`; each following value advances
/// one input. Returns an empty vector when there is not enough data.
///
/// # Formula
///
/// - `ema[0] = mean(data[..period])`
/// - `alpha = 2 / (period + 1)`
/// - `ema[t] = data[t] * alpha + ema[t-1] * (1 - alpha)`
///
/// # Example
///
/// ```
/// use bottrade::indicators::ema;
///
/// let prices = vec![10.0, 11.0, 12.0, 13.0];
/// let result = ema(&prices, 3);
/// // Seeded with SMA(10, 11, 12) = 11, then advanced once.
/// assert_eq!(result.len(), 2);
/// assert!((result[0] - 11.0).abs() < 1e-12);
/// ```
pub fn ema(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period {
        return Vec::new();
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let mut prev = data[..period].iter().sum::<f64>() / period as f64;

    let mut result = Vec::with_capacity(data.len() - period + 1);
    result.push(prev);
    for &price in &data[period..] {
        prev = price * alpha + prev * (1.0 - alpha);
        result.push(prev);
    }
    result
}
