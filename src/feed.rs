//! Inbound market-data normalization.
//!
//! The transport (MQTT over WebSocket, mock generators, replay files)
//! delivers closed bars as loose JSON. [`BarAdapter`] turns those payloads
//! into validated [`Bar`]s:
//!
//! - timestamps may be epoch seconds (integer, float, or decimal string)
//!   or an ISO-8601 string,
//! - the source-specific "prices scaled down by 1000" kludge is handled by
//!   an **opt-in** rescale flag (off by default),
//! - malformed bars (OHLC ordering violations, non-finite numbers) are
//!   rejected so they never enter a pipeline.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use crate::models::Bar;

/// Prices below this threshold are assumed to be scaled down by 1000 when
/// rescaling is enabled (true VND equity prices sit in the tens of
/// thousands).
const SCALED_PRICE_THRESHOLD: f64 = 1000.0;

/// Errors produced while normalizing a transport payload.
///
/// All of these are transient from the pipeline's point of view: log,
/// skip the message, keep running.
#[derive(Debug, Error)]
pub enum FeedError {
    /// A required field was absent.
    #[error("missing field: {0}")]
    Missing(&'static str),

    /// A field could not be read as a number.
    #[error("invalid number in field: {0}")]
    InvalidNumber(&'static str),

    /// The timestamp was in no recognized format.
    #[error("unrecognized timestamp: {0}")]
    Timestamp(String),

    /// The bar failed the OHLC sanity check.
    #[error("malformed bar: {0}")]
    MalformedBar(String),
}

/// Normalizes raw transport payloads into [`Bar`]s for one timeframe.
#[derive(Debug, Clone)]
pub struct BarAdapter {
    timeframe: String,
    rescale_sub_thousand: bool,
}

impl BarAdapter {
    /// Adapter for the given timeframe label, rescaling disabled.
    pub fn new(timeframe: impl Into<String>) -> Self {
        Self {
            timeframe: timeframe.into(),
            rescale_sub_thousand: false,
        }
    }

    /// Enable or disable the ×1000 rescale heuristic for this transport.
    pub fn with_rescale(mut self, enabled: bool) -> Self {
        self.rescale_sub_thousand = enabled;
        self
    }

    /// Parse a raw payload of the shape
    /// `{ "symbol": "...", "time": ..., "open": ..., ... }` into a bar.
    ///
    /// The `t` key is accepted as an alias for `time`; volume defaults to
    /// zero when absent.
    pub fn parse(&self, payload: &Value) -> Result<Bar, FeedError> {
        let symbol = payload
            .get("symbol")
            .and_then(Value::as_str)
            .ok_or(FeedError::Missing("symbol"))?
            .to_uppercase();

        let time_value = payload
            .get("time")
            .or_else(|| payload.get("t"))
            .ok_or(FeedError::Missing("time"))?;
        let timestamp = parse_timestamp(time_value)?;

        let mut open = field_f64(payload, "open")?;
        let mut high = field_f64(payload, "high")?;
        let mut low = field_f64(payload, "low")?;
        let mut close = field_f64(payload, "close")?;
        let volume = match payload.get("volume") {
            Some(v) => value_f64(v).ok_or(FeedError::InvalidNumber("volume"))?,
            None => 0.0,
        };

        if self.rescale_sub_thousand && close < SCALED_PRICE_THRESHOLD {
            open *= 1000.0;
            high *= 1000.0;
            low *= 1000.0;
            close *= 1000.0;
        }

        let bar = Bar {
            symbol,
            timeframe: self.timeframe.clone(),
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        };

        if !bar.is_well_formed() {
            return Err(FeedError::MalformedBar(format!(
                "{} O:{} H:{} L:{} C:{}",
                bar.symbol, bar.open, bar.high, bar.low, bar.close
            )));
        }
        Ok(bar)
    }
}

/// Parse a timestamp that may be epoch seconds (number, integer string, or
/// decimal string) or an ISO-8601 / RFC-3339 string.
pub fn parse_timestamp(value: &Value) -> Result<DateTime<Utc>, FeedError> {
    match value {
        Value::Number(n) => {
            let secs = n
                .as_f64()
                .ok_or_else(|| FeedError::Timestamp(n.to_string()))?;
            epoch_to_datetime(secs)
        }
        Value::String(s) => {
            let trimmed = s.trim();
            if let Ok(secs) = trimmed.parse::<f64>() {
                return epoch_to_datetime(secs);
            }
            if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
                return Ok(dt.with_timezone(&Utc));
            }
            // Bare ISO datetime without offset: treat as UTC.
            if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S") {
                return Ok(naive.and_utc());
            }
            if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
                return Ok(naive.and_utc());
            }
            Err(FeedError::Timestamp(s.clone()))
        }
        other => Err(FeedError::Timestamp(other.to_string())),
    }
}

fn epoch_to_datetime(secs: f64) -> Result<DateTime<Utc>, FeedError> {
    if !secs.is_finite() {
        return Err(FeedError::Timestamp(secs.to_string()));
    }
    let whole = secs.trunc() as i64;
    let nanos = ((secs - secs.trunc()) * 1e9) as u32;
    DateTime::from_timestamp(whole, nanos).ok_or_else(|| FeedError::Timestamp(secs.to_string()))
}

fn field_f64(payload: &Value, key: &'static str) -> Result<f64, FeedError> {
    let value = payload.get(key).ok_or(FeedError::Missing(key))?;
    value_f64(value).ok_or(FeedError::InvalidNumber(key))
}

/// Numbers may arrive as JSON numbers or numeric strings.
fn value_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
