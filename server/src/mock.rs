//! Mock market feed.
//!
//! Generates random-walk bars for every running pipeline on a fixed tick,
//! so the full ingest path (persist, analyze, broadcast) can be exercised
//! without a live transport. Enabled with `MOCK_FEED=true`.

use std::collections::HashMap;
use std::sync::Arc;

use bottrade::models::Bar;
use bottrade::pipeline::PipelineSet;
use chrono::Utc;
use rand::Rng;
use tokio::time::{interval, Duration};
use tracing::debug;

/// Seconds between generated bars.
const TICK_SECS: u64 = 10;

/// Starting price for symbols we have not seen yet (VND).
const BASE_PRICE: f64 = 65_000.0;

/// Generate bars forever; follows watchlist changes on every tick.
pub async fn run(pipelines: Arc<PipelineSet>, timeframe: String) {
    let mut last_close: HashMap<String, f64> = HashMap::new();
    let mut ticker = interval(Duration::from_secs(TICK_SECS));

    loop {
        ticker.tick().await;
        for symbol in pipelines.symbols() {
            let prev = *last_close.entry(symbol.clone()).or_insert(BASE_PRICE);
            let bar = random_walk_bar(&symbol, &timeframe, prev);
            last_close.insert(symbol, bar.close.max(1.0));
            debug!(symbol = %bar.symbol, close = bar.close, "mock bar generated");
            pipelines.ingest(bar);
        }
    }
}

fn random_walk_bar(symbol: &str, timeframe: &str, prev_close: f64) -> Bar {
    let mut rng = rand::thread_rng();

    let open = prev_close;
    let close = prev_close * (1.0 + rng.gen_range(-0.010..0.012));
    let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.004));
    let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.004));

    Bar {
        symbol: symbol.to_string(),
        timeframe: timeframe.to_string(),
        timestamp: Utc::now(),
        open,
        high,
        low,
        close,
        volume: rng.gen_range(50_000..1_000_000) as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_bars_are_well_formed() {
        let mut prev = BASE_PRICE;
        for _ in 0..500 {
            let bar = random_walk_bar("VNM", "1H", prev);
            assert!(bar.is_well_formed(), "bad bar: {bar:?}");
            prev = bar.close;
        }
    }
}
