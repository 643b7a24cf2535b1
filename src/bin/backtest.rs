//! Backtest replay driver.
//!
//! Usage: `backtest <bars.csv> <SYMBOL> [TIMEFRAME]`
//!
//! Replays a CSV of historical bars through the signal engine with the
//! configuration taken from the environment and prints the performance
//! report.

use anyhow::{bail, Context};

use bottrade::backtest::{load_bars_from_csv, BacktestConfig, Backtester};
use bottrade::Settings;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (path, symbol) = match args.as_slice() {
        [path, symbol, ..] => (path.clone(), symbol.clone()),
        _ => bail!("usage: backtest <bars.csv> <SYMBOL> [TIMEFRAME]"),
    };

    let settings = Settings::from_env();
    let timeframe = args
        .get(2)
        .cloned()
        .unwrap_or_else(|| settings.timeframe.clone());

    let bars = load_bars_from_csv(&path, &symbol, &timeframe)
        .with_context(|| format!("loading bars from {path}"))?;
    if bars.is_empty() {
        bail!("no usable bars in {path}");
    }
    println!("Loaded {} bars for {}", bars.len(), symbol.to_uppercase());

    let tester = Backtester::new(BacktestConfig {
        initial_capital: settings.backtest_initial_capital,
        position_size_percent: settings.backtest_position_size_percent,
        engine: settings.engine,
    });
    let report = tester.run(&bars);
    println!("{report}");
    Ok(())
}
