//! Backtest driver: replays historical bars through the same per-symbol
//! signal engines the live pipeline uses and simulates fills against the
//! signals' stop-loss and take-profit levels.
//!
//! Per bar, in order: test exits on any open position for the symbol
//! (stop-loss first, then take-profit, then the breakeven advance), feed
//! the bar to the symbol's engine, open a position when a signal fires and
//! none is open, then update equity, peak, and running max drawdown.
//!
//! The driver is deterministic: identical bar input and configuration
//! produce identical trades and equity curves.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::engine::{EngineConfig, SignalEngine};
use crate::error::Result;
use crate::models::{Bar, Signal};

/// Backtester configuration.
#[derive(Debug, Clone)]
pub struct BacktestConfig {
    /// Starting capital.
    pub initial_capital: f64,
    /// Position size per trade, as a percent of current capital.
    pub position_size_percent: f64,
    /// Engine tunables, shared with the live pipeline.
    pub engine: EngineConfig,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_capital: 100_000_000.0,
            position_size_percent: 10.0,
            engine: EngineConfig::default(),
        }
    }
}

/// Why a simulated position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    /// The bar's low reached the stop-loss.
    Sl,
    /// The bar's high reached the take-profit.
    Tp,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sl => f.write_str("SL"),
            Self::Tp => f.write_str("TP"),
        }
    }
}

/// A completed simulated trade.
#[derive(Debug, Clone, Serialize)]
pub struct Trade {
    /// The signal that opened the position (quantity reflects sizing).
    pub signal: Signal,
    /// Entry time (the signal's bar).
    pub entry_time: DateTime<Utc>,
    /// Exit time (the bar that hit SL or TP).
    pub exit_time: DateTime<Utc>,
    /// Entry fill price.
    pub entry_price: f64,
    /// Exit fill price.
    pub exit_price: f64,
    /// Share quantity.
    pub quantity: i64,
    /// Realized profit and loss.
    pub pnl: f64,
    /// P&L as a percent of the entry price.
    pub pnl_percent: f64,
    /// SL or TP.
    pub exit_reason: ExitReason,
}

/// One point of the equity curve (sampled after every bar).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EquityPoint {
    /// Bar timestamp.
    pub timestamp: DateTime<Utc>,
    /// Capital after processing the bar.
    pub equity: f64,
}

/// Backtest performance report.
#[derive(Debug, Clone, Serialize)]
pub struct BacktestReport {
    /// First bar timestamp.
    pub start: DateTime<Utc>,
    /// Last bar timestamp.
    pub end: DateTime<Utc>,
    /// Capital at the start.
    pub initial_capital: f64,
    /// Capital at the end.
    pub final_capital: f64,
    /// Total realized P&L.
    pub total_pnl: f64,
    /// Total P&L as a percent of initial capital.
    pub total_pnl_percent: f64,
    /// Number of closed trades.
    pub total_trades: usize,
    /// Trades with positive P&L.
    pub winning_trades: usize,
    /// Trades with zero or negative P&L.
    pub losing_trades: usize,
    /// Winning trades as a percent of all trades.
    pub win_rate: f64,
    /// Gross wins / |gross losses|; infinite when loss-free.
    pub profit_factor: f64,
    /// Mean P&L of winning trades.
    pub average_win: f64,
    /// Mean |P&L| of losing trades.
    pub average_loss: f64,
    /// Largest peak-to-trough capital drop, as a fraction of the peak.
    pub max_drawdown: f64,
    /// Same, in percent.
    pub max_drawdown_percent: f64,
    /// All closed trades, in exit order.
    pub trades: Vec<Trade>,
    /// Equity after every bar.
    pub equity_curve: Vec<EquityPoint>,
}

impl BacktestReport {
    fn empty(config: &BacktestConfig) -> Self {
        let now = Utc::now();
        Self {
            start: now,
            end: now,
            initial_capital: config.initial_capital,
            final_capital: config.initial_capital,
            total_pnl: 0.0,
            total_pnl_percent: 0.0,
            total_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            win_rate: 0.0,
            profit_factor: 0.0,
            average_win: 0.0,
            average_loss: 0.0,
            max_drawdown: 0.0,
            max_drawdown_percent: 0.0,
            trades: Vec::new(),
            equity_curve: Vec::new(),
        }
    }

    fn finalize(&mut self) {
        self.total_trades = self.trades.len();
        if self.total_trades == 0 {
            return;
        }

        let wins: Vec<&Trade> = self.trades.iter().filter(|t| t.pnl > 0.0).collect();
        let losses: Vec<&Trade> = self.trades.iter().filter(|t| t.pnl <= 0.0).collect();
        self.winning_trades = wins.len();
        self.losing_trades = losses.len();
        self.win_rate = self.winning_trades as f64 / self.total_trades as f64 * 100.0;

        let gross_wins: f64 = wins.iter().map(|t| t.pnl).sum();
        let gross_losses: f64 = losses.iter().map(|t| t.pnl).sum::<f64>().abs();

        self.profit_factor = if gross_losses > 0.0 {
            gross_wins / gross_losses
        } else {
            f64::INFINITY
        };
        self.average_win = if wins.is_empty() {
            0.0
        } else {
            gross_wins / wins.len() as f64
        };
        self.average_loss = if losses.is_empty() {
            0.0
        } else {
            gross_losses / losses.len() as f64
        };
    }
}

impl std::fmt::Display for BacktestReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "==================================================")?;
        writeln!(f, "BACKTEST REPORT")?;
        writeln!(f, "==================================================")?;
        writeln!(f, "Period: {} -> {}", self.start.date_naive(), self.end.date_naive())?;
        writeln!(f, "Initial Capital: {:.0}", self.initial_capital)?;
        writeln!(f, "Final Capital:   {:.0}", self.final_capital)?;
        writeln!(f, "--------------------------------------------------")?;
        writeln!(
            f,
            "Total PnL: {:.0} ({:.2}%)",
            self.total_pnl, self.total_pnl_percent
        )?;
        writeln!(f, "Max Drawdown: {:.2}%", self.max_drawdown_percent)?;
        writeln!(f, "--------------------------------------------------")?;
        writeln!(f, "Total Trades: {}", self.total_trades)?;
        writeln!(f, "Win Rate: {:.1}%", self.win_rate)?;
        writeln!(f, "Profit Factor: {:.2}", self.profit_factor)?;
        writeln!(f, "Avg Win:  {:.0}", self.average_win)?;
        writeln!(f, "Avg Loss: {:.0}", self.average_loss)?;
        write!(f, "==================================================")
    }
}

/// Replays bars through per-symbol signal engines and simulates fills.
pub struct Backtester {
    config: BacktestConfig,
}

impl Backtester {
    /// Backtester with the given configuration.
    pub fn new(config: BacktestConfig) -> Self {
        Self { config }
    }

    /// Run the simulation over `bars` (any symbol mix; sorted by timestamp
    /// internally, ties keep input order).
    pub fn run(&self, bars: &[Bar]) -> BacktestReport {
        if bars.is_empty() {
            return BacktestReport::empty(&self.config);
        }

        let mut ordered: Vec<Bar> = bars.to_vec();
        ordered.sort_by_key(|b| b.timestamp);

        let mut engines: HashMap<String, SignalEngine> = HashMap::new();
        let mut positions: HashMap<String, Signal> = HashMap::new();

        let mut capital = self.config.initial_capital;
        let mut peak = capital;
        let mut max_drawdown: f64 = 0.0;
        let mut trades: Vec<Trade> = Vec::new();
        let mut equity_curve: Vec<EquityPoint> = Vec::new();

        for bar in &ordered {
            // 1. Exits on the open position, stop first.
            let exit = positions.get_mut(&bar.symbol).and_then(|position| {
                if bar.low <= position.stop_loss {
                    Some((position.stop_loss, ExitReason::Sl))
                } else if bar.high >= position.take_profit {
                    Some((position.take_profit, ExitReason::Tp))
                } else {
                    if position.should_move_to_breakeven(bar.high) {
                        position.move_to_breakeven();
                        debug!(symbol = %bar.symbol, "stop advanced to breakeven");
                    }
                    None
                }
            });
            if let Some((exit_price, exit_reason)) = exit {
                if let Some(position) = positions.remove(&bar.symbol) {
                    let pnl = (exit_price - position.entry) * position.quantity as f64;
                    capital += pnl;
                    trades.push(Trade {
                        entry_time: position.timestamp,
                        exit_time: bar.timestamp,
                        entry_price: position.entry,
                        exit_price,
                        quantity: position.quantity,
                        pnl,
                        pnl_percent: (exit_price - position.entry) / position.entry * 100.0,
                        exit_reason,
                        signal: position,
                    });
                }
            }

            // 2. Feed the bar to the symbol's engine.
            let engine = engines.entry(bar.symbol.clone()).or_insert_with(|| {
                SignalEngine::new(bar.symbol.clone(), self.config.engine.clone())
            });
            let outcome = engine.add_bar(bar.clone());

            // 3. Open a position on a fresh signal, one per symbol.
            if let Some(mut signal) = outcome.signal {
                if !positions.contains_key(&bar.symbol) {
                    let budget = capital * self.config.position_size_percent / 100.0;
                    let quantity = (budget / signal.entry).floor() as i64;
                    if quantity > 0 {
                        signal.quantity = quantity;
                        positions.insert(bar.symbol.clone(), signal);
                    } else {
                        debug!(symbol = %bar.symbol, "signal skipped: zero quantity");
                    }
                }
            }

            // 4. Equity, peak, drawdown.
            equity_curve.push(EquityPoint {
                timestamp: bar.timestamp,
                equity: capital,
            });
            if capital > peak {
                peak = capital;
            }
            let drawdown = (peak - capital) / peak;
            if drawdown > max_drawdown {
                max_drawdown = drawdown;
            }
        }

        let mut report = BacktestReport {
            start: ordered[0].timestamp,
            end: ordered[ordered.len() - 1].timestamp,
            initial_capital: self.config.initial_capital,
            final_capital: capital,
            total_pnl: capital - self.config.initial_capital,
            total_pnl_percent: (capital - self.config.initial_capital)
                / self.config.initial_capital
                * 100.0,
            max_drawdown,
            max_drawdown_percent: max_drawdown * 100.0,
            trades,
            equity_curve,
            total_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            win_rate: 0.0,
            profit_factor: 0.0,
            average_win: 0.0,
            average_loss: 0.0,
        };
        report.finalize();
        report
    }
}

/// Load bars from a CSV file for the replay driver.
///
/// Recognized time column names: `time`, `date`, `datetime` (first match
/// wins, case-insensitive); price/volume columns are `open`, `high`,
/// `low`, `close`, `volume` (case-insensitive). Accepted time formats:
/// `%Y-%m-%d %H:%M:%S`, `%Y-%m-%d`, `%d/%m/%Y %H:%M:%S`, `%d/%m/%Y`.
/// Unparseable rows are skipped with a warning.
pub fn load_bars_from_csv(
    path: impl AsRef<Path>,
    symbol: &str,
    timeframe: &str,
) -> Result<Vec<Bar>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let column = |names: &[&str]| -> Option<usize> {
        headers
            .iter()
            .position(|h| names.iter().any(|n| h.eq_ignore_ascii_case(n)))
    };
    let time_col = column(&["time", "date", "datetime"]);
    let open_col = column(&["open"]);
    let high_col = column(&["high"]);
    let low_col = column(&["low"]);
    let close_col = column(&["close"]);
    let volume_col = column(&["volume"]);

    let mut bars = Vec::new();
    for record in reader.records() {
        let record = record?;
        let parsed = parse_csv_row(
            &record, symbol, timeframe, time_col, open_col, high_col, low_col, close_col,
            volume_col,
        );
        match parsed {
            Some(bar) if bar.is_well_formed() => bars.push(bar),
            Some(bar) => warn!(symbol = %bar.symbol, ts = %bar.timestamp, "malformed csv bar skipped"),
            None => warn!("unparseable csv row skipped"),
        }
    }
    Ok(bars)
}

#[allow(clippy::too_many_arguments)]
fn parse_csv_row(
    record: &csv::StringRecord,
    symbol: &str,
    timeframe: &str,
    time_col: Option<usize>,
    open_col: Option<usize>,
    high_col: Option<usize>,
    low_col: Option<usize>,
    close_col: Option<usize>,
    volume_col: Option<usize>,
) -> Option<Bar> {
    let timestamp = parse_csv_time(record.get(time_col?)?)?;
    let number = |col: Option<usize>| -> Option<f64> { record.get(col?)?.trim().parse().ok() };

    Some(Bar {
        symbol: symbol.to_uppercase(),
        timeframe: timeframe.to_string(),
        timestamp,
        open: number(open_col)?,
        high: number(high_col)?,
        low: number(low_col)?,
        close: number(close_col)?,
        volume: number(volume_col).unwrap_or(0.0),
    })
}

fn parse_csv_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    for fmt in ["%Y-%m-%d %H:%M:%S", "%d/%m/%Y %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    for fmt in ["%Y-%m-%d", "%d/%m/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SignalStatus;
    use chrono::{Duration, TimeZone};
    use std::io::Write;

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
            volume: 1000.0,
        }
    }

    fn filler(i: usize, base: f64) -> Bar {
        bar(i, base, base + 1.3, base - 0.3, base + 1.0)
    }

    #[test]
    fn test_empty_input_gives_flat_report() {
        let report = Backtester::new(BacktestConfig::default()).run(&[]);
        assert_eq!(report.total_trades, 0);
        assert_eq!(report.final_capital, report.initial_capital);
        assert!(report.equity_curve.is_empty());
    }

    #[test]
    fn test_no_signals_no_trades() {
        let bars: Vec<Bar> = (0..50).map(|i| filler(i, 100.0 + (i % 3) as f64)).collect();
        let report = Backtester::new(BacktestConfig::default()).run(&bars);
        assert_eq!(report.total_trades, 0);
        assert_eq!(report.final_capital, report.initial_capital);
        assert_eq!(report.equity_curve.len(), 50);
        assert_eq!(report.max_drawdown, 0.0);
    }

    #[test]
    fn test_determinism() {
        let bars: Vec<Bar> = (0..60).map(|i| filler(i, 100.0 + (i % 5) as f64)).collect();
        let a = Backtester::new(BacktestConfig::default()).run(&bars);
        let b = Backtester::new(BacktestConfig::default()).run(&bars);
        assert_eq!(a.final_capital, b.final_capital);
        assert_eq!(a.trades.len(), b.trades.len());
        assert_eq!(a.equity_curve, b.equity_curve);
    }

    #[test]
    fn test_profit_factor_infinite_without_losses() {
        let mut report = BacktestReport::empty(&BacktestConfig::default());
        report.trades.push(Trade {
            signal: sample_signal(100.0, 95.0, 110.0, 10),
            entry_time: Utc::now(),
            exit_time: Utc::now(),
            entry_price: 100.0,
            exit_price: 110.0,
            quantity: 10,
            pnl: 100.0,
            pnl_percent: 10.0,
            exit_reason: ExitReason::Tp,
        });
        report.finalize();
        assert!(report.profit_factor.is_infinite());
        assert_eq!(report.win_rate, 100.0);
        // The report must render without panicking.
        let rendered = format!("{report}");
        assert!(rendered.contains("Profit Factor"));
    }

    fn sample_signal(entry: f64, stop_loss: f64, take_profit: f64, quantity: i64) -> Signal {
        Signal {
            id: None,
            symbol: "VNM".to_string(),
            signal_type: crate::models::SignalType::Buy,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 2, 0, 0).unwrap(),
            entry,
            stop_loss,
            take_profit,
            quantity,
            status: SignalStatus::Active,
            reason: "test".to_string(),
            original_sl: stop_loss,
        }
    }

    #[test]
    fn test_metrics_mix_of_wins_and_losses() {
        let mut report = BacktestReport::empty(&BacktestConfig::default());
        for (pnl, reason) in [(100.0, ExitReason::Tp), (-40.0, ExitReason::Sl), (60.0, ExitReason::Tp)] {
            report.trades.push(Trade {
                signal: sample_signal(100.0, 95.0, 110.0, 10),
                entry_time: Utc::now(),
                exit_time: Utc::now(),
                entry_price: 100.0,
                exit_price: 100.0 + pnl / 10.0,
                quantity: 10,
                pnl,
                pnl_percent: pnl / 10.0,
                exit_reason: reason,
            });
        }
        report.finalize();

        assert_eq!(report.total_trades, 3);
        assert_eq!(report.winning_trades, 2);
        assert_eq!(report.losing_trades, 1);
        assert!((report.win_rate - 200.0 / 3.0).abs() < 1e-9);
        assert!((report.profit_factor - 4.0).abs() < 1e-9);
        assert!((report.average_win - 80.0).abs() < 1e-9);
        assert!((report.average_loss - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_csv_loader() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "time,open,high,low,close,volume").unwrap();
        writeln!(file, "2024-01-02 02:00:00,100,101,99,100.5,1000").unwrap();
        writeln!(file, "2024-01-02 03:00:00,100.5,102,100,101.5,1200").unwrap();
        writeln!(file, "not-a-date,1,2,0,1,5").unwrap();
        // Malformed OHLC: skipped.
        writeln!(file, "2024-01-02 04:00:00,100,99,98,100.5,900").unwrap();
        file.flush().unwrap();

        let bars = load_bars_from_csv(file.path(), "vnm", "1H").unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].symbol, "VNM");
        assert_eq!(bars[0].close, 100.5);
        assert_eq!(
            bars[1].timestamp,
            Utc.with_ymd_and_hms(2024, 1, 2, 3, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_csv_date_only_rows() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "date,Open,High,Low,Close").unwrap();
        writeln!(file, "2024-01-02,100,101,99,100.5").unwrap();
        writeln!(file, "03/01/2024,100.5,102,100,101.5").unwrap();
        file.flush().unwrap();

        let bars = load_bars_from_csv(file.path(), "VNM", "1D").unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].volume, 0.0);
        assert_eq!(
            bars[1].timestamp,
            Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap()
        );
    }
}
