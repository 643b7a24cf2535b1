//! Signal generation engine.
//!
//! One engine instance per symbol. Each closed bar is appended to a bounded
//! history, checked for a pivot, and then evaluated against the four BUY
//! conditions:
//!
//! 1. zig-zag uptrend (at least four ascending pivot-lows and pivot-highs),
//! 2. price touching the support zone around the latest pivot-low,
//! 3. a bullish reversal pattern on the tail bar,
//! 4. confirmation: MACD bullish crossover or RSI above 50.
//!
//! Every bar produces a [`SignalCheck`] snapshot; a [`Signal`] is produced
//! only when all four conditions pass and the stop-loss invariant holds.
//! Warm-up is not an error: conditions simply fail with a reason.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::error;

use crate::indicators::{self, IndicatorConfig, MacdSnapshot};
use crate::models::{Bar, Pivot, Signal, SignalStatus, SignalType, SupportZone};
use crate::patterns::{self, PatternParams};
use crate::pivots::PivotDetector;
use crate::trend;

/// Number of conditions the BUY rule evaluates.
pub const TOTAL_CONDITIONS: usize = 4;

/// Bars of history kept per symbol.
pub const HISTORY_CAP: usize = 200;

/// Pivots of each kind included in the signal-check payload.
const PIVOT_TAIL: usize = 5;

/// Entry price used by the demo hook when no bar history exists.
const DEMO_FALLBACK_PRICE: f64 = 50_000.0;

/// Synthetic risk used by the demo hook, as a fraction of entry.
const DEMO_RISK_FRACTION: f64 = 0.02;

/// Engine tunables.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Support-zone half-width as a multiple of ATR.
    pub zone_width_atr_mult: f64,
    /// Stop-loss buffer below the pivot-low, as a multiple of ATR.
    pub sl_buffer_atr_mult: f64,
    /// Take-profit distance as a multiple of the entry-to-stop risk.
    pub risk_reward_ratio: f64,
    /// Share quantity attached to emitted signals.
    pub default_quantity: i64,
    /// Indicator periods.
    pub indicators: IndicatorConfig,
    /// Pattern thresholds.
    pub patterns: PatternParams,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            zone_width_atr_mult: 0.2,
            sl_buffer_atr_mult: 0.05,
            risk_reward_ratio: 2.0,
            default_quantity: 100,
            indicators: IndicatorConfig::default(),
            patterns: PatternParams::default(),
        }
    }
}

/// Indicator values as rendered into the signal-check payload
/// (MACD display-scaled, histogram omitted).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CheckIndicators {
    /// RSI value.
    pub rsi: Option<f64>,
    /// MACD line, display-scaled.
    pub macd: Option<f64>,
    /// MACD signal line, display-scaled.
    pub macd_signal: Option<f64>,
    /// ATR value.
    pub atr: Option<f64>,
}

/// Pivot/trend/zone context embedded in the signal-check payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisContext {
    /// Last pivot-lows, oldest first.
    pub pivot_lows: Vec<Pivot>,
    /// Last pivot-highs, oldest first.
    pub pivot_highs: Vec<Pivot>,
    /// Consecutive higher-low pairs.
    pub higher_lows_count: usize,
    /// Consecutive higher-high pairs.
    pub higher_highs_count: usize,
    /// Whether the zig-zag uptrend holds.
    pub is_uptrend: bool,
    /// Trend explanation.
    pub trend_reason: String,
    /// Support zone around the latest pivot-low, when computable.
    pub support_zone: Option<SupportZone>,
    /// Current bar low.
    pub bar_low: f64,
    /// Current bar high.
    pub bar_high: f64,
    /// Total bars ingested for this symbol.
    pub total_bars: usize,
}

/// Per-bar diagnostic snapshot: which BUY conditions passed and the state
/// used to decide. Broadcast on every bar regardless of outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalCheck {
    /// Symbol the check belongs to.
    pub symbol: String,
    /// The bar that was evaluated.
    pub bar: Bar,
    /// Number of passed conditions.
    pub conditions_passed: usize,
    /// Always [`TOTAL_CONDITIONS`].
    pub total_conditions: usize,
    /// Reasons for the passed conditions.
    pub passed: Vec<String>,
    /// Reasons for the failed conditions.
    pub failed: Vec<String>,
    /// Indicator values (display-scaled).
    pub indicators: CheckIndicators,
    /// Pivot, trend, and zone context.
    pub analysis: AnalysisContext,
    /// Emission time.
    pub timestamp: DateTime<Utc>,
}

/// Result of feeding one bar to the engine.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    /// The diagnostic snapshot (always present).
    pub check: SignalCheck,
    /// The new signal, when all conditions passed and invariants held.
    pub signal: Option<Signal>,
}

/// Per-symbol streaming signal engine.
#[derive(Debug)]
pub struct SignalEngine {
    symbol: String,
    cfg: EngineConfig,
    bars: Vec<Bar>,
    bars_seen: usize,
    pivots: PivotDetector,
    prev_macd: Option<MacdSnapshot>,
}

impl SignalEngine {
    /// New engine for `symbol` with the given tunables.
    pub fn new(symbol: impl Into<String>, cfg: EngineConfig) -> Self {
        let pivots = PivotDetector::new(cfg.patterns);
        Self {
            symbol: symbol.into(),
            cfg,
            bars: Vec::new(),
            bars_seen: 0,
            pivots,
            prev_macd: None,
        }
    }

    /// The symbol this engine analyzes.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Total bars ingested (including those trimmed from the history).
    pub fn bars_seen(&self) -> usize {
        self.bars_seen
    }

    /// The most recent bar, if any.
    pub fn last_bar(&self) -> Option<&Bar> {
        self.bars.last()
    }

    /// Replay historical bars without producing outcomes, leaving the
    /// engine ready for live bars. Used when a worker seeds from the store.
    pub fn seed(&mut self, bars: &[Bar]) {
        for bar in bars {
            self.push_bar(bar.clone());
        }
        let closes: Vec<f64> = self.bars.iter().map(|b| b.close).collect();
        self.prev_macd = indicators::macd(
            &closes,
            self.cfg.indicators.macd_fast,
            self.cfg.indicators.macd_slow,
            self.cfg.indicators.macd_signal,
        );
    }

    /// Ingest a closed bar: detect pivots, evaluate the BUY rule, and
    /// return the check snapshot plus any fired signal.
    pub fn add_bar(&mut self, bar: Bar) -> CheckOutcome {
        let current = bar.clone();
        self.push_bar(bar);

        let closes: Vec<f64> = self.bars.iter().map(|b| b.close).collect();
        let current_macd = indicators::macd(
            &closes,
            self.cfg.indicators.macd_fast,
            self.cfg.indicators.macd_slow,
            self.cfg.indicators.macd_signal,
        );

        let outcome = self.evaluate(&current, current_macd.as_ref());
        self.prev_macd = current_macd;
        outcome
    }

    /// Drop all state, as if the engine were freshly created.
    pub fn reset(&mut self) {
        self.bars.clear();
        self.bars_seen = 0;
        self.pivots.clear();
        self.prev_macd = None;
    }

    /// Demo/test hook: synthesize an Active BUY signal directly, bypassing
    /// the rule engine. Prices derive from `last_bar` when given, otherwise
    /// from a nominal fallback.
    pub fn demo_signal(&self, last_bar: Option<&Bar>) -> Signal {
        let (entry, timestamp) = match last_bar {
            Some(bar) => (bar.close, bar.timestamp),
            None => (DEMO_FALLBACK_PRICE, Utc::now()),
        };
        let risk = entry * DEMO_RISK_FRACTION;
        let stop_loss = entry - risk;
        Signal {
            id: None,
            symbol: self.symbol.clone(),
            signal_type: SignalType::Buy,
            timestamp,
            entry,
            stop_loss,
            take_profit: entry + self.cfg.risk_reward_ratio * risk,
            quantity: self.cfg.default_quantity,
            status: SignalStatus::Active,
            reason: "Demo signal (forced, bypasses rule engine)".to_string(),
            original_sl: stop_loss,
        }
    }

    fn push_bar(&mut self, bar: Bar) {
        let bar_index = self.bars_seen;
        self.bars_seen += 1;
        self.bars.push(bar);
        if self.bars.len() > HISTORY_CAP {
            self.bars.remove(0);
        }
        self.pivots.process_bar(&self.bars, bar_index);
    }

    fn evaluate(&self, current: &Bar, current_macd: Option<&MacdSnapshot>) -> CheckOutcome {
        let snap = indicators::snapshot(&self.bars, &self.cfg.indicators);
        let trend = trend::analyze(self.pivots.lows(), self.pivots.highs());

        let mut passed = Vec::new();
        let mut failed = Vec::new();

        // Condition 1: zig-zag uptrend.
        if trend.is_uptrend {
            passed.push(trend.reason.clone());
        } else {
            failed.push(trend.reason.clone());
        }

        // Condition 2: price touches the support zone.
        let zone = match (snap.atr, self.pivots.last_low()) {
            (None, _) => {
                failed.push("ATR not available (need more data)".to_string());
                None
            }
            (Some(_), None) => {
                failed.push("No support zone available".to_string());
                None
            }
            (Some(atr), Some(pivot)) => {
                let zone =
                    SupportZone::around(pivot.clone(), self.cfg.zone_width_atr_mult * atr);
                if zone.touches(current.low, current.high) {
                    passed.push(format!(
                        "Price in support zone [{:.2} - {:.2}]",
                        zone.low, zone.high
                    ));
                } else {
                    failed.push(format!(
                        "Price not in support zone [{:.2} - {:.2}]",
                        zone.low, zone.high
                    ));
                }
                Some(zone)
            }
        };

        // Condition 3: bullish reversal pattern on the tail.
        match patterns::bullish_reversal(&self.bars, &self.cfg.patterns) {
            Some(pattern) => passed.push(format!("Bullish reversal: {pattern}")),
            None => failed.push("No bullish reversal pattern".to_string()),
        }

        // Condition 4: confirmation (MACD crossover or RSI above 50).
        if indicators::bullish_crossover(self.prev_macd.as_ref(), current_macd) {
            passed.push("Confirmation: MACD bullish crossover".to_string());
        } else {
            match snap.rsi {
                Some(rsi) if rsi > 50.0 => {
                    passed.push(format!("Confirmation: RSI > 50 ({rsi:.1})"));
                }
                Some(rsi) => {
                    failed.push(format!("No confirmation (MACD no cross, RSI={rsi:.1})"));
                }
                None => {
                    failed.push("No confirmation (MACD no cross, RSI=N/A)".to_string());
                }
            }
        }

        let signal = if failed.is_empty() && passed.len() == TOTAL_CONDITIONS {
            match snap.atr {
                Some(atr) => self.build_signal(current, atr, &passed),
                None => None,
            }
        } else {
            None
        };

        let display = snap.display();
        let check = SignalCheck {
            symbol: self.symbol.clone(),
            bar: current.clone(),
            conditions_passed: passed.len(),
            total_conditions: TOTAL_CONDITIONS,
            passed,
            failed,
            indicators: CheckIndicators {
                rsi: display.rsi,
                macd: display.macd_line,
                macd_signal: display.macd_signal,
                atr: display.atr,
            },
            analysis: AnalysisContext {
                pivot_lows: self.pivots.recent_lows(PIVOT_TAIL).to_vec(),
                pivot_highs: self.pivots.recent_highs(PIVOT_TAIL).to_vec(),
                higher_lows_count: trend.higher_lows,
                higher_highs_count: trend.higher_highs,
                is_uptrend: trend.is_uptrend,
                trend_reason: trend.reason,
                support_zone: zone,
                bar_low: current.low,
                bar_high: current.high,
                total_bars: self.bars_seen,
            },
            timestamp: Utc::now(),
        };

        CheckOutcome { check, signal }
    }

    /// Build the BUY signal once all four conditions have passed.
    ///
    /// The stop goes below the second-to-last pivot-low when one exists,
    /// otherwise below the firing bar's low. A stop at or above the entry
    /// violates the signal invariant and suppresses the signal.
    fn build_signal(&self, bar: &Bar, atr: f64, reasons: &[String]) -> Option<Signal> {
        let entry = bar.close;
        let buffer = self.cfg.sl_buffer_atr_mult * atr;
        let stop_loss = match self.pivots.previous_low() {
            Some(prev) => prev.price - buffer,
            None => bar.low - buffer,
        };

        if stop_loss >= entry {
            error!(
                symbol = %self.symbol,
                stop_loss,
                entry,
                "signal suppressed: stop-loss at or above entry"
            );
            return None;
        }

        let take_profit = entry + self.cfg.risk_reward_ratio * (entry - stop_loss);
        Some(Signal {
            id: None,
            symbol: self.symbol.clone(),
            signal_type: SignalType::Buy,
            timestamp: bar.timestamp,
            entry,
            stop_loss,
            take_profit,
            quantity: self.cfg.default_quantity,
            status: SignalStatus::Active,
            reason: reasons.join("\n"),
            original_sl: stop_loss,
        })
    }
}
