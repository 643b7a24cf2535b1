//! Trading signal model and lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Signal direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalType {
    /// Long entry.
    Buy,
    /// Short entry (not produced by the current rule set).
    Sell,
}

impl SignalType {
    /// Stable string form used by the store.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }

    /// Parse the store's string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "BUY" => Some(Self::Buy),
            "SELL" => Some(Self::Sell),
            _ => None,
        }
    }
}

/// Signal lifecycle status.
///
/// `Breakeven` means the stop has been moved to the entry price; the signal
/// is still live and only a stop or target hit terminates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalStatus {
    /// Live, stop at its original level.
    Active,
    /// Closed at the take-profit.
    TpHit,
    /// Closed at the stop-loss.
    SlHit,
    /// Live, stop moved to the entry price.
    Breakeven,
    /// Manually or administratively cancelled.
    Cancelled,
}

impl SignalStatus {
    /// Stable string form used by the store.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::TpHit => "TP_HIT",
            Self::SlHit => "SL_HIT",
            Self::Breakeven => "BREAKEVEN",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Parse the store's string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(Self::Active),
            "TP_HIT" => Some(Self::TpHit),
            "SL_HIT" => Some(Self::SlHit),
            "BREAKEVEN" => Some(Self::Breakeven),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// A discrete trading signal with entry, stop, target, and rationale.
///
/// Created by the signal engine with `stop_loss < entry < take_profit` and
/// `original_sl == stop_loss`; persisted once with a store-assigned id.
/// After creation only exit logic mutates it, and the only permitted price
/// mutation is moving the stop to the entry (breakeven), exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Store-assigned id; `None` until persisted.
    pub id: Option<i64>,
    /// Stock symbol.
    pub symbol: String,
    /// Direction.
    pub signal_type: SignalType,
    /// Timestamp of the bar that fired the signal.
    pub timestamp: DateTime<Utc>,
    /// Entry price (the firing bar's close).
    pub entry: f64,
    /// Current stop-loss.
    pub stop_loss: f64,
    /// Take-profit target.
    pub take_profit: f64,
    /// Share quantity.
    pub quantity: i64,
    /// Lifecycle status.
    pub status: SignalStatus,
    /// Human-readable rationale (the passed condition reasons).
    pub reason: String,
    /// The stop-loss the signal was created with.
    pub original_sl: f64,
}

impl Signal {
    /// Risk per unit, `|entry - stop_loss|`.
    pub fn risk(&self) -> f64 {
        (self.entry - self.stop_loss).abs()
    }

    /// Potential reward per unit, `|take_profit - entry|`.
    pub fn reward(&self) -> f64 {
        (self.take_profit - self.entry).abs()
    }

    /// Reward / risk ratio; zero when risk is zero.
    pub fn risk_reward(&self) -> f64 {
        let risk = self.risk();
        if risk == 0.0 { 0.0 } else { self.reward() / risk }
    }

    /// Price at which the stop moves to breakeven (1R in profit).
    pub fn breakeven_price(&self) -> f64 {
        self.entry + self.risk()
    }

    /// Whether a bar reaching `high` triggers the breakeven move.
    ///
    /// Only `Active` signals whose stop is still below the entry qualify, so
    /// the transition can fire at most once.
    pub fn should_move_to_breakeven(&self, high: f64) -> bool {
        self.status == SignalStatus::Active
            && self.stop_loss < self.entry
            && high >= self.breakeven_price()
    }

    /// Move the stop to the entry price and mark the signal `Breakeven`.
    pub fn move_to_breakeven(&mut self) {
        self.stop_loss = self.entry;
        self.status = SignalStatus::Breakeven;
    }
}
