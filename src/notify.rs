//! Out-of-band signal notification.
//!
//! The production chat push (Telegram or similar) lives outside the core;
//! workers only see this trait. Implementations must be fire-and-forget:
//! a notification failure never affects signal processing.

use tracing::info;

use crate::models::Signal;

/// Receiver for newly fired signals.
pub trait Notifier: Send + Sync {
    /// Called once per emitted signal, after persistence and broadcast.
    fn notify_signal(&self, signal: &Signal);
}

/// Default notifier: writes the signal to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify_signal(&self, signal: &Signal) {
        info!(
            symbol = %signal.symbol,
            entry = signal.entry,
            stop_loss = signal.stop_loss,
            take_profit = signal.take_profit,
            quantity = signal.quantity,
            "signal notification"
        );
    }
}

/// Notifier that discards everything. Useful in tests and backfills.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify_signal(&self, _signal: &Signal) {}
}
