//! Per-symbol processing pipelines.
//!
//! Each watchlist symbol gets one worker task that exclusively owns its
//! [`SignalEngine`]. Nothing else reads or mutates that state: bars go in
//! through a bounded inbox, and read-only snapshots come out by asking the
//! worker over the same inbox. This gives single-writer semantics per
//! symbol without locks; workers for different symbols run concurrently.
//!
//! Per bar, in order: validate, persist (failure logged, processing
//! continues), publish `bar_closed`, run the engine, publish
//! `signal_check`, and on a fire persist + publish `signal` and notify.
//! All events for a bar are published before the next bar is dequeued.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::engine::{EngineConfig, SignalCheck, SignalEngine, HISTORY_CAP};
use crate::events::{Event, EventBus};
use crate::models::{Bar, Signal};
use crate::notify::Notifier;
use crate::store::Store;

/// Bounded inbox depth per symbol. When the inbox is saturated the
/// incoming bar is dropped with a warning (newest-drop policy).
pub const INBOX_CAPACITY: usize = 256;

/// Messages a worker consumes from its inbox.
enum WorkerMsg {
    /// A closed bar to process.
    Bar(Bar),
    /// Request for the latest analysis snapshot.
    Snapshot(oneshot::Sender<Option<SignalCheck>>),
}

struct WorkerHandle {
    tx: mpsc::Sender<WorkerMsg>,
    task: JoinHandle<()>,
}

/// The set of running per-symbol pipelines.
pub struct PipelineSet {
    store: Arc<Store>,
    bus: EventBus,
    notifier: Arc<dyn Notifier>,
    engine_cfg: EngineConfig,
    timeframe: String,
    workers: Mutex<HashMap<String, WorkerHandle>>,
}

impl PipelineSet {
    /// New pipeline set; no workers run until symbols are added.
    pub fn new(
        store: Arc<Store>,
        bus: EventBus,
        notifier: Arc<dyn Notifier>,
        settings: &Settings,
    ) -> Self {
        Self {
            store,
            bus,
            notifier,
            engine_cfg: settings.engine.clone(),
            timeframe: settings.timeframe.clone(),
            workers: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, WorkerHandle>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Symbols with a running worker, sorted.
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.lock().keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// Spawn a worker for `symbol` (no-op when one is already running).
    /// The engine is seeded with up to [`HISTORY_CAP`] stored bars.
    pub fn add_symbol(&self, symbol: &str) {
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return;
        }
        {
            let workers = self.lock();
            if workers.contains_key(&symbol) {
                return;
            }
        }

        let mut engine = SignalEngine::new(symbol.clone(), self.engine_cfg.clone());
        match self.store.get_bars(&symbol, &self.timeframe, HISTORY_CAP) {
            Ok(history) if !history.is_empty() => {
                engine.seed(&history);
                info!(symbol = %symbol, bars = history.len(), "seeded engine from store");
            }
            Ok(_) => {}
            Err(e) => warn!(symbol = %symbol, error = %e, "history seed failed, starting cold"),
        }

        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        let task = tokio::spawn(run_worker(
            engine,
            rx,
            Arc::clone(&self.store),
            self.bus.clone(),
            Arc::clone(&self.notifier),
        ));

        let mut workers = self.lock();
        if workers.contains_key(&symbol) {
            // Lost a race against a concurrent add for the same symbol.
            task.abort();
            return;
        }
        workers.insert(symbol.clone(), WorkerHandle { tx, task });
        drop(workers);
        info!(symbol = %symbol, "pipeline worker started");
    }

    /// Stop the worker for `symbol` and release its state. Queued bars for
    /// the symbol are discarded.
    pub fn remove_symbol(&self, symbol: &str) {
        let symbol = symbol.trim().to_uppercase();
        if let Some(handle) = self.lock().remove(&symbol) {
            handle.task.abort();
            info!(symbol = %symbol, "pipeline worker stopped");
        }
    }

    /// Reconcile the running workers with `symbols`: spawn the missing
    /// ones, stop the removed ones.
    pub fn set_watchlist(&self, symbols: &[String]) {
        let wanted: Vec<String> = symbols
            .iter()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();

        let current = self.symbols();
        for symbol in current.iter().filter(|s| !wanted.contains(s)) {
            self.remove_symbol(symbol);
        }
        for symbol in wanted.iter().filter(|s| !current.contains(s)) {
            self.add_symbol(symbol);
        }
    }

    /// Route a closed bar to its symbol's worker.
    ///
    /// Bars for symbols without a worker are ignored; a saturated inbox
    /// drops the bar with a warning rather than blocking the transport.
    pub fn ingest(&self, bar: Bar) {
        let tx = match self.lock().get(&bar.symbol) {
            Some(handle) => handle.tx.clone(),
            None => {
                debug!(symbol = %bar.symbol, "bar for unwatched symbol ignored");
                return;
            }
        };
        let symbol = bar.symbol.clone();
        if let Err(e) = tx.try_send(WorkerMsg::Bar(bar)) {
            warn!(symbol = %symbol, error = %e, "inbox saturated, bar dropped");
        }
    }

    /// Ask a worker for its latest analysis snapshot.
    ///
    /// `None` when the symbol has no worker or the worker has not yet
    /// processed a bar.
    pub async fn snapshot(&self, symbol: &str) -> Option<SignalCheck> {
        let symbol = symbol.trim().to_uppercase();
        let tx = {
            let workers = self.lock();
            workers.get(&symbol)?.tx.clone()
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(WorkerMsg::Snapshot(reply_tx)).await.ok()?;
        reply_rx.await.ok().flatten()
    }

    /// Stop every worker.
    pub fn shutdown(&self) {
        let mut workers = self.lock();
        for (symbol, handle) in workers.drain() {
            handle.task.abort();
            debug!(symbol = %symbol, "pipeline worker stopped");
        }
    }
}

impl Drop for PipelineSet {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Worker loop: consumes the inbox in order, one bar fully processed
/// (persisted, analyzed, broadcast) before the next is dequeued.
async fn run_worker(
    mut engine: SignalEngine,
    mut rx: mpsc::Receiver<WorkerMsg>,
    store: Arc<Store>,
    bus: EventBus,
    notifier: Arc<dyn Notifier>,
) {
    // Signals emitted this session, tracked for the breakeven follower.
    let mut session_signals: Vec<Signal> = Vec::new();
    let mut latest_check: Option<SignalCheck> = None;

    while let Some(msg) = rx.recv().await {
        match msg {
            WorkerMsg::Snapshot(reply) => {
                let _ = reply.send(latest_check.clone());
            }
            WorkerMsg::Bar(bar) => {
                if !bar.is_well_formed() {
                    error!(
                        symbol = %bar.symbol,
                        open = bar.open,
                        high = bar.high,
                        low = bar.low,
                        close = bar.close,
                        "malformed bar dropped"
                    );
                    continue;
                }

                // Persistence and delivery are independent: a store failure
                // is logged and the events still fire.
                if let Err(e) = store.save_bar(&bar) {
                    error!(symbol = %bar.symbol, error = %e, "bar persist failed");
                }
                bus.publish(Event::BarClosed(bar.clone()));

                apply_breakeven(&mut session_signals, &bar, &store);

                let outcome = engine.add_bar(bar);
                latest_check = Some(outcome.check.clone());
                bus.publish(Event::SignalCheck(outcome.check));

                if let Some(mut signal) = outcome.signal {
                    match store.save_signal(&signal) {
                        Ok(id) => signal.id = Some(id),
                        Err(e) => {
                            error!(symbol = %signal.symbol, error = %e, "signal persist failed")
                        }
                    }
                    info!(
                        symbol = %signal.symbol,
                        entry = signal.entry,
                        stop_loss = signal.stop_loss,
                        take_profit = signal.take_profit,
                        "BUY signal fired"
                    );
                    bus.publish(Event::Signal(signal.clone()));
                    notifier.notify_signal(&signal);
                    session_signals.push(signal);
                }
            }
        }
    }
}

/// Move stops to breakeven on session signals whose 1R price was reached.
/// Each transition happens at most once and is persisted immediately.
fn apply_breakeven(signals: &mut [Signal], bar: &Bar, store: &Store) {
    for signal in signals.iter_mut() {
        if signal.should_move_to_breakeven(bar.high) {
            signal.move_to_breakeven();
            info!(
                symbol = %signal.symbol,
                entry = signal.entry,
                "stop moved to breakeven"
            );
            if let Err(e) = store.update_signal(signal) {
                error!(symbol = %signal.symbol, error = %e, "breakeven persist failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NullNotifier;
    use chrono::{Duration, TimeZone, Utc};

    fn settings() -> Settings {
        Settings::default()
    }

    fn bar(i: usize, base: f64) -> Bar {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 2, 0, 0).unwrap();
        Bar {
            symbol: "VNM".to_string(),
            timeframe: "1H".to_string(),
            timestamp: start + Duration::hours(i as i64),
            open: base,
            high: base + 1.3,
            low: base - 0.3,
            close: base + 1.0,
            volume: 1000.0,
        }
    }

    fn pipeline_set() -> (Arc<PipelineSet>, EventBus, Arc<Store>) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let bus = EventBus::new();
        let set = PipelineSet::new(
            Arc::clone(&store),
            bus.clone(),
            Arc::new(NullNotifier),
            &settings(),
        );
        (Arc::new(set), bus, store)
    }

    #[tokio::test]
    async fn test_add_remove_symbols() {
        let (set, _bus, _store) = pipeline_set();
        set.add_symbol("vnm");
        set.add_symbol("FPT");
        set.add_symbol("VNM"); // duplicate is a no-op
        assert_eq!(set.symbols(), vec!["FPT".to_string(), "VNM".to_string()]);

        set.remove_symbol("FPT");
        assert_eq!(set.symbols(), vec!["VNM".to_string()]);
    }

    #[tokio::test]
    async fn test_set_watchlist_diffs() {
        let (set, _bus, _store) = pipeline_set();
        set.set_watchlist(&["VNM".to_string(), "FPT".to_string()]);
        assert_eq!(set.symbols(), vec!["FPT".to_string(), "VNM".to_string()]);

        set.set_watchlist(&["FPT".to_string(), "VIC".to_string()]);
        assert_eq!(set.symbols(), vec!["FPT".to_string(), "VIC".to_string()]);
    }

    #[tokio::test]
    async fn test_bar_is_persisted_and_snapshot_served() {
        let (set, _bus, store) = pipeline_set();
        set.add_symbol("VNM");

        set.ingest(bar(0, 100.0));
        set.ingest(bar(1, 101.0));

        // The snapshot request queues behind the bars, so the reply
        // reflects both having been processed.
        let check = set.snapshot("VNM").await.unwrap();
        assert_eq!(check.analysis.total_bars, 2);
        assert_eq!(store.get_bars("VNM", "1H", 10).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_snapshot_unknown_symbol() {
        let (set, _bus, _store) = pipeline_set();
        assert!(set.snapshot("HPG").await.is_none());
    }

    #[tokio::test]
    async fn test_malformed_bar_is_dropped() {
        let (set, _bus, store) = pipeline_set();
        set.add_symbol("VNM");

        let mut bad = bar(0, 100.0);
        bad.low = bad.high + 1.0;
        set.ingest(bad);
        set.ingest(bar(1, 101.0));

        let check = set.snapshot("VNM").await.unwrap();
        assert_eq!(check.analysis.total_bars, 1);
        assert_eq!(store.get_bars("VNM", "1H", 10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_worker_seeds_from_store() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let bars: Vec<Bar> = (0..20).map(|i| bar(i, 100.0 + i as f64)).collect();
        store.save_bars(&bars).unwrap();

        let bus = EventBus::new();
        let set = PipelineSet::new(
            Arc::clone(&store),
            bus.clone(),
            Arc::new(NullNotifier),
            &settings(),
        );
        set.add_symbol("VNM");

        set.ingest(bar(20, 120.0));
        let check = set.snapshot("VNM").await.unwrap();
        assert_eq!(check.analysis.total_bars, 21);
    }

    #[tokio::test]
    async fn test_ingest_for_unwatched_symbol_is_ignored() {
        let (set, _bus, store) = pipeline_set();
        set.add_symbol("FPT");
        set.ingest(bar(0, 100.0)); // bar is for VNM
        assert!(store.get_bars("VNM", "1H", 10).unwrap().is_empty());
    }
}
