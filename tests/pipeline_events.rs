//! Pipeline integration: per-bar event ordering, persistence, signal
//! broadcast, and the live breakeven follower.

mod common;

use std::sync::Arc;
use std::time::Duration;

use bottrade::events::{Event, EventBus, Subscription};
use bottrade::models::SignalStatus;
use bottrade::notify::NullNotifier;
use bottrade::pipeline::PipelineSet;
use bottrade::store::Store;
use bottrade::Settings;
use common::*;

async fn next_event(sub: &mut Subscription) -> Event {
    tokio::time::timeout(Duration::from_secs(5), sub.rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event bus closed")
}

fn harness() -> (Arc<PipelineSet>, EventBus, Arc<Store>) {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let bus = EventBus::new();
    let pipelines = Arc::new(PipelineSet::new(
        Arc::clone(&store),
        bus.clone(),
        Arc::new(NullNotifier),
        &Settings::default(),
    ));
    (pipelines, bus, store)
}

#[tokio::test]
async fn events_per_bar_arrive_in_order_and_signal_fires() {
    let (pipelines, bus, store) = harness();
    let mut sub = bus.subscribe();

    // Replayed state comes first.
    match next_event(&mut sub).await {
        Event::System(status) => assert_eq!(status.status, "started"),
        other => panic!("expected system replay, got {other:?}"),
    }

    pipelines.add_symbol("VNM");
    let bars = buy_ladder();
    for bar in &bars {
        pipelines.ingest(bar.clone());
    }

    let mut broadcast_signal = None;
    for (i, expected) in bars.iter().enumerate() {
        match next_event(&mut sub).await {
            Event::BarClosed(bar) => assert_eq!(&bar, expected, "bar_closed order at {i}"),
            other => panic!("expected bar_closed for bar {i}, got {other:?}"),
        }
        match next_event(&mut sub).await {
            Event::SignalCheck(check) => {
                assert_eq!(&check.bar, expected, "signal_check order at {i}");
                assert_eq!(check.analysis.total_bars, i + 1);
            }
            other => panic!("expected signal_check for bar {i}, got {other:?}"),
        }
        // The setup completes on the last bar: its signal is emitted after
        // the bar's check and before anything else.
        if i == bars.len() - 1 {
            match next_event(&mut sub).await {
                Event::Signal(signal) => broadcast_signal = Some(signal),
                other => panic!("expected signal event, got {other:?}"),
            }
        }
    }

    let signal = broadcast_signal.expect("signal was broadcast");
    assert_eq!(signal.symbol, "VNM");
    assert_eq!(signal.entry, LADDER_ENTRY);
    assert_eq!(signal.status, SignalStatus::Active);

    // The broadcast carries the store-assigned id and matches the row.
    let id = signal.id.expect("signal persisted before broadcast");
    let stored = store.get_signal(id).unwrap().expect("signal row exists");
    assert_eq!(stored, signal);

    // Bars were persisted too.
    assert_eq!(store.get_bars("VNM", "1H", 100).unwrap().len(), bars.len());
}

#[tokio::test]
async fn breakeven_follower_updates_the_stored_signal() {
    let (pipelines, bus, store) = harness();
    pipelines.add_symbol("VNM");

    for b in buy_ladder() {
        pipelines.ingest(b);
    }
    // Wait until the ladder is fully processed.
    let check = pipelines.snapshot("VNM").await.expect("snapshot");
    assert_eq!(check.analysis.total_bars, 15);

    let signals = store
        .get_signals(&Default::default())
        .unwrap();
    assert_eq!(signals.len(), 1);
    let signal = &signals[0];
    let breakeven_price = signal.breakeven_price();

    // Subscribe late: the cached latest check is replayed, not bar history.
    let mut sub = bus.subscribe();
    match next_event(&mut sub).await {
        Event::System(_) => {}
        other => panic!("expected system replay, got {other:?}"),
    }
    match next_event(&mut sub).await {
        Event::SignalCheck(check) => assert_eq!(check.symbol, "VNM"),
        other => panic!("expected cached signal_check replay, got {other:?}"),
    }

    // A bar whose high reaches 1R moves the stop to the entry, once.
    let trigger = bar(15, 115.0, breakeven_price + 0.5, 113.0, 120.0);
    pipelines.ingest(trigger);
    pipelines.snapshot("VNM").await.expect("snapshot");

    let updated = store.get_signal(signal.id.unwrap()).unwrap().unwrap();
    assert_eq!(updated.status, SignalStatus::Breakeven);
    assert_eq!(updated.stop_loss, updated.entry);
    assert_eq!(updated.original_sl, signal.original_sl);
}

#[tokio::test]
async fn removed_symbol_stops_producing_events() {
    let (pipelines, bus, store) = harness();
    let mut sub = bus.subscribe();
    match next_event(&mut sub).await {
        Event::System(_) => {}
        other => panic!("expected system replay, got {other:?}"),
    }

    pipelines.add_symbol("VNM");
    pipelines.ingest(filler(0, 100.0));
    match next_event(&mut sub).await {
        Event::BarClosed(b) => assert_eq!(b.symbol, "VNM"),
        other => panic!("expected bar_closed, got {other:?}"),
    }
    match next_event(&mut sub).await {
        Event::SignalCheck(_) => {}
        other => panic!("expected signal_check, got {other:?}"),
    }

    pipelines.remove_symbol("VNM");
    pipelines.ingest(filler(1, 101.0));

    // No worker, no events, no row.
    let quiet = tokio::time::timeout(Duration::from_millis(200), sub.rx.recv()).await;
    assert!(quiet.is_err(), "no events expected after removal");
    assert_eq!(store.get_bars("VNM", "1H", 10).unwrap().len(), 1);
}
