//! Event bus: fan-out of bar, analysis, signal, and system events.
//!
//! Each subscriber owns a bounded channel. `publish` never blocks the
//! producing worker: deliveries use `try_send`, and a subscriber whose
//! channel is full or closed is deregistered on the spot (drop the
//! subscriber, never the event stream for everyone else).
//!
//! The bus caches the latest signal-check per symbol and the current
//! system status; new subscribers get both replayed before live events.
//! Bar history is never replayed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::engine::SignalCheck;
use crate::models::{Bar, Signal};

/// Per-subscriber queue depth. Large enough to absorb a full
/// signal-check replay plus bursts of live events.
pub const SUBSCRIBER_CAPACITY: usize = 256;

/// Connectivity and status payload for `system` events.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemStatus {
    /// Free-form status label ("started", "connected", ...).
    pub status: String,
    /// Whether the market-data transport is connected.
    pub dnse_connected: bool,
    /// When the status last changed.
    pub timestamp: DateTime<Utc>,
}

/// An outbound event. Serializes to the wire envelope
/// `{ "event": "<kind>", "data": <payload> }`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum Event {
    /// Connectivity / status change.
    System(SystemStatus),
    /// A closed bar entered the pipeline.
    BarClosed(Bar),
    /// Per-bar analysis snapshot.
    SignalCheck(SignalCheck),
    /// A new trading signal fired.
    Signal(Signal),
}

/// A live subscription handle. Dropping it deregisters the subscriber.
pub struct Subscription {
    id: u64,
    /// Event receiver: replayed state first, then live events.
    pub rx: mpsc::Receiver<Event>,
    bus: EventBus,
}

impl Subscription {
    /// The bus-assigned subscriber id.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.deregister(self.id);
    }
}

struct BusInner {
    next_id: u64,
    subscribers: HashMap<u64, mpsc::Sender<Event>>,
    latest_checks: HashMap<String, SignalCheck>,
    system: SystemStatus,
}

/// Shared fan-out bus. Cheap to clone.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// New bus with a "started", disconnected system status.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusInner {
                next_id: 0,
                subscribers: HashMap::new(),
                latest_checks: HashMap::new(),
                system: SystemStatus {
                    status: "started".to_string(),
                    dnse_connected: false,
                    timestamp: Utc::now(),
                },
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BusInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a subscriber. The current system status and the cached
    /// latest signal-check of every symbol are queued before any live
    /// event; bar history is not replayed.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);

        let id = {
            let mut inner = self.lock();
            let id = inner.next_id;
            inner.next_id += 1;

            let _ = tx.try_send(Event::System(inner.system.clone()));
            for check in inner.latest_checks.values() {
                let _ = tx.try_send(Event::SignalCheck(check.clone()));
            }

            inner.subscribers.insert(id, tx);
            id
        };

        debug!(subscriber = id, "event bus subscriber registered");
        Subscription {
            id,
            rx,
            bus: self.clone(),
        }
    }

    /// Update the system status and broadcast it.
    pub fn set_system_status(&self, status: &str, connected: bool) {
        let payload = SystemStatus {
            status: status.to_string(),
            dnse_connected: connected,
            timestamp: Utc::now(),
        };
        {
            let mut inner = self.lock();
            inner.system = payload.clone();
        }
        self.publish(Event::System(payload));
    }

    /// Deliver an event to every subscriber. Failed deliveries (full or
    /// closed channels) deregister that subscriber only.
    pub fn publish(&self, event: Event) {
        let targets: Vec<(u64, mpsc::Sender<Event>)> = {
            let mut inner = self.lock();
            if let Event::SignalCheck(check) = &event {
                inner
                    .latest_checks
                    .insert(check.symbol.clone(), check.clone());
            }
            inner
                .subscribers
                .iter()
                .map(|(id, tx)| (*id, tx.clone()))
                .collect()
        };

        // Deliveries happen outside the lock; a slow subscriber can at
        // worst lose itself, not stall the producer.
        let mut dead = Vec::new();
        for (id, tx) in targets {
            if tx.try_send(event.clone()).is_err() {
                dead.push(id);
            }
        }

        if !dead.is_empty() {
            let mut inner = self.lock();
            for id in dead {
                inner.subscribers.remove(&id);
                warn!(subscriber = id, "subscriber dropped (slow or disconnected)");
            }
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Current system status (as replayed to new subscribers).
    pub fn system_status(&self) -> SystemStatus {
        self.lock().system.clone()
    }

    fn deregister(&self, id: u64) {
        self.lock().subscribers.remove(&id);
    }
}
