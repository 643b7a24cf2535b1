//! # bottrade
//!
//! Realtime trading-signal engine for Vietnamese equities.
//!
//! For every watchlist symbol the engine ingests a stream of closed OHLCV
//! bars, maintains rolling analytical state (candlestick patterns, pivots,
//! zig-zag trend, RSI / MACD / ATR), and emits discrete BUY signals with an
//! entry, stop-loss, take-profit, and a human-readable rationale. Signals
//! are persisted to SQLite, broadcast to live subscribers, and handed to an
//! out-of-band notifier.
//!
//! ## Architecture
//!
//! Data flows one way, transport to subscribers:
//!
//! - [`feed::BarAdapter`] normalizes raw transport payloads into [`models::Bar`]s,
//! - [`pipeline::PipelineSet`] runs one worker task per symbol; each worker
//!   exclusively owns its [`engine::SignalEngine`],
//! - the engine composes [`patterns`], [`pivots`], [`trend`], and
//!   [`indicators`] into the four-condition BUY rule,
//! - [`store::Store`] persists bars, signals, and settings,
//! - [`events::EventBus`] fans `bar_closed` / `signal_check` / `signal` /
//!   `system` events out to subscribers,
//! - [`backtest::Backtester`] replays historical bars through the same
//!   engines and simulates fills.
//!
//! ## Quick start
//!
//! ```
//! use bottrade::engine::{EngineConfig, SignalEngine};
//! use bottrade::models::Bar;
//! use chrono::Utc;
//!
//! let mut engine = SignalEngine::new("VNM", EngineConfig::default());
//! let bar = Bar {
//!     symbol: "VNM".into(),
//!     timeframe: "1H".into(),
//!     timestamp: Utc::now(),
//!     open: 65_000.0,
//!     high: 65_400.0,
//!     low: 64_800.0,
//!     close: 65_200.0,
//!     volume: 120_000.0,
//! };
//! let outcome = engine.add_bar(bar);
//! assert_eq!(outcome.check.total_conditions, 4);
//! assert!(outcome.signal.is_none()); // one bar is never enough
//! ```

#![warn(missing_docs)]

pub mod backtest;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod feed;
pub mod indicators;
pub mod models;
pub mod notify;
pub mod patterns;
pub mod pipeline;
pub mod pivots;
pub mod store;
pub mod trend;

pub use config::Settings;
pub use error::{BotError, Result};
pub use models::{Bar, Pivot, PivotKind, Signal, SignalStatus, SignalType, SupportZone};
