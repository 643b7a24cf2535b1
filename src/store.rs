//! SQLite persistence for bars, signals, and settings.
//!
//! The connection sits behind a mutex: every read and write is serialized
//! through it, which is the single-writer discipline the shared store
//! requires. Bar upserts are idempotent on `(symbol, timeframe,
//! timestamp)`; signal inserts are append-only with a store-assigned id;
//! settings are last-writer-wins.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, Row};

use crate::error::{BotError, Result};
use crate::models::{Bar, Signal, SignalStatus, SignalType};

/// Filter for [`Store::get_signals`].
#[derive(Debug, Clone, Default)]
pub struct SignalFilter {
    /// Restrict to one symbol.
    pub symbol: Option<String>,
    /// Restrict to one status.
    pub status: Option<SignalStatus>,
    /// Maximum rows returned (0 means the default of 50).
    pub limit: usize,
}

impl SignalFilter {
    fn effective_limit(&self) -> usize {
        if self.limit == 0 { 50 } else { self.limit }
    }
}

/// SQLite-backed store.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database at `path` and ensure the schema.
    ///
    /// This is the only fatal failure point of the core: callers abort
    /// startup when it errs.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store, used by tests and throwaway tooling.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Bars ──────────────────────────────────────────────────────────────

    /// Insert or replace a bar; the `(symbol, timeframe, timestamp)` key
    /// makes re-arrivals idempotent.
    pub fn save_bar(&self, bar: &Bar) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR REPLACE INTO bars
                (symbol, timeframe, timestamp, open, high, low, close, volume)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                bar.symbol,
                bar.timeframe,
                encode_ts(bar.timestamp),
                bar.open,
                bar.high,
                bar.low,
                bar.close,
                bar.volume
            ],
        )?;
        Ok(())
    }

    /// Bulk bar upsert in a single transaction.
    pub fn save_bars(&self, bars: &[Bar]) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO bars
                    (symbol, timeframe, timestamp, open, high, low, close, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for bar in bars {
                stmt.execute(params![
                    bar.symbol,
                    bar.timeframe,
                    encode_ts(bar.timestamp),
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// The last `limit` bars for a symbol/timeframe, oldest first.
    pub fn get_bars(&self, symbol: &str, timeframe: &str, limit: usize) -> Result<Vec<Bar>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT symbol, timeframe, timestamp, open, high, low, close, volume
             FROM bars
             WHERE symbol = ?1 AND timeframe = ?2
             ORDER BY timestamp DESC
             LIMIT ?3",
        )?;
        let mut bars = stmt
            .query_map(params![symbol, timeframe, limit as i64], bar_from_row)?
            .collect::<rusqlite::Result<Vec<Bar>>>()?;
        bars.reverse();
        Ok(bars)
    }

    // ── Signals ───────────────────────────────────────────────────────────

    /// Append a signal and return the store-assigned id.
    pub fn save_signal(&self, signal: &Signal) -> Result<i64> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO signals
                (symbol, signal_type, timestamp, entry, stop_loss, take_profit,
                 quantity, status, reason, original_sl)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                signal.symbol,
                signal.signal_type.as_str(),
                encode_ts(signal.timestamp),
                signal.entry,
                signal.stop_loss,
                signal.take_profit,
                signal.quantity,
                signal.status.as_str(),
                signal.reason,
                signal.original_sl
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Update a persisted signal's status and stop-loss (the only fields
    /// exit logic may mutate).
    pub fn update_signal(&self, signal: &Signal) -> Result<()> {
        let id = signal
            .id
            .ok_or_else(|| BotError::CorruptRow("cannot update unsaved signal".to_string()))?;
        let conn = self.lock();
        conn.execute(
            "UPDATE signals SET status = ?1, stop_loss = ?2 WHERE id = ?3",
            params![signal.status.as_str(), signal.stop_loss, id],
        )?;
        Ok(())
    }

    /// Signals matching `filter`, most recent first.
    pub fn get_signals(&self, filter: &SignalFilter) -> Result<Vec<Signal>> {
        let conn = self.lock();
        let mut sql = String::from(
            "SELECT id, symbol, signal_type, timestamp, entry, stop_loss, take_profit,
                    quantity, status, reason, original_sl
             FROM signals WHERE 1=1",
        );
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(symbol) = &filter.symbol {
            sql.push_str(" AND symbol = ?");
            args.push(Box::new(symbol.clone()));
        }
        if let Some(status) = filter.status {
            sql.push_str(" AND status = ?");
            args.push(Box::new(status.as_str().to_string()));
        }
        sql.push_str(" ORDER BY timestamp DESC, id DESC LIMIT ?");
        args.push(Box::new(filter.effective_limit() as i64));

        let mut stmt = conn.prepare(&sql)?;
        let params_ref: Vec<&dyn rusqlite::ToSql> = args.iter().map(|a| a.as_ref()).collect();
        let signals = stmt
            .query_map(params_ref.as_slice(), signal_from_row)?
            .collect::<rusqlite::Result<Vec<Signal>>>()?;
        Ok(signals)
    }

    /// Fetch one signal by id.
    pub fn get_signal(&self, id: i64) -> Result<Option<Signal>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, symbol, signal_type, timestamp, entry, stop_loss, take_profit,
                    quantity, status, reason, original_sl
             FROM signals WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![id], signal_from_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    // ── Settings ──────────────────────────────────────────────────────────

    /// Upsert a setting (last writer wins).
    pub fn save_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR REPLACE INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![key, value, encode_ts(Utc::now())],
        )?;
        Ok(())
    }

    /// Read a setting, `None` when unset.
    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT value FROM settings WHERE key = ?1")?;
        let mut rows = stmt.query_map(params![key], |row| row.get::<_, String>(0))?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// All settings as a map.
    pub fn all_settings(&self) -> Result<HashMap<String, String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT key, value FROM settings")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut map = HashMap::new();
        for row in rows {
            let (key, value) = row?;
            map.insert(key, value);
        }
        Ok(map)
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "BEGIN;
        CREATE TABLE IF NOT EXISTS bars (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            symbol TEXT NOT NULL,
            timeframe TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            open REAL NOT NULL,
            high REAL NOT NULL,
            low REAL NOT NULL,
            close REAL NOT NULL,
            volume REAL DEFAULT 0,
            UNIQUE(symbol, timeframe, timestamp)
        );
        CREATE INDEX IF NOT EXISTS idx_bars_symbol_time
            ON bars(symbol, timeframe, timestamp);

        CREATE TABLE IF NOT EXISTS signals (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            symbol TEXT NOT NULL,
            signal_type TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            entry REAL NOT NULL,
            stop_loss REAL NOT NULL,
            take_profit REAL NOT NULL,
            quantity INTEGER DEFAULT 1,
            status TEXT DEFAULT 'ACTIVE',
            reason TEXT,
            original_sl REAL
        );
        CREATE INDEX IF NOT EXISTS idx_signals_symbol ON signals(symbol);
        CREATE INDEX IF NOT EXISTS idx_signals_status ON signals(status);

        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT
        );
        COMMIT;",
    )?;
    Ok(())
}

/// RFC-3339 with whole seconds and a `Z` suffix: constant width, so
/// lexicographic ordering in SQL equals chronological ordering.
fn encode_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn decode_ts(raw: &str, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                column,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

fn bar_from_row(row: &Row<'_>) -> rusqlite::Result<Bar> {
    let ts: String = row.get(2)?;
    Ok(Bar {
        symbol: row.get(0)?,
        timeframe: row.get(1)?,
        timestamp: decode_ts(&ts, 2)?,
        open: row.get(3)?,
        high: row.get(4)?,
        low: row.get(5)?,
        close: row.get(6)?,
        volume: row.get(7)?,
    })
}

fn signal_from_row(row: &Row<'_>) -> rusqlite::Result<Signal> {
    let ts: String = row.get(3)?;
    let type_raw: String = row.get(2)?;
    let status_raw: String = row.get(8)?;
    let stop_loss: f64 = row.get(5)?;

    let signal_type = SignalType::parse(&type_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown signal type: {type_raw}").into(),
        )
    })?;
    let status = SignalStatus::parse(&status_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            8,
            rusqlite::types::Type::Text,
            format!("unknown signal status: {status_raw}").into(),
        )
    })?;

    Ok(Signal {
        id: Some(row.get(0)?),
        symbol: row.get(1)?,
        signal_type,
        timestamp: decode_ts(&ts, 3)?,
        entry: row.get(4)?,
        stop_loss,
        take_profit: row.get(6)?,
        quantity: row.get(7)?,
        status,
        reason: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
        original_sl: row.get::<_, Option<f64>>(10)?.unwrap_or(stop_loss),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn bar(i: usize, close: f64) -> Bar {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 2, 0, 0).unwrap();
        Bar {
            symbol: "VNM".to_string(),
            timeframe: "1H".to_string(),
            timestamp: start + Duration::hours(i as i64),
            open: close - 0.5,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1000.0,
        }
    }

    fn signal(entry: f64) -> Signal {
        Signal {
            id: None,
            symbol: "VNM".to_string(),
            signal_type: SignalType::Buy,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 2, 0, 0).unwrap(),
            entry,
            stop_loss: entry - 5.0,
            take_profit: entry + 10.0,
            quantity: 100,
            status: SignalStatus::Active,
            reason: "test".to_string(),
            original_sl: entry - 5.0,
        }
    }

    #[test]
    fn test_save_bar_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        let mut b = bar(0, 100.0);

        store.save_bar(&b).unwrap();
        b.close = 101.0; // same key, new content
        store.save_bar(&b).unwrap();

        let bars = store.get_bars("VNM", "1H", 10).unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].close, 101.0);
    }

    #[test]
    fn test_get_bars_chronological_regardless_of_insert_order() {
        let store = Store::open_in_memory().unwrap();
        let bars: Vec<Bar> = (0..6).map(|i| bar(i, 100.0 + i as f64)).collect();

        // Insert in a scrambled order.
        for &i in &[3usize, 0, 5, 1, 4, 2] {
            store.save_bar(&bars[i]).unwrap();
        }

        let fetched = store.get_bars("VNM", "1H", 4).unwrap();
        assert_eq!(fetched.len(), 4);
        // Last 4 entries of the chronological series.
        assert_eq!(fetched, bars[2..].to_vec());
    }

    #[test]
    fn test_save_bars_bulk_round_trip() {
        let store = Store::open_in_memory().unwrap();
        let bars: Vec<Bar> = (0..5).map(|i| bar(i, 100.0 + i as f64)).collect();
        store.save_bars(&bars).unwrap();
        assert_eq!(store.get_bars("VNM", "1H", 100).unwrap(), bars);
    }

    #[test]
    fn test_bars_partitioned_by_timeframe() {
        let store = Store::open_in_memory().unwrap();
        let mut hourly = bar(0, 100.0);
        let mut daily = bar(0, 200.0);
        daily.timeframe = "1D".to_string();
        store.save_bar(&hourly).unwrap();
        store.save_bar(&daily).unwrap();

        assert_eq!(store.get_bars("VNM", "1H", 10).unwrap().len(), 1);
        assert_eq!(store.get_bars("VNM", "1D", 10).unwrap()[0].close, 200.0);

        // Distinct timeframes never collide even at the same timestamp.
        hourly.close = 111.0;
        daily.close = 222.0;
        store.save_bar(&hourly).unwrap();
        store.save_bar(&daily).unwrap();
        assert_eq!(store.get_bars("VNM", "1H", 10).unwrap()[0].close, 111.0);
        assert_eq!(store.get_bars("VNM", "1D", 10).unwrap()[0].close, 222.0);
    }

    #[test]
    fn test_signal_ids_are_monotonic() {
        let store = Store::open_in_memory().unwrap();
        let a = store.save_signal(&signal(100.0)).unwrap();
        let b = store.save_signal(&signal(101.0)).unwrap();
        let c = store.save_signal(&signal(102.0)).unwrap();
        assert!(a < b && b < c);
    }

    #[test]
    fn test_signal_round_trip_and_update() {
        let store = Store::open_in_memory().unwrap();
        let mut s = signal(100.0);
        let id = store.save_signal(&s).unwrap();
        s.id = Some(id);

        let fetched = store.get_signal(id).unwrap().unwrap();
        assert_eq!(fetched, s);

        // Exit logic mutates status + stop_loss only.
        s.move_to_breakeven();
        store.update_signal(&s).unwrap();
        let fetched = store.get_signal(id).unwrap().unwrap();
        assert_eq!(fetched.status, SignalStatus::Breakeven);
        assert_eq!(fetched.stop_loss, 100.0);
        assert_eq!(fetched.original_sl, 95.0);
        assert_eq!(fetched.entry, 100.0);
    }

    #[test]
    fn test_get_signal_missing() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.get_signal(42).unwrap().is_none());
    }

    #[test]
    fn test_get_signals_filters() {
        let store = Store::open_in_memory().unwrap();
        let mut fpt = signal(100.0);
        fpt.symbol = "FPT".to_string();
        store.save_signal(&fpt).unwrap();
        store.save_signal(&signal(101.0)).unwrap();
        store.save_signal(&signal(102.0)).unwrap();

        let all = store.get_signals(&SignalFilter::default()).unwrap();
        assert_eq!(all.len(), 3);

        let vnm = store
            .get_signals(&SignalFilter {
                symbol: Some("VNM".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(vnm.len(), 2);
        assert!(vnm.iter().all(|s| s.symbol == "VNM"));

        let limited = store
            .get_signals(&SignalFilter {
                limit: 1,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(limited.len(), 1);

        let active = store
            .get_signals(&SignalFilter {
                status: Some(SignalStatus::Breakeven),
                ..Default::default()
            })
            .unwrap();
        assert!(active.is_empty());
    }

    #[test]
    fn test_settings_last_writer_wins() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.get_setting("watchlist").unwrap(), None);

        store.save_setting("watchlist", "[\"VNM\"]").unwrap();
        store.save_setting("watchlist", "[\"VNM\",\"FPT\"]").unwrap();
        assert_eq!(
            store.get_setting("watchlist").unwrap().as_deref(),
            Some("[\"VNM\",\"FPT\"]")
        );

        store.save_setting("default_quantity", "200").unwrap();
        let all = store.all_settings().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["default_quantity"], "200");
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bottrade.db");
        {
            let store = Store::open(&path).unwrap();
            store.save_bar(&bar(0, 100.0)).unwrap();
        }
        // Reopen and verify the row survived.
        let store = Store::open(&path).unwrap();
        assert_eq!(store.get_bars("VNM", "1H", 10).unwrap().len(), 1);
    }
}
