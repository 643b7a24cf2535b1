//! Error types and result definitions.

use thiserror::Error;

/// Main error type for the library.
#[derive(Error, Debug)]
pub enum BotError {
    /// SQLite error from the store.
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// A bar failed the OHLC sanity check or carried non-finite numbers.
    #[error("malformed bar: {0}")]
    MalformedBar(String),

    /// A stored row could not be decoded back into a model.
    #[error("corrupt row: {0}")]
    CorruptRow(String),

    /// JSON (de)serialization failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The symbol has no running pipeline worker.
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    /// CSV parse failure (backtest replay input).
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type used throughout the library.
pub type Result<T> = std::result::Result<T, BotError>;
