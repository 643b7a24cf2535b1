//! Configuration from environment variables.

use crate::engine::EngineConfig;
use crate::indicators::IndicatorConfig;
use crate::patterns::PatternParams;

/// Application settings, loaded from the environment with sensible
/// defaults. Persisted `watchlist` / `default_quantity` settings override
/// the corresponding environment values at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Symbols to run pipelines for.
    pub watchlist: Vec<String>,
    /// Bar aggregation label.
    pub timeframe: String,
    /// HTTP bind host.
    pub host: String,
    /// HTTP bind port.
    pub port: u16,
    /// SQLite database path.
    pub database_path: String,
    /// Engine tunables (zone width, stop buffer, RR, quantity, periods).
    pub engine: EngineConfig,
    /// Backtest starting capital.
    pub backtest_initial_capital: f64,
    /// Backtest position size as a percent of capital.
    pub backtest_position_size_percent: f64,
    /// Run the built-in mock market feed instead of a live transport.
    pub mock_feed: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            watchlist: vec!["VNM".to_string(), "FPT".to_string(), "VIC".to_string()],
            timeframe: "1H".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8000,
            database_path: "bottrade.db".to_string(),
            engine: EngineConfig::default(),
            backtest_initial_capital: 100_000_000.0,
            backtest_position_size_percent: 10.0,
            mock_feed: false,
        }
    }
}

impl Settings {
    /// Load settings from the environment, falling back to defaults for
    /// missing or unparseable values.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let watchlist = match std::env::var("WATCHLIST") {
            Ok(raw) => parse_watchlist(&raw),
            Err(_) => defaults.watchlist,
        };

        Self {
            watchlist,
            timeframe: env_or("TIMEFRAME", defaults.timeframe),
            host: env_or("HOST", defaults.host),
            port: env_parse("PORT", defaults.port),
            database_path: env_or("DATABASE_PATH", defaults.database_path),
            engine: EngineConfig {
                zone_width_atr_mult: env_parse("ZONE_WIDTH_ATR_MULTIPLIER", 0.2),
                sl_buffer_atr_mult: env_parse("SL_BUFFER_ATR_MULTIPLIER", 0.05),
                risk_reward_ratio: env_parse("RISK_REWARD_RATIO", 2.0),
                default_quantity: env_parse("DEFAULT_QUANTITY", 100),
                indicators: IndicatorConfig {
                    rsi_period: env_parse("RSI_PERIOD", 14),
                    macd_fast: env_parse("MACD_FAST", 12),
                    macd_slow: env_parse("MACD_SLOW", 26),
                    macd_signal: env_parse("MACD_SIGNAL", 9),
                    atr_period: env_parse("ATR_PERIOD", 14),
                },
                patterns: PatternParams::default(),
            },
            backtest_initial_capital: env_parse(
                "BACKTEST_INITIAL_CAPITAL",
                defaults.backtest_initial_capital,
            ),
            backtest_position_size_percent: env_parse(
                "BACKTEST_POSITION_SIZE_PERCENT",
                defaults.backtest_position_size_percent,
            ),
            mock_feed: env_parse("MOCK_FEED", false),
        }
    }
}

/// Split a comma-separated watchlist into trimmed, upper-cased symbols.
pub fn parse_watchlist(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_watchlist() {
        assert_eq!(
            parse_watchlist("vnm, fpt ,VIC,,"),
            vec!["VNM".to_string(), "FPT".to_string(), "VIC".to_string()]
        );
        assert!(parse_watchlist("").is_empty());
        assert!(parse_watchlist(" , ").is_empty());
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.timeframe, "1H");
        assert_eq!(settings.engine.risk_reward_ratio, 2.0);
        assert_eq!(settings.engine.indicators.rsi_period, 14);
        assert_eq!(settings.backtest_position_size_percent, 10.0);
        assert!(!settings.mock_feed);
    }
}
