//! SQLite data adapter.
//!
//! Bars live in one `ohlcv` table keyed by `(code, date)`. The USD/KRW rate is
//! stored as an ordinary series under `KRW=X`.

use crate::domain::error::TrendscanError;
use crate::domain::ohlcv::OhlcvBar;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::{DataPort, EXCHANGE_RATE_CODE};
use chrono::NaiveDate;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

fn unavailable(e: impl std::fmt::Display) -> TrendscanError {
    TrendscanError::SourceUnavailable {
        reason: e.to_string(),
    }
}

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteAdapter {
    /// Open the database named by `[data] path` with a pool of
    /// `[data] pool_size` connections (default 4).
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, TrendscanError> {
        let db_path =
            config
                .get_string("data", "path")
                .ok_or_else(|| TrendscanError::ConfigMissing {
                    section: "data".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("data", "pool_size", 4).clamp(1, 64) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(unavailable)?;

        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, TrendscanError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(unavailable)?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, TrendscanError> {
        self.pool.get().map_err(unavailable)
    }

    pub fn initialize_schema(&self) -> Result<(), TrendscanError> {
        self.conn()?
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS ohlcv (
                    code TEXT NOT NULL,
                    date TEXT NOT NULL,
                    open REAL NOT NULL,
                    high REAL NOT NULL,
                    low REAL NOT NULL,
                    close REAL NOT NULL,
                    volume INTEGER NOT NULL,
                    PRIMARY KEY (code, date)
                );",
            )
            .map_err(unavailable)
    }

    pub fn insert_bars(&self, bars: &[OhlcvBar]) -> Result<(), TrendscanError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(unavailable)?;

        for bar in bars {
            tx.execute(
                "INSERT OR REPLACE INTO ohlcv (code, date, open, high, low, close, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    bar.code,
                    bar.date.format("%Y-%m-%d").to_string(),
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume
                ],
            )
            .map_err(unavailable)?;
        }

        tx.commit().map_err(unavailable)
    }
}

impl DataPort for SqliteAdapter {
    fn fetch_series(&self, code: &str, lookback: usize) -> Result<Vec<OhlcvBar>, TrendscanError> {
        let conn = self.conn()?;
        let limit = i64::try_from(lookback).unwrap_or(i64::MAX);

        let mut stmt = conn
            .prepare(
                "SELECT date, open, high, low, close, volume
                 FROM ohlcv
                 WHERE code = ?1
                 ORDER BY date DESC
                 LIMIT ?2",
            )
            .map_err(unavailable)?;

        let rows = stmt
            .query_map(params![code, limit], |row| {
                let date_str: String = row.get(0)?;
                let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        0,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?;
                Ok(OhlcvBar {
                    code: code.to_string(),
                    date,
                    open: row.get(1)?,
                    high: row.get(2)?,
                    low: row.get(3)?,
                    close: row.get(4)?,
                    volume: row.get(5)?,
                })
            })
            .map_err(unavailable)?;

        let mut bars = Vec::new();
        for row in rows {
            bars.push(row.map_err(|e| TrendscanError::MalformedSeries {
                code: code.to_string(),
                reason: e.to_string(),
            })?);
        }

        if bars.is_empty() && lookback > 0 {
            return Err(TrendscanError::NotFound {
                code: code.to_string(),
            });
        }
        bars.reverse();
        Ok(bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, TrendscanError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT code FROM ohlcv WHERE code != ?1 ORDER BY code")
            .map_err(unavailable)?;

        let rows = stmt
            .query_map(params![EXCHANGE_RATE_CODE], |row| row.get(0))
            .map_err(unavailable)?;

        let mut symbols = Vec::new();
        for row in rows {
            symbols.push(row.map_err(unavailable)?);
        }
        Ok(symbols)
    }

    fn fetch_exchange_rate(&self) -> Result<f64, TrendscanError> {
        let bars = self.fetch_series(EXCHANGE_RATE_CODE, 1)?;
        bars.last()
            .map(|b| b.close)
            .filter(|rate| *rate > 0.0)
            .ok_or_else(|| unavailable(format!("{} has no usable close", EXCHANGE_RATE_CODE)))
    }
}
