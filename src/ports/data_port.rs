//! Market data port trait.

use crate::domain::error::TrendscanError;
use crate::domain::ohlcv::OhlcvBar;

/// Ticker under which adapters store the USD/KRW rate series.
pub const EXCHANGE_RATE_CODE: &str = "KRW=X";

/// Source of daily price history.
///
/// Implementations are shared across the scan's worker threads.
pub trait DataPort: Send + Sync {
    /// The most recent `lookback` bars for `code`, oldest first.
    ///
    /// Fails with `NotFound` for an unknown code and `SourceUnavailable` when
    /// the backing store cannot be reached.
    fn fetch_series(&self, code: &str, lookback: usize) -> Result<Vec<OhlcvBar>, TrendscanError>;

    fn list_symbols(&self) -> Result<Vec<String>, TrendscanError>;

    /// Units of local currency per US dollar; used for display only.
    fn fetch_exchange_rate(&self) -> Result<f64, TrendscanError> {
        Err(TrendscanError::SourceUnavailable {
            reason: "exchange rate not provided by this data source".to_string(),
        })
    }
}
