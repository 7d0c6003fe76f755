//! Instrument universe parsing and the multi-instrument scan.
//!
//! A scan scores the latest bar of every instrument independently. One
//! instrument failing never aborts the scan: the failure is recorded as a
//! skip reason in the status list and logged.
//!
//! With `verify` set, each scored instrument is also backtested over the bars
//! already fetched for it, and the ranking can use the backtest return.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::domain::backtest::{BacktestConfig, DEFAULT_INITIAL_CAPITAL, run_backtest};
use crate::domain::error::TrendscanError;
use crate::domain::indicator_set::{
    IndicatorSet, IndicatorSnapshot, VOLUME_SPIKE_LOOKBACK, VOLUME_SPIKE_MULTIPLE,
};
use crate::domain::metrics::Metrics;
use crate::domain::rule_eval::evaluate;
use crate::domain::scoring::ScoreResult;
use crate::domain::strategy::Strategy;
use crate::ports::data_port::DataPort;

pub const DEFAULT_TOP_N: usize = 10;
pub const DEFAULT_SCAN_LOOKBACK: usize = 126;
pub const DEFAULT_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in code list")]
    EmptyToken,

    #[error("duplicate code: {0}")]
    DuplicateCode(String),
}

/// Split a comma-separated code list, uppercasing each code.
pub fn parse_codes(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut codes = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let code = trimmed.to_uppercase();
        if !seen.insert(code.clone()) {
            return Err(UniverseError::DuplicateCode(code));
        }
        codes.push(code);
    }

    Ok(codes)
}

/// Ranking key for scan results. Ties always fall back to the code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RankBy {
    #[default]
    Score,
    /// Backtest total return; unverified results rank last.
    Return,
}

impl FromStr for RankBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "score" => Ok(RankBy::Score),
            "return" => Ok(RankBy::Return),
            other => Err(format!(
                "unknown ranking '{}', expected score or return",
                other
            )),
        }
    }
}

impl fmt::Display for RankBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RankBy::Score => write!(f, "score"),
            RankBy::Return => write!(f, "return"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanOptions {
    pub top_n: usize,
    /// Number of most recent bars requested per instrument.
    pub lookback: usize,
    /// Upper bound on instruments fetched at once.
    pub concurrency: usize,
    /// Backtest each scored instrument over its fetched bars.
    pub verify: bool,
    /// Ranking by `Return` implies `verify`.
    pub rank_by: RankBy,
    /// Starting capital of the verification backtests.
    pub initial_capital: f64,
}

impl ScanOptions {
    pub fn verifies(&self) -> bool {
        self.verify || self.rank_by == RankBy::Return
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        ScanOptions {
            top_n: DEFAULT_TOP_N,
            lookback: DEFAULT_SCAN_LOOKBACK,
            concurrency: DEFAULT_CONCURRENCY,
            verify: false,
            rank_by: RankBy::Score,
            initial_capital: DEFAULT_INITIAL_CAPITAL,
        }
    }
}

/// Scored latest bar of one instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanResult {
    pub code: String,
    pub date: NaiveDate,
    pub close: f64,
    pub change_pct: f64,
    pub score: ScoreResult,
    pub snapshot: IndicatorSnapshot,
    /// Close above the upper Bollinger band.
    pub is_breakout: bool,
    /// Mid MA; a close below it breaks the trend.
    pub stop_level: f64,
    /// The strategy's entry rule holds on this bar.
    pub entry_signal: bool,
    /// Most recent volume spike within the last few bars.
    pub volume_spike: Option<NaiveDate>,
    /// Backtest of the strategy over the scanned bars, when verifying.
    pub verification: Option<Metrics>,
}

impl ScanResult {
    pub fn rsi(&self) -> f64 {
        self.snapshot.rsi
    }

    pub fn disparity(&self) -> f64 {
        self.snapshot.disparity()
    }

    pub fn verified_return_pct(&self) -> Option<f64> {
        self.verification.as_ref().map(|m| m.total_return_pct)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    NoData,
    InsufficientHistory { bars: usize, minimum: usize },
    Malformed(String),
    SourceError(String),
}

impl From<&TrendscanError> for SkipReason {
    fn from(err: &TrendscanError) -> Self {
        match err {
            TrendscanError::NotFound { .. } => SkipReason::NoData,
            TrendscanError::InsufficientHistory { bars, minimum, .. } => {
                SkipReason::InsufficientHistory {
                    bars: *bars,
                    minimum: *minimum,
                }
            }
            TrendscanError::MalformedSeries { reason, .. } => SkipReason::Malformed(reason.clone()),
            other => SkipReason::SourceError(other.to_string()),
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoData => write!(f, "no data"),
            SkipReason::InsufficientHistory { bars, minimum } => {
                write!(f, "only {} bars, minimum {} required", bars, minimum)
            }
            SkipReason::Malformed(reason) => write!(f, "malformed series: {}", reason),
            SkipReason::SourceError(reason) => write!(f, "data source error: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    Scanned,
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CodeStatus {
    pub code: String,
    pub outcome: ScanOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanReport {
    /// Ranked per `ScanOptions::rank_by`, best first, at most `top_n` entries.
    pub results: Vec<ScanResult>,
    /// One entry per requested code, in input order.
    pub statuses: Vec<CodeStatus>,
}

impl ScanReport {
    pub fn scanned_count(&self) -> usize {
        self.statuses
            .iter()
            .filter(|s| s.outcome == ScanOutcome::Scanned)
            .count()
    }

    pub fn skipped(&self) -> impl Iterator<Item = (&str, &SkipReason)> {
        self.statuses.iter().filter_map(|s| match &s.outcome {
            ScanOutcome::Skipped(reason) => Some((s.code.as_str(), reason)),
            ScanOutcome::Scanned => None,
        })
    }
}

/// Score the latest bar of one instrument's series, and backtest the series
/// when `options` asks for verification.
pub fn scan_code(
    port: &dyn DataPort,
    code: &str,
    strategy: &Strategy,
    options: &ScanOptions,
) -> Result<ScanResult, TrendscanError> {
    let bars = port.fetch_series(code, options.lookback)?;
    let indicators = IndicatorSet::compute(code, &bars, &strategy.params)?;
    let snapshot = indicators
        .latest()
        .ok_or_else(|| TrendscanError::InsufficientHistory {
            code: code.to_string(),
            bars: bars.len(),
            minimum: strategy.min_history(),
        })?;

    let index = snapshot.index;
    let bar = &bars[index];
    let change_pct = bar.change_pct(bars[index - 1].close);
    let score = strategy.scoring.score(&snapshot);

    let verification = if options.verifies() {
        let config = BacktestConfig {
            initial_capital: options.initial_capital,
            lookback: bars.len(),
        };
        let metrics = run_backtest(code, &bars, strategy, &config)?.metrics;
        debug!(
            code,
            total_return_pct = metrics.total_return_pct,
            trade_count = metrics.trade_count,
            "verified"
        );
        Some(metrics)
    } else {
        None
    };

    debug!(code, score = score.score, label = %score.label, "scored");
    Ok(ScanResult {
        code: code.to_string(),
        date: bar.date,
        close: bar.close,
        change_pct,
        is_breakout: snapshot.is_breakout(),
        stop_level: snapshot.ma_mid,
        entry_signal: evaluate(&strategy.entry, &snapshot),
        volume_spike: indicators.recent_volume_spike(
            index,
            VOLUME_SPIKE_LOOKBACK,
            VOLUME_SPIKE_MULTIPLE,
        ),
        score,
        snapshot,
        verification,
    })
}

fn rank(a: &ScanResult, b: &ScanResult, rank_by: RankBy) -> Ordering {
    let primary = match rank_by {
        RankBy::Score => b.score.score.cmp(&a.score.score),
        RankBy::Return => match (a.verified_return_pct(), b.verified_return_pct()) {
            (Some(x), Some(y)) => y.total_cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
    };
    primary.then_with(|| a.code.cmp(&b.code))
}

/// Scan every code and rank the survivors.
///
/// Codes are fetched on a dedicated pool of `options.concurrency` threads.
/// Results are sorted by score or verified return (descending, ties by code)
/// after gathering, so the ranking does not depend on scheduling.
pub fn scan(
    port: &dyn DataPort,
    codes: &[String],
    strategy: &Strategy,
    options: &ScanOptions,
) -> ScanReport {
    info!(
        codes = codes.len(),
        strategy = %strategy.name,
        concurrency = options.concurrency,
        verify = options.verifies(),
        rank_by = %options.rank_by,
        "starting scan"
    );

    let run = || -> Vec<Result<ScanResult, TrendscanError>> {
        codes
            .par_iter()
            .map(|code| scan_code(port, code, strategy, options))
            .collect()
    };

    let outcomes = match rayon::ThreadPoolBuilder::new()
        .num_threads(options.concurrency.max(1))
        .thread_name(|i| format!("trendscan-scan-{i}"))
        .build()
    {
        Ok(pool) => pool.install(run),
        Err(e) => {
            warn!(error = %e, "scan pool unavailable, scanning sequentially");
            codes
                .iter()
                .map(|code| scan_code(port, code, strategy, options))
                .collect()
        }
    };

    let mut results = Vec::new();
    let mut statuses = Vec::with_capacity(codes.len());
    for (code, outcome) in codes.iter().zip(outcomes) {
        match outcome {
            Ok(result) => {
                results.push(result);
                statuses.push(CodeStatus {
                    code: code.clone(),
                    outcome: ScanOutcome::Scanned,
                });
            }
            Err(e) => {
                let reason = SkipReason::from(&e);
                warn!(code = %code, %reason, "skipping instrument");
                statuses.push(CodeStatus {
                    code: code.clone(),
                    outcome: ScanOutcome::Skipped(reason),
                });
            }
        }
    }

    results.sort_by(|a, b| rank(a, b, options.rank_by));
    results.truncate(options.top_n);

    let report = ScanReport { results, statuses };
    let scanned = report.scanned_count();
    info!(
        scanned,
        skipped = codes.len() - scanned,
        "scan complete"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_codes_basic() {
        let codes = parse_codes("aapl, MSFT ,005930.ks").unwrap();
        assert_eq!(codes, vec!["AAPL", "MSFT", "005930.KS"]);
    }

    #[test]
    fn parse_codes_single() {
        assert_eq!(parse_codes("nvda").unwrap(), vec!["NVDA"]);
    }

    #[test]
    fn parse_codes_rejects_empty_token() {
        assert_eq!(parse_codes("AAPL,,MSFT"), Err(UniverseError::EmptyToken));
        assert_eq!(parse_codes(""), Err(UniverseError::EmptyToken));
    }

    #[test]
    fn parse_codes_rejects_duplicates() {
        assert_eq!(
            parse_codes("AAPL,msft,aapl"),
            Err(UniverseError::DuplicateCode("AAPL".into()))
        );
    }

    #[test]
    fn skip_reason_from_errors() {
        let err = TrendscanError::InsufficientHistory {
            code: "X".into(),
            bars: 10,
            minimum: 60,
        };
        assert_eq!(
            SkipReason::from(&err),
            SkipReason::InsufficientHistory {
                bars: 10,
                minimum: 60
            }
        );
        assert_eq!(
            SkipReason::from(&TrendscanError::NotFound { code: "X".into() }),
            SkipReason::NoData
        );
        let source = SkipReason::from(&TrendscanError::SourceUnavailable {
            reason: "timeout".into(),
        });
        assert!(source.to_string().contains("timeout"));
    }

    #[test]
    fn default_options() {
        let opts = ScanOptions::default();
        assert_eq!(opts.top_n, 10);
        assert_eq!(opts.lookback, 126);
        assert_eq!(opts.concurrency, 4);
        assert!(!opts.verify);
        assert_eq!(opts.rank_by, RankBy::Score);
        assert_eq!(opts.initial_capital, 1_000_000.0);
        assert!(!opts.verifies());
        let by_return = ScanOptions {
            rank_by: RankBy::Return,
            ..opts
        };
        assert!(by_return.verifies());
    }

    #[test]
    fn rank_by_parses() {
        assert_eq!("score".parse::<RankBy>(), Ok(RankBy::Score));
        assert_eq!(" Return ".parse::<RankBy>(), Ok(RankBy::Return));
        assert!("profit".parse::<RankBy>().unwrap_err().contains("unknown ranking 'profit'"));
        assert_eq!(RankBy::Return.to_string(), "return");
    }
}
