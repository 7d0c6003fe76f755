//! Single-instrument backtest engine.
//!
//! The simulator is a two-state machine (flat or long). Each bar from the
//! strategy's minimum history onward first checks the open position's exits,
//! then the entry rule, then records one equity point. A position still open
//! at the end of the series is marked to the last close; no closing trade is
//! synthesized.

use tracing::{debug, info};

use super::error::TrendscanError;
use super::execution::{Trade, check_exit, enter_long, exit_position};
use super::indicator_set::IndicatorSet;
use super::metrics::Metrics;
use super::ohlcv::OhlcvBar;
use super::portfolio::{EquityPoint, Portfolio};
use super::rule_eval::evaluate;
use super::strategy::Strategy;
use crate::ports::data_port::DataPort;

pub const DEFAULT_INITIAL_CAPITAL: f64 = 1_000_000.0;
pub const DEFAULT_BACKTEST_LOOKBACK: usize = 252;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    /// Number of most recent bars requested from the data source.
    pub lookback: usize,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            initial_capital: DEFAULT_INITIAL_CAPITAL,
            lookback: DEFAULT_BACKTEST_LOOKBACK,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub code: String,
    pub strategy: String,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub metrics: Metrics,
    /// The position left open at the end of the series, if any.
    pub open_position: bool,
}

/// Simulate `strategy` over `bars`.
///
/// Fails with `InsufficientHistory` when the series is shorter than the
/// strategy's minimum history, and with `MalformedSeries` on invalid bars.
pub fn run_backtest(
    code: &str,
    bars: &[OhlcvBar],
    strategy: &Strategy,
    config: &BacktestConfig,
) -> Result<BacktestResult, TrendscanError> {
    let indicators = IndicatorSet::compute(code, bars, &strategy.params)?;
    let start = strategy.min_history().max(1);

    let mut portfolio = Portfolio::new(config.initial_capital);
    let mut trades: Vec<Trade> = Vec::new();

    for (index, bar) in bars.iter().enumerate().skip(start) {
        let Some(snapshot) = indicators.snapshot(index) else {
            continue;
        };

        let mut exited_this_bar = false;
        if let Some(position) = &portfolio.position {
            if let Some(reason) = check_exit(position, &snapshot, &strategy.exit) {
                if let Some(trade) = exit_position(&mut portfolio, bar.close, bar.date, reason) {
                    trades.push(trade);
                    exited_this_bar = true;
                }
            }
        }

        let may_enter = !exited_this_bar || strategy.allow_same_bar_reentry;
        if !portfolio.is_long() && may_enter && evaluate(&strategy.entry, &snapshot) {
            if let Some(trade) =
                enter_long(&mut portfolio, code, bar.close, bar.date, &strategy.exit)
            {
                trades.push(trade);
            }
        }

        portfolio.record_equity(bar.date, bar.close);
    }

    let final_equity = portfolio.final_equity();
    let metrics = Metrics::compute(
        config.initial_capital,
        final_equity,
        &trades,
        &portfolio.equity_curve,
    );

    debug!(
        code,
        trades = trades.len(),
        final_equity,
        "backtest finished"
    );

    Ok(BacktestResult {
        code: code.to_string(),
        strategy: strategy.name.clone(),
        trades,
        equity_curve: portfolio.equity_curve,
        metrics,
        open_position: portfolio.position.is_some(),
    })
}

/// Fetch `config.lookback` bars for `code` and simulate `strategy` over them.
pub fn backtest(
    port: &dyn DataPort,
    code: &str,
    strategy: &Strategy,
    config: &BacktestConfig,
) -> Result<BacktestResult, TrendscanError> {
    info!(code, strategy = %strategy.name, lookback = config.lookback, "running backtest");
    let bars = port.fetch_series(code, config.lookback)?;
    let result = run_backtest(code, &bars, strategy, config)?;
    info!(
        code,
        total_return_pct = result.metrics.total_return_pct,
        trade_count = result.metrics.trade_count,
        "backtest complete"
    );
    Ok(result)
}
