//! Backtest performance aggregates.

use std::fmt;

use super::execution::Trade;
use super::portfolio::EquityPoint;

/// One-word commentary on a total return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Total return above +30%.
    Strong,
    /// Positive total return.
    Positive,
    /// Flat or losing; the trend kept reversing under the strategy.
    Whipsaw,
}

impl Verdict {
    pub fn from_return(total_return_pct: f64) -> Self {
        if total_return_pct > 30.0 {
            Verdict::Strong
        } else if total_return_pct > 0.0 {
            Verdict::Positive
        } else {
            Verdict::Whipsaw
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Strong => write!(f, "strong trend captured"),
            Verdict::Positive => write!(f, "positive return"),
            Verdict::Whipsaw => write!(f, "whipsawed or no trend"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub initial_capital: f64,
    pub final_equity: f64,
    pub total_return_pct: f64,
    pub trade_count: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate_pct: f64,
    pub avg_return_pct: f64,
    pub max_drawdown_pct: f64,
    pub verdict: Verdict,
}

impl Metrics {
    /// Aggregate a finished simulation. `trade_count` counts closed round
    /// trips only; an open position contributes through `final_equity`.
    pub fn compute(
        initial_capital: f64,
        final_equity: f64,
        trades: &[Trade],
        equity_curve: &[EquityPoint],
    ) -> Self {
        let total_return_pct = if initial_capital > 0.0 {
            (final_equity / initial_capital - 1.0) * 100.0
        } else {
            0.0
        };

        let returns: Vec<f64> = trades.iter().filter_map(|t| t.return_pct).collect();
        let trade_count = returns.len();
        let wins = returns.iter().filter(|r| **r > 0.0).count();
        let losses = trade_count - wins;

        let win_rate_pct = if trade_count > 0 {
            wins as f64 / trade_count as f64 * 100.0
        } else {
            0.0
        };
        let avg_return_pct = if trade_count > 0 {
            returns.iter().sum::<f64>() / trade_count as f64
        } else {
            0.0
        };

        Metrics {
            initial_capital,
            final_equity,
            total_return_pct,
            trade_count,
            wins,
            losses,
            win_rate_pct,
            avg_return_pct,
            max_drawdown_pct: compute_drawdown(equity_curve) * 100.0,
            verdict: Verdict::from_return(total_return_pct),
        }
    }
}

/// Largest peak-to-trough decline of the curve as a fraction of the peak.
fn compute_drawdown(equity_curve: &[EquityPoint]) -> f64 {
    let Some(first) = equity_curve.first() else {
        return 0.0;
    };

    let mut peak = first.equity;
    let mut max_dd = 0.0_f64;
    for point in equity_curve {
        if point.equity > peak {
            peak = point.equity;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - point.equity) / peak);
        }
    }
    max_dd
}
