//! Fill simulation and exit trigger checking.
//!
//! Fills happen at the bar's close with no slippage or commission. Entries
//! commit all cash to a real-valued share count; exits convert the whole
//! holding back to cash.

use std::fmt;

use chrono::NaiveDate;
use tracing::debug;

use super::indicator_set::IndicatorSnapshot;
use super::portfolio::Portfolio;
use super::position::Position;
use super::strategy::{ExitPolicy, ExitReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeKind {
    Entry,
    TakeProfit,
    StopLoss,
    TrendBreak,
}

impl TradeKind {
    pub fn is_exit(&self) -> bool {
        !matches!(self, TradeKind::Entry)
    }
}

impl From<ExitReason> for TradeKind {
    fn from(reason: ExitReason) -> Self {
        match reason {
            ExitReason::TakeProfit => TradeKind::TakeProfit,
            ExitReason::StopLoss => TradeKind::StopLoss,
            ExitReason::TrendBreak => TradeKind::TrendBreak,
        }
    }
}

impl fmt::Display for TradeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeKind::Entry => write!(f, "entry"),
            TradeKind::TakeProfit => write!(f, "take_profit"),
            TradeKind::StopLoss => write!(f, "stop_loss"),
            TradeKind::TrendBreak => write!(f, "trend_break"),
        }
    }
}

/// One fill in the trade log. Exits carry the round trip's percent return.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub kind: TradeKind,
    pub date: NaiveDate,
    pub price: f64,
    pub shares: f64,
    pub return_pct: Option<f64>,
}

impl Trade {
    /// An exit that sold above its entry. Entries are never wins.
    pub fn is_win(&self) -> bool {
        self.return_pct.is_some_and(|r| r > 0.0)
    }
}

/// Buy with all available cash at `price`. Returns `None` when already long
/// or when there is nothing to buy with.
pub fn enter_long(
    portfolio: &mut Portfolio,
    code: &str,
    price: f64,
    date: NaiveDate,
    policy: &ExitPolicy,
) -> Option<Trade> {
    if portfolio.is_long() || portfolio.cash <= 0.0 || price <= 0.0 {
        return None;
    }

    let shares = portfolio.cash / price;
    portfolio.cash = 0.0;
    portfolio.position = Some(Position::open(
        code,
        price,
        date,
        shares,
        policy.take_profit_pct,
        policy.stop_loss_pct,
    ));

    debug!(code, %date, price, shares, "entered long");
    Some(Trade {
        kind: TradeKind::Entry,
        date,
        price,
        shares,
        return_pct: None,
    })
}

/// Sell the whole position at `price`. Returns `None` when flat.
pub fn exit_position(
    portfolio: &mut Portfolio,
    price: f64,
    date: NaiveDate,
    reason: ExitReason,
) -> Option<Trade> {
    let position = portfolio.position.take()?;
    portfolio.cash += position.market_value(price);
    let return_pct = position.return_pct(price);

    debug!(
        code = %position.code,
        %date,
        price,
        return_pct,
        %reason,
        "exited position"
    );
    Some(Trade {
        kind: reason.into(),
        date,
        price,
        shares: position.shares,
        return_pct: Some(return_pct),
    })
}

/// First armed exit, in the policy's priority order, that fires on this bar.
pub fn check_exit(
    position: &Position,
    snapshot: &IndicatorSnapshot,
    policy: &ExitPolicy,
) -> Option<ExitReason> {
    let close = snapshot.close;
    policy
        .priority
        .iter()
        .copied()
        .filter(|reason| policy.is_enabled(*reason))
        .find(|reason| match reason {
            ExitReason::TakeProfit => position.should_take_profit(close),
            ExitReason::StopLoss => position.should_stop_loss(close),
            ExitReason::TrendBreak => close < snapshot.ma_mid,
        })
}
