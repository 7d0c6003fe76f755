//! The single open long position a simulation may hold.

use chrono::NaiveDate;

/// A long holding with optional take-profit and stop-loss price levels.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub code: String,
    pub entry_price: f64,
    pub entry_date: NaiveDate,
    pub shares: f64,
    pub take_profit: Option<f64>,
    pub stop_loss: Option<f64>,
}

impl Position {
    /// Open a position of `shares` at `entry_price`, arming the exit levels
    /// `take_profit_pct` above and `stop_loss_pct` below the entry.
    pub fn open(
        code: &str,
        entry_price: f64,
        entry_date: NaiveDate,
        shares: f64,
        take_profit_pct: Option<f64>,
        stop_loss_pct: Option<f64>,
    ) -> Self {
        Position {
            code: code.to_string(),
            entry_price,
            entry_date,
            shares,
            take_profit: take_profit_pct.map(|pct| entry_price * (1.0 + pct / 100.0)),
            stop_loss: stop_loss_pct.map(|pct| entry_price * (1.0 - pct / 100.0)),
        }
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.shares * price
    }

    /// Percent return of selling at `price`; 0 when the entry price is 0.
    pub fn return_pct(&self, price: f64) -> f64 {
        if self.entry_price == 0.0 {
            return 0.0;
        }
        (price - self.entry_price) / self.entry_price * 100.0
    }

    pub fn should_take_profit(&self, price: f64) -> bool {
        self.take_profit.is_some_and(|level| price >= level)
    }

    pub fn should_stop_loss(&self, price: f64) -> bool {
        self.stop_loss.is_some_and(|level| price <= level)
    }
}
