//! Cash, the open position and the equity curve of one simulation.

use chrono::NaiveDate;

use super::position::Position;

#[derive(Debug, Clone, PartialEq)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    pub cash: f64,
    pub initial_capital: f64,
    pub position: Option<Position>,
    pub equity_curve: Vec<EquityPoint>,
}

impl Portfolio {
    pub fn new(initial_capital: f64) -> Self {
        Portfolio {
            cash: initial_capital,
            initial_capital,
            position: None,
            equity_curve: Vec::new(),
        }
    }

    pub fn is_long(&self) -> bool {
        self.position.is_some()
    }

    /// Cash when flat, otherwise the position marked at `price`.
    pub fn equity(&self, price: f64) -> f64 {
        match &self.position {
            Some(pos) => self.cash + pos.market_value(price),
            None => self.cash,
        }
    }

    pub fn record_equity(&mut self, date: NaiveDate, price: f64) {
        let equity = self.equity(price);
        self.equity_curve.push(EquityPoint { date, equity });
    }

    pub fn final_equity(&self) -> f64 {
        self.equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(self.initial_capital)
    }
}
