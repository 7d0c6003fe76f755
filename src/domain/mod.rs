//! Core domain types and logic.

pub mod ohlcv;
pub mod indicator;
pub mod indicator_set;
pub mod rule;
pub mod rule_parser;
pub mod rule_eval;
pub mod scoring;
pub mod strategy;
pub mod position;
pub mod portfolio;
pub mod execution;
pub mod backtest;
pub mod metrics;
pub mod universe;
pub mod config_validation;
pub mod error;
