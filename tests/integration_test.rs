//! End-to-end tests of the scan and backtest pipelines over a mock data port.
//!
//! Tests cover:
//! - Short and broken series are reported per instrument, never fatal
//! - RSI bounds and the zero-loss guard on whole price series
//! - Simulator invariants: idempotence, one position at a time, cash
//!   reconciliation against the trade log, win-rate range
//! - Rising, crash and never-enter scenarios
//! - Scan ranking, truncation and independence from worker count
//! - Verified scans backtesting each scored code and ranking by return
//! - Scan output threaded into a backtest
//! - The same pipeline over a seeded in-memory SQLite store

mod common;

use approx::assert_relative_eq;
use common::*;
use proptest::prelude::*;
use trendscan::domain::backtest::{BacktestConfig, BacktestResult, backtest, run_backtest};
use trendscan::domain::error::TrendscanError;
use trendscan::domain::execution::{Trade, TradeKind};
use trendscan::domain::indicator_set::{IndicatorParams, IndicatorSet};
use trendscan::domain::rule::{Operand, Rule};
use trendscan::domain::strategy::Strategy;
use trendscan::domain::universe::{RankBy, ScanOptions, SkipReason, scan};

const MIN_HISTORY: usize = 60;

fn codes(list: &[&str]) -> Vec<String> {
    list.iter().map(|c| c.to_string()).collect()
}

/// Cash after replaying every fill, plus the open holding at `last_close`.
fn replay(initial_capital: f64, trades: &[Trade], last_close: f64) -> f64 {
    let mut cash = initial_capital;
    let mut held = 0.0;
    for trade in trades {
        if trade.kind.is_exit() {
            cash += trade.shares * trade.price;
            held = 0.0;
        } else {
            cash -= trade.shares * trade.price;
            held = trade.shares;
        }
    }
    cash + held * last_close
}

fn assert_alternating(result: &BacktestResult) {
    let mut long = false;
    for trade in &result.trades {
        if trade.kind.is_exit() {
            assert!(long, "exit without a position on {}", trade.date);
        } else {
            assert!(!long, "second entry while long on {}", trade.date);
        }
        long = !trade.kind.is_exit();
    }
    assert_eq!(long, result.open_position);
}

fn active_strategy() -> Strategy {
    Strategy {
        exit: Strategy::enhanced().exit,
        ..always_enter()
    }
}

fn random_walk(changes: &[f64]) -> Vec<OhlcvBar> {
    let mut close = 100.0;
    let closes: Vec<f64> = changes
        .iter()
        .map(|pct| {
            close *= 1.0 + pct / 100.0;
            close
        })
        .collect();
    let volumes: Vec<i64> = (0..closes.len())
        .map(|i| 800 + ((i * 13) % 17) as i64 * 150)
        .collect();
    series_with_volume("WALK", &closes, &volumes)
}

mod insufficient_history {
    use super::*;

    #[test]
    fn backtest_rejects_short_series() {
        let bars = rising("AAPL", MIN_HISTORY - 1);
        let err = run_backtest("AAPL", &bars, &Strategy::trend_rider(), &BacktestConfig::default())
            .unwrap_err();
        match err {
            TrendscanError::InsufficientHistory { code, bars, minimum } => {
                assert_eq!(code, "AAPL");
                assert_eq!(bars, MIN_HISTORY - 1);
                assert_eq!(minimum, MIN_HISTORY);
            }
            other => panic!("expected InsufficientHistory, got {other}"),
        }
    }

    #[test]
    fn backtest_rejects_empty_series() {
        let err = run_backtest("AAPL", &[], &Strategy::knee(), &BacktestConfig::default())
            .unwrap_err();
        assert!(err.is_data_sufficiency());
    }

    #[test]
    fn scan_reports_every_failure_kind() {
        let mut broken = rising("BROKEN", 80);
        broken[40].close = -1.0;
        let port = MockDataPort::new()
            .with_bars("GOOD", rising("GOOD", 100))
            .with_bars("SHORT", rising("SHORT", 59))
            .with_bars("BROKEN", broken)
            .with_error("DOWN", "connection refused");

        let report = scan(
            &port,
            &codes(&["SHORT", "GOOD", "MISSING", "BROKEN", "DOWN"]),
            &Strategy::trend_rider(),
            &ScanOptions::default(),
        );

        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].code, "GOOD");
        assert_eq!(report.scanned_count(), 1);

        let skipped: Vec<(&str, &SkipReason)> = report.skipped().collect();
        assert_eq!(skipped.len(), 4);
        assert_eq!(skipped[0].0, "SHORT");
        assert_eq!(
            skipped[0].1,
            &SkipReason::InsufficientHistory {
                bars: 59,
                minimum: MIN_HISTORY
            }
        );
        assert_eq!(skipped[1], ("MISSING", &SkipReason::NoData));
        assert!(matches!(skipped[2], ("BROKEN", SkipReason::Malformed(_))));
        assert!(matches!(skipped[3], ("DOWN", SkipReason::SourceError(_))));
    }

    #[test]
    fn exactly_min_history_is_scannable() {
        let port = MockDataPort::new().with_bars("EDGE", rising("EDGE", MIN_HISTORY));
        let report = scan(
            &port,
            &codes(&["EDGE"]),
            &Strategy::trend_rider(),
            &ScanOptions::default(),
        );
        assert_eq!(report.results.len(), 1);
    }
}

mod rsi_properties {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn snapshot_rsi_stays_in_bounds(
            changes in prop::collection::vec(-8.0f64..8.0, MIN_HISTORY..160)
        ) {
            let bars = random_walk(&changes);
            let set = IndicatorSet::compute("WALK", &bars, &IndicatorParams::default()).unwrap();
            for index in 0..set.len() {
                if let Some(snapshot) = set.snapshot(index) {
                    prop_assert!((0.0..=100.0).contains(&snapshot.rsi), "rsi {}", snapshot.rsi);
                }
            }
        }

        #[test]
        fn non_falling_series_has_rsi_100(
            steps in prop::collection::vec(0.0f64..3.0, MIN_HISTORY..120)
        ) {
            let mut close = 50.0;
            let closes: Vec<f64> = steps.iter().map(|s| { close += s; close }).collect();
            let bars = series("UP", &closes);
            let set = IndicatorSet::compute("UP", &bars, &IndicatorParams::default()).unwrap();
            let latest = set.latest().unwrap();
            prop_assert_eq!(latest.rsi, 100.0);
        }
    }
}

mod simulator_properties {
    use super::*;

    fn strategies() -> Vec<Strategy> {
        vec![
            active_strategy(),
            Strategy::trend_rider(),
            Strategy::knee(),
            Strategy::enhanced(),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn backtest_is_idempotent(
            changes in prop::collection::vec(-5.0f64..5.0, MIN_HISTORY..200)
        ) {
            let bars = random_walk(&changes);
            for strategy in strategies() {
                let config = BacktestConfig::default();
                let first = run_backtest("WALK", &bars, &strategy, &config).unwrap();
                let second = run_backtest("WALK", &bars, &strategy, &config).unwrap();
                prop_assert_eq!(first, second);
            }
        }

        #[test]
        fn never_two_entries_in_a_row(
            changes in prop::collection::vec(-5.0f64..5.0, MIN_HISTORY..200)
        ) {
            let bars = random_walk(&changes);
            for strategy in strategies() {
                let result =
                    run_backtest("WALK", &bars, &strategy, &BacktestConfig::default()).unwrap();
                assert_alternating(&result);
            }
        }

        #[test]
        fn return_reconciles_with_trade_log(
            changes in prop::collection::vec(-5.0f64..5.0, MIN_HISTORY + 1..200),
            capital in 1_000.0f64..50_000_000.0,
        ) {
            let bars = random_walk(&changes);
            let config = BacktestConfig { initial_capital: capital, ..BacktestConfig::default() };
            for strategy in strategies() {
                let result = run_backtest("WALK", &bars, &strategy, &config).unwrap();
                let last_close = bars.last().unwrap().close;
                let replayed = replay(capital, &result.trades, last_close);

                assert_relative_eq!(replayed, result.metrics.final_equity, max_relative = 1e-6);
                assert_relative_eq!(
                    (replayed / capital - 1.0) * 100.0,
                    result.metrics.total_return_pct,
                    epsilon = 1e-6,
                    max_relative = 1e-6
                );
            }
        }

        #[test]
        fn win_rate_in_range(
            changes in prop::collection::vec(-5.0f64..5.0, MIN_HISTORY..200)
        ) {
            let bars = random_walk(&changes);
            for strategy in strategies() {
                let m = run_backtest("WALK", &bars, &strategy, &BacktestConfig::default())
                    .unwrap()
                    .metrics;
                prop_assert!((0.0..=100.0).contains(&m.win_rate_pct));
                prop_assert_eq!(m.wins + m.losses, m.trade_count);
                if m.trade_count == 0 {
                    prop_assert_eq!(m.win_rate_pct, 0.0);
                }
            }
        }
    }
}

mod scenarios {
    use super::*;

    fn aligned_entry() -> Strategy {
        Strategy {
            entry: Rule::And(vec![
                Rule::Above {
                    left: Operand::MaShort,
                    right: Operand::MaMid,
                },
                Rule::Above {
                    left: Operand::MaMid,
                    right: Operand::MaLong,
                },
            ]),
            ..Strategy::trend_rider()
        }
    }

    #[test]
    fn rising_series_scores_alignment_not_breakout() {
        let port = MockDataPort::new().with_bars("RISE", rising("RISE", 100));
        let report = scan(
            &port,
            &codes(&["RISE"]),
            &Strategy::trend_rider(),
            &ScanOptions::default(),
        );
        let result = &report.results[0];
        let reasons: Vec<&str> = result.score.reasons.iter().map(|r| r.reason.as_str()).collect();

        assert!(reasons.contains(&"MA alignment (short > mid > long)"));
        assert!(!reasons.contains(&"Bollinger upper band breakout"));
        assert!(!result.is_breakout);
        assert_eq!(result.rsi(), 100.0);
        // alignment 30 + near upper band 15 + RSI 20; flat volume scores nothing
        assert_eq!(result.score.score, 65);
        assert_eq!(result.score.label, "consider");
    }

    #[test]
    fn rising_series_holds_one_position() {
        let bars = rising("RISE", 100);
        let result =
            run_backtest("RISE", &bars, &aligned_entry(), &BacktestConfig::default()).unwrap();

        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].kind, TradeKind::Entry);
        assert_eq!(result.trades[0].date, bars[MIN_HISTORY].date);
        assert!(result.open_position);
        assert_eq!(result.metrics.trade_count, 0);
        assert!(result.metrics.total_return_pct > 0.0);
    }

    #[test]
    fn rising_then_reversal_exits_on_trend_break() {
        let mut closes: Vec<f64> = (0..100).map(|i| 100.0 + i as f64).collect();
        closes.extend((1..=15).map(|i| 199.0 - 4.0 * i as f64));
        let bars = series("TURN", &closes);
        let result =
            run_backtest("TURN", &bars, &aligned_entry(), &BacktestConfig::default()).unwrap();

        let exit = result.trades.iter().find(|t| t.kind.is_exit()).unwrap();
        assert_eq!(exit.kind, TradeKind::TrendBreak);
        assert!(exit.date > bars[99].date);
    }

    #[test]
    fn crash_bar_drops_rsi_and_exits_same_bar() {
        let bars = flat_then_crash("CRASH", 70, 50.0);
        let set = IndicatorSet::compute("CRASH", &bars, &IndicatorParams::default()).unwrap();
        let before = set.snapshot(69).unwrap();
        let crash = set.snapshot(70).unwrap();
        assert_eq!(before.rsi, 100.0);
        assert_eq!(crash.rsi, 0.0);
        assert!(crash.ma_mid > crash.close);

        let trend_only = run_backtest("CRASH", &bars, &always_enter(), &BacktestConfig::default())
            .unwrap();
        let exit = trend_only.trades.last().unwrap();
        assert_eq!(exit.kind, TradeKind::TrendBreak);
        assert_eq!(exit.date, bars[70].date);
        assert_relative_eq!(exit.return_pct.unwrap(), -50.0);

        let with_stops =
            run_backtest("CRASH", &bars, &active_strategy(), &BacktestConfig::default()).unwrap();
        let exit = with_stops.trades.last().unwrap();
        assert_eq!(exit.kind, TradeKind::StopLoss);
        assert_eq!(exit.date, bars[70].date);
    }

    #[test]
    fn never_entering_keeps_equity_flat() {
        let bars = wave("WAVE", 250);
        let config = BacktestConfig::default();
        let result = run_backtest("WAVE", &bars, &never_enter(), &config).unwrap();

        assert!(result.trades.is_empty());
        assert_eq!(result.metrics.trade_count, 0);
        assert_eq!(result.metrics.win_rate_pct, 0.0);
        assert_eq!(result.metrics.max_drawdown_pct, 0.0);
        assert_eq!(result.equity_curve.len(), 250 - MIN_HISTORY);
        assert!(
            result
                .equity_curve
                .iter()
                .all(|p| p.equity == config.initial_capital)
        );
    }
}

mod scan_ranking {
    use super::*;

    fn port() -> MockDataPort {
        let mut pullback: Vec<f64> = (0..90).map(|i| 100.0 + i as f64 * 0.8).collect();
        pullback.extend((0..10).map(|i| 171.2 - i as f64 * 0.5));
        MockDataPort::new()
            .with_bars("RISE", rising("RISE", 100))
            .with_bars("WAVE", wave("WAVE", 150))
            .with_bars("PULL", series("PULL", &pullback))
            .with_bars("FLAT", series("FLAT", &[100.0; 80]))
            .with_bars("DOWN", series("DOWN", &(0..100).map(|i| 300.0 - i as f64).collect::<Vec<_>>()))
    }

    #[test]
    fn sorted_by_score_then_code() {
        let all = codes(&["WAVE", "FLAT", "RISE", "PULL", "DOWN"]);
        for strategy in Strategy::presets() {
            let report = scan(&port(), &all, &strategy, &ScanOptions::default());
            assert_eq!(report.results.len(), 5);
            for pair in report.results.windows(2) {
                let (a, b) = (&pair[0], &pair[1]);
                assert!(
                    a.score.score > b.score.score
                        || (a.score.score == b.score.score && a.code < b.code),
                    "{} ({}) ranked before {} ({})",
                    a.code,
                    a.score.score,
                    b.code,
                    b.score.score
                );
            }
        }
    }

    #[test]
    fn truncates_to_top_n_but_keeps_statuses() {
        let all = codes(&["WAVE", "FLAT", "RISE", "PULL", "DOWN"]);
        let options = ScanOptions {
            top_n: 2,
            ..ScanOptions::default()
        };
        let report = scan(&port(), &all, &Strategy::knee(), &options);
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.statuses.len(), 5);
        assert_eq!(report.scanned_count(), 5);
    }

    #[test]
    fn worker_count_does_not_change_report() {
        let all = codes(&["WAVE", "FLAT", "RISE", "PULL", "DOWN", "NOPE"]);
        let strategy = Strategy::enhanced();
        let serial = scan(
            &port(),
            &all,
            &strategy,
            &ScanOptions {
                concurrency: 1,
                ..ScanOptions::default()
            },
        );
        let parallel = scan(
            &port(),
            &all,
            &strategy,
            &ScanOptions {
                concurrency: 8,
                ..ScanOptions::default()
            },
        );
        assert_eq!(serial, parallel);
    }

    #[test]
    fn scan_lookback_limits_history() {
        let port = MockDataPort::new().with_bars("LONG", wave("LONG", 400));
        let options = ScanOptions {
            lookback: 70,
            ..ScanOptions::default()
        };
        let report = scan(&port, &codes(&["LONG"]), &Strategy::knee(), &options);
        let result = &report.results[0];
        assert_eq!(result.snapshot.index, 69);
        assert_eq!(result.date, wave("LONG", 400)[399].date);
    }

    #[test]
    fn verified_scan_ranks_by_backtest_return() {
        use trendscan::ports::data_port::DataPort;

        let port = port().with_bars("TINY", rising("TINY", 30));
        let all = codes(&["WAVE", "FLAT", "TINY", "RISE", "PULL", "DOWN"]);
        // enters on every bar, leaves on a mid MA break
        let strategy = always_enter();
        let options = ScanOptions {
            verify: true,
            rank_by: RankBy::Return,
            initial_capital: 5_000_000.0,
            ..ScanOptions::default()
        };
        let report = scan(&port, &all, &strategy, &options);

        assert_eq!(report.results.len(), 5);
        assert_eq!(report.scanned_count(), 5);
        assert!(matches!(
            report.skipped().next(),
            Some(("TINY", SkipReason::InsufficientHistory { .. }))
        ));
        for pair in report.results.windows(2) {
            let a = pair[0].verified_return_pct().unwrap();
            let b = pair[1].verified_return_pct().unwrap();
            assert!(
                a > b || (a == b && pair[0].code < pair[1].code),
                "{} ({a}) ranked before {} ({b})",
                pair[0].code,
                pair[1].code
            );
        }
        assert_eq!(report.results[0].code, "RISE");

        // metrics come from a backtest over exactly the bars that were scored
        for r in &report.results {
            let bars = port.fetch_series(&r.code, options.lookback).unwrap();
            let config = BacktestConfig {
                initial_capital: 5_000_000.0,
                lookback: bars.len(),
            };
            let expected = run_backtest(&r.code, &bars, &strategy, &config).unwrap();
            let metrics = r.verification.as_ref().unwrap();
            assert_eq!(metrics, &expected.metrics);
            assert_eq!(metrics.initial_capital, 5_000_000.0);
            assert!((0.0..=100.0).contains(&metrics.win_rate_pct));
        }
    }

    #[test]
    fn verification_leaves_score_ranking_alone() {
        let all = codes(&["WAVE", "FLAT", "RISE", "PULL", "DOWN"]);
        let strategy = Strategy::knee();
        let plain = scan(&port(), &all, &strategy, &ScanOptions::default());
        let verified = scan(
            &port(),
            &all,
            &strategy,
            &ScanOptions {
                verify: true,
                ..ScanOptions::default()
            },
        );

        assert!(plain.results.iter().all(|r| r.verification.is_none()));
        assert!(verified.results.iter().all(|r| r.verification.is_some()));
        let order = |report: &trendscan::domain::universe::ScanReport| -> Vec<(String, i32, bool)> {
            report
                .results
                .iter()
                .map(|r| (r.code.clone(), r.score.score, r.entry_signal))
                .collect()
        };
        assert_eq!(order(&plain), order(&verified));
    }

    #[test]
    fn verified_scan_is_independent_of_worker_count() {
        let all = codes(&["WAVE", "FLAT", "RISE", "PULL", "DOWN"]);
        let options = |concurrency| ScanOptions {
            concurrency,
            rank_by: RankBy::Return,
            ..ScanOptions::default()
        };
        let strategy = Strategy::enhanced();
        assert_eq!(
            scan(&port(), &all, &strategy, &options(1)),
            scan(&port(), &all, &strategy, &options(8))
        );
    }
}

mod scan_then_backtest {
    use super::*;

    #[test]
    fn top_ranked_code_feeds_backtest() {
        let port = MockDataPort::new()
            .with_bars("RISE", rising("RISE", 300))
            .with_bars("FLAT", series("FLAT", &[100.0; 300]));
        let strategy = Strategy::trend_rider();

        let report = scan(
            &port,
            &codes(&["FLAT", "RISE"]),
            &strategy,
            &ScanOptions::default(),
        );
        let top = &report.results[0].code;
        assert_eq!(top, "RISE");

        let config = BacktestConfig::default();
        let result = backtest(&port, top, &strategy, &config).unwrap();
        assert_eq!(result.code, "RISE");
        assert_eq!(result.strategy, "trend_rider");
        assert_eq!(result.equity_curve.len(), config.lookback - MIN_HISTORY);
    }

    #[test]
    fn backtest_propagates_port_errors() {
        let port = MockDataPort::new().with_error("DOWN", "timeout");
        let err = backtest(&port, "DOWN", &Strategy::knee(), &BacktestConfig::default())
            .unwrap_err();
        assert!(matches!(err, TrendscanError::SourceUnavailable { .. }));

        let err = backtest(&port, "NONE", &Strategy::knee(), &BacktestConfig::default())
            .unwrap_err();
        assert!(matches!(err, TrendscanError::NotFound { .. }));
    }
}

#[cfg(feature = "sqlite")]
mod sqlite_pipeline {
    use super::*;
    use trendscan::adapters::sqlite_adapter::SqliteAdapter;
    use trendscan::ports::data_port::DataPort;

    fn seeded() -> SqliteAdapter {
        let adapter = SqliteAdapter::in_memory().unwrap();
        adapter.initialize_schema().unwrap();
        adapter.insert_bars(&wave("WAVE", 200)).unwrap();
        adapter.insert_bars(&rising("RISE", 120)).unwrap();
        adapter.insert_bars(&rising("TINY", 30)).unwrap();
        adapter
    }

    #[test]
    fn scan_over_sqlite_matches_mock() {
        let adapter = seeded();
        let mock = MockDataPort::new()
            .with_bars("WAVE", wave("WAVE", 200))
            .with_bars("RISE", rising("RISE", 120))
            .with_bars("TINY", rising("TINY", 30));
        let all = adapter.list_symbols().unwrap();
        assert_eq!(all, codes(&["RISE", "TINY", "WAVE"]));

        let strategy = Strategy::trend_rider();
        let from_db = scan(&adapter, &all, &strategy, &ScanOptions::default());
        let from_mock = scan(&mock, &all, &strategy, &ScanOptions::default());
        assert_eq!(from_db, from_mock);
        assert_eq!(from_db.scanned_count(), 2);
    }

    #[test]
    fn backtest_over_sqlite_matches_mock() {
        let adapter = seeded();
        let mock = MockDataPort::new().with_bars("WAVE", wave("WAVE", 200));
        let strategy = active_strategy();
        let config = BacktestConfig::default();

        let from_db = backtest(&adapter, "WAVE", &strategy, &config).unwrap();
        let from_mock = backtest(&mock, "WAVE", &strategy, &config).unwrap();
        assert_eq!(from_db, from_mock);
        assert!(!from_db.trades.is_empty());
    }
}
