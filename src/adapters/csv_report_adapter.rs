//! CSV report writer.
//!
//! A backtest writes three files into the output directory:
//! `<CODE>_trades.csv`, `<CODE>_equity.csv` and `<CODE>_summary.csv`.
//! A scan writes its ranking to a single CSV file.

use std::fs;
use std::path::Path;

use csv::Writer;
use tracing::info;

use crate::domain::backtest::BacktestResult;
use crate::domain::error::TrendscanError;
use crate::domain::strategy::Strategy;
use crate::domain::universe::ScanReport;
use crate::ports::report_port::ReportPort;

fn io_error(e: csv::Error) -> TrendscanError {
    TrendscanError::Io(std::io::Error::other(e))
}

fn fmt_f64(value: f64, decimals: usize) -> String {
    format!("{:.*}", decimals, value)
}

pub struct CsvReportAdapter;

impl CsvReportAdapter {
    fn write_trades(result: &BacktestResult, dir: &Path) -> Result<(), TrendscanError> {
        let path = dir.join(format!("{}_trades.csv", result.code));
        let mut wtr = Writer::from_path(&path).map_err(io_error)?;
        wtr.write_record(["date", "kind", "price", "shares", "return_pct"])
            .map_err(io_error)?;
        for trade in &result.trades {
            wtr.write_record([
                trade.date.to_string(),
                trade.kind.to_string(),
                fmt_f64(trade.price, 4),
                fmt_f64(trade.shares, 6),
                trade
                    .return_pct
                    .map(|r| fmt_f64(r, 4))
                    .unwrap_or_default(),
            ])
            .map_err(io_error)?;
        }
        wtr.flush()?;
        Ok(())
    }

    fn write_equity(result: &BacktestResult, dir: &Path) -> Result<(), TrendscanError> {
        let path = dir.join(format!("{}_equity.csv", result.code));
        let mut wtr = Writer::from_path(&path).map_err(io_error)?;
        wtr.write_record(["date", "equity"]).map_err(io_error)?;
        for point in &result.equity_curve {
            wtr.write_record([point.date.to_string(), fmt_f64(point.equity, 2)])
                .map_err(io_error)?;
        }
        wtr.flush()?;
        Ok(())
    }

    fn write_summary(
        result: &BacktestResult,
        strategy: &Strategy,
        dir: &Path,
    ) -> Result<(), TrendscanError> {
        let path = dir.join(format!("{}_summary.csv", result.code));
        let m = &result.metrics;
        let mut wtr = Writer::from_path(&path).map_err(io_error)?;
        wtr.write_record(["field", "value"]).map_err(io_error)?;
        let rows = [
            ("code", result.code.clone()),
            ("strategy", strategy.name.clone()),
            ("entry", strategy.entry.to_string()),
            ("initial_capital", fmt_f64(m.initial_capital, 2)),
            ("final_equity", fmt_f64(m.final_equity, 2)),
            ("total_return_pct", fmt_f64(m.total_return_pct, 4)),
            ("trade_count", m.trade_count.to_string()),
            ("win_rate_pct", fmt_f64(m.win_rate_pct, 2)),
            ("avg_return_pct", fmt_f64(m.avg_return_pct, 4)),
            ("max_drawdown_pct", fmt_f64(m.max_drawdown_pct, 4)),
            ("open_position", result.open_position.to_string()),
            ("verdict", m.verdict.to_string()),
        ];
        for (field, value) in rows {
            wtr.write_record([field, value.as_str()]).map_err(io_error)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

impl ReportPort for CsvReportAdapter {
    fn write_backtest(
        &self,
        result: &BacktestResult,
        strategy: &Strategy,
        output_dir: &Path,
    ) -> Result<(), TrendscanError> {
        fs::create_dir_all(output_dir)?;
        Self::write_trades(result, output_dir)?;
        Self::write_equity(result, output_dir)?;
        Self::write_summary(result, strategy, output_dir)?;
        info!(code = %result.code, dir = %output_dir.display(), "backtest report written");
        Ok(())
    }

    fn write_scan(&self, report: &ScanReport, output_path: &Path) -> Result<(), TrendscanError> {
        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut wtr = Writer::from_path(output_path).map_err(io_error)?;
        wtr.write_record([
            "rank",
            "code",
            "date",
            "close",
            "change_pct",
            "score",
            "label",
            "rsi",
            "disparity",
            "breakout",
            "stop_level",
            "entry_signal",
            "volume_spike",
            "reasons",
            "trades",
            "win_rate_pct",
            "total_return_pct",
        ])
        .map_err(io_error)?;

        for (rank, r) in report.results.iter().enumerate() {
            let reasons: Vec<String> = r
                .score
                .reasons
                .iter()
                .map(|reason| format!("{} ({:+})", reason.reason, reason.points))
                .collect();
            let verified = r.verification.as_ref();
            wtr.write_record([
                (rank + 1).to_string(),
                r.code.clone(),
                r.date.to_string(),
                fmt_f64(r.close, 4),
                fmt_f64(r.change_pct, 2),
                r.score.score.to_string(),
                r.score.label.clone(),
                fmt_f64(r.rsi(), 2),
                fmt_f64(r.disparity(), 2),
                r.is_breakout.to_string(),
                fmt_f64(r.stop_level, 4),
                r.entry_signal.to_string(),
                r.volume_spike.map(|d| d.to_string()).unwrap_or_default(),
                reasons.join("; "),
                verified.map(|m| m.trade_count.to_string()).unwrap_or_default(),
                verified.map(|m| fmt_f64(m.win_rate_pct, 2)).unwrap_or_default(),
                verified.map(|m| fmt_f64(m.total_return_pct, 2)).unwrap_or_default(),
            ])
            .map_err(io_error)?;
        }
        wtr.flush()?;
        info!(path = %output_path.display(), rows = report.results.len(), "scan report written");
        Ok(())
    }
}
