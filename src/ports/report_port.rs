//! Report generation port trait.

use std::path::Path;

use crate::domain::backtest::BacktestResult;
use crate::domain::error::TrendscanError;
use crate::domain::strategy::Strategy;
use crate::domain::universe::ScanReport;

/// Port for persisting scan rankings and backtest results.
pub trait ReportPort {
    fn write_backtest(
        &self,
        result: &BacktestResult,
        strategy: &Strategy,
        output_dir: &Path,
    ) -> Result<(), TrendscanError>;

    fn write_scan(&self, report: &ScanReport, output_path: &Path) -> Result<(), TrendscanError>;
}
