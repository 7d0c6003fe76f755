//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{self as backtest_engine, BacktestConfig, BacktestResult};
use crate::domain::config_validation::{validate_run_config, validate_strategy};
use crate::domain::error::TrendscanError;
use crate::domain::strategy::{ExitPolicy, ExitReason, Strategy};
use crate::domain::universe::{self, RankBy, ScanOptions, ScanReport, parse_codes};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

pub const DEFAULT_EXCHANGE_RATE: f64 = 1450.0;
const DEFAULT_DATA_DIR: &str = "./data";

#[derive(Parser, Debug)]
#[command(name = "trendscan", about = "Trend-following stock scanner and backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Score the latest bar of every code and print the ranking
    Scan {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        strategy: Option<PathBuf>,
        /// Comma-separated codes, overriding [scan] codes
        #[arg(long)]
        codes: Option<String>,
        #[arg(long)]
        top: Option<usize>,
        /// Backtest every scored code and report trades, win rate and return
        #[arg(long)]
        verify: bool,
        /// Rank by `score` or by backtest `return` (implies --verify)
        #[arg(long)]
        rank_by: Option<RankBy>,
        /// Write the ranking to this CSV file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Simulate a strategy over one code's history
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        strategy: Option<PathBuf>,
        #[arg(long)]
        code: Option<String>,
        /// Directory for the trade log, equity curve and summary CSVs
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a strategy file
    Validate {
        #[arg(short, long)]
        strategy: PathBuf,
    },
    /// List the built-in strategies
    Presets,
    /// List codes available from the configured data source
    ListSymbols {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Scan {
            config,
            strategy,
            codes,
            top,
            verify,
            rank_by,
            output,
        } => run_scan(
            &config,
            strategy.as_deref(),
            codes.as_deref(),
            ScanFlags {
                top,
                verify,
                rank_by,
            },
            output.as_deref(),
        ),
        Command::Backtest {
            config,
            strategy,
            code,
            output,
        } => run_backtest(&config, strategy.as_deref(), code.as_deref(), output.as_deref()),
        Command::Validate { strategy } => run_validate(&strategy),
        Command::Presets => {
            run_presets();
            Ok(())
        }
        Command::ListSymbols { config } => run_list_symbols(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, TrendscanError> {
    FileConfigAdapter::from_file(path).map_err(|e| TrendscanError::ConfigParse {
        file: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Strategy from `-s <file>` when given, otherwise from the run config's
/// `[strategy]` section. Either way it is validated before use.
pub fn load_strategy(
    run_config: &dyn ConfigPort,
    strategy_path: Option<&Path>,
) -> Result<Strategy, TrendscanError> {
    let strategy = match strategy_path {
        Some(path) => {
            info!(path = %path.display(), "loading strategy");
            Strategy::from_config(&load_config(path)?)?
        }
        None => Strategy::from_config(run_config)?,
    };
    validate_strategy(&strategy)?;
    Ok(strategy)
}

/// `[data] source` selects the adapter: `csv` (default, reads `[data] dir`)
/// or `sqlite` (reads `[data] path`).
pub fn open_data_port(config: &dyn ConfigPort) -> Result<Box<dyn DataPort>, TrendscanError> {
    let source = config
        .get_string("data", "source")
        .unwrap_or_else(|| "csv".to_string());
    match source.trim().to_ascii_lowercase().as_str() {
        "csv" => {
            let dir = config
                .get_string("data", "dir")
                .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());
            Ok(Box::new(CsvAdapter::new(PathBuf::from(dir))))
        }
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            use crate::adapters::sqlite_adapter::SqliteAdapter;
            Ok(Box::new(SqliteAdapter::from_config(config)?))
        }
        other => Err(TrendscanError::ConfigInvalid {
            section: "data".into(),
            key: "source".into(),
            reason: format!("unsupported data source '{}'", other),
        }),
    }
}

fn config_usize(config: &dyn ConfigPort, section: &str, key: &str, default: usize) -> usize {
    usize::try_from(config.get_int(section, key, default as i64)).unwrap_or(default)
}

/// Command-line overrides for the `[scan]` section.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanFlags {
    pub top: Option<usize>,
    pub verify: bool,
    pub rank_by: Option<RankBy>,
}

pub fn build_scan_options(config: &dyn ConfigPort, flags: ScanFlags) -> ScanOptions {
    let defaults = ScanOptions::default();
    ScanOptions {
        top_n: flags
            .top
            .unwrap_or_else(|| config_usize(config, "scan", "top_n", defaults.top_n)),
        lookback: config_usize(config, "scan", "lookback", defaults.lookback),
        concurrency: config_usize(config, "scan", "concurrency", defaults.concurrency),
        verify: flags.verify || config.get_bool("scan", "verify", defaults.verify),
        rank_by: flags.rank_by.unwrap_or_else(|| {
            config
                .get_string("scan", "rank_by")
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(defaults.rank_by)
        }),
        initial_capital: config.get_double(
            "backtest",
            "initial_capital",
            defaults.initial_capital,
        ),
    }
}

pub fn build_backtest_config(config: &dyn ConfigPort) -> BacktestConfig {
    let defaults = BacktestConfig::default();
    BacktestConfig {
        initial_capital: config.get_double("backtest", "initial_capital", defaults.initial_capital),
        lookback: config_usize(config, "backtest", "lookback", defaults.lookback),
    }
}

/// Codes from `--codes`, else `[scan] codes`, else every symbol the data
/// source lists.
pub fn resolve_codes(
    code_override: Option<&str>,
    config: &dyn ConfigPort,
    port: &dyn DataPort,
) -> Result<Vec<String>, TrendscanError> {
    let (raw, key) = match code_override {
        Some(codes) => (Some(codes.to_string()), "--codes"),
        None => (config.get_string("scan", "codes"), "codes"),
    };

    match raw {
        Some(raw) => parse_codes(&raw).map_err(|e| TrendscanError::ConfigInvalid {
            section: "scan".into(),
            key: key.into(),
            reason: e.to_string(),
        }),
        None => port.list_symbols(),
    }
}

/// Domestic tickers carry a `.KS` or `.KQ` suffix; anything else is priced
/// in dollars.
pub fn is_foreign(code: &str) -> bool {
    let upper = code.to_ascii_uppercase();
    !(upper.ends_with(".KS") || upper.ends_with(".KQ"))
}

/// The data source's rate, falling back to `[display] exchange_rate`.
pub fn resolve_exchange_rate(config: &dyn ConfigPort, port: &dyn DataPort) -> f64 {
    match port.fetch_exchange_rate() {
        Ok(rate) => rate,
        Err(e) => {
            let fallback = config.get_double("display", "exchange_rate", DEFAULT_EXCHANGE_RATE);
            info!(reason = %e, fallback, "using configured exchange rate");
            fallback
        }
    }
}

/// Insert thousands separators into a whole number.
pub fn group_thousands(value: f64) -> String {
    let rounded = value.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if rounded < 0.0 {
        format!("-{}", out)
    } else {
        out
    }
}

pub fn format_price(code: &str, price: f64, exchange_rate: Option<f64>) -> String {
    match exchange_rate {
        Some(rate) if is_foreign(code) => {
            format!("${:.2} ({} KRW)", price, group_thousands(price * rate))
        }
        _ if is_foreign(code) => format!("${:.2}", price),
        _ => format!("{} KRW", group_thousands(price)),
    }
}

fn describe_exit(exit: &ExitPolicy) -> String {
    let parts: Vec<String> = exit
        .priority
        .iter()
        .filter(|r| exit.is_enabled(**r))
        .map(|r| match r {
            ExitReason::TakeProfit => format!("take-profit +{}%", exit.take_profit_pct.unwrap_or(0.0)),
            ExitReason::StopLoss => format!("stop-loss -{}%", exit.stop_loss_pct.unwrap_or(0.0)),
            ExitReason::TrendBreak => "trend break (close < mid MA)".to_string(),
        })
        .collect();
    if parts.is_empty() {
        "none".to_string()
    } else {
        parts.join(" > ")
    }
}

fn run_scan(
    config_path: &Path,
    strategy_path: Option<&Path>,
    codes_override: Option<&str>,
    flags: ScanFlags,
    output_path: Option<&Path>,
) -> Result<(), TrendscanError> {
    info!(path = %config_path.display(), "loading config");
    let config = load_config(config_path)?;
    let strategy = load_strategy(&config, strategy_path)?;
    validate_run_config(&config, &strategy)?;
    if flags.top == Some(0) {
        return Err(TrendscanError::ConfigInvalid {
            section: "scan".into(),
            key: "--top".into(),
            reason: "top must be at least 1".into(),
        });
    }

    let port = open_data_port(&config)?;
    let codes = resolve_codes(codes_override, &config, port.as_ref())?;
    if codes.is_empty() {
        return Err(TrendscanError::ConfigMissing {
            section: "scan".into(),
            key: "codes".into(),
        });
    }

    let options = build_scan_options(&config, flags);
    let report = universe::scan(port.as_ref(), &codes, &strategy, &options);

    let exchange_rate = report
        .results
        .iter()
        .any(|r| is_foreign(&r.code))
        .then(|| resolve_exchange_rate(&config, port.as_ref()));
    print_scan(&report, &strategy, &options, exchange_rate);

    if let Some(path) = output_path {
        CsvReportAdapter.write_scan(&report, path)?;
        eprintln!("\nRanking written to: {}", path.display());
    }
    Ok(())
}

fn print_scan(
    report: &ScanReport,
    strategy: &Strategy,
    options: &ScanOptions,
    exchange_rate: Option<f64>,
) {
    println!(
        "=== {} scan: {} of {} codes scored, ranked by {} ===",
        strategy.name,
        report.scanned_count(),
        report.statuses.len(),
        options.rank_by
    );
    if let Some(rate) = exchange_rate {
        println!("USD/KRW: {:.2}", rate);
    }

    if report.results.is_empty() {
        println!("No instruments could be scored.");
    } else {
        println!(
            "{:>4}  {:<12} {:>30} {:>7} {:>6}  {:<12} {:>6}  {:<8} {:>12}  {:<5}",
            "Rank", "Code", "Price", "Chg%", "Score", "Tier", "RSI", "Breakout", "Stop", "Entry"
        );
        for (rank, r) in report.results.iter().enumerate() {
            println!(
                "{:>4}  {:<12} {:>30} {:>+7.2} {:>6}  {:<12} {:>6.1}  {:<8} {:>12}  {:<5}",
                rank + 1,
                r.code,
                format_price(&r.code, r.close, exchange_rate),
                r.change_pct,
                r.score.score,
                r.score.label,
                r.rsi(),
                if r.is_breakout { "yes" } else { "no" },
                format!("{:.2}", r.stop_level),
                if r.entry_signal { "BUY" } else { "-" },
            );
            if let Some(m) = &r.verification {
                println!(
                    "        backtest: {} trades, win rate {:.1}%, return {:+.2}%, max drawdown -{:.2}%",
                    m.trade_count, m.win_rate_pct, m.total_return_pct, m.max_drawdown_pct
                );
            }
            for reason in &r.score.reasons {
                println!("        {:+4}  {}", reason.points, reason.reason);
            }
            if let Some(date) = r.volume_spike {
                println!("        volume spike on {}", date);
            }
        }
    }

    let skipped: Vec<_> = report.skipped().collect();
    if !skipped.is_empty() {
        println!("\nSkipped:");
        for (code, reason) in skipped {
            println!("  {}: {}", code, reason);
        }
    }
}

fn run_backtest(
    config_path: &Path,
    strategy_path: Option<&Path>,
    code_override: Option<&str>,
    output_dir: Option<&Path>,
) -> Result<(), TrendscanError> {
    info!(path = %config_path.display(), "loading config");
    let config = load_config(config_path)?;
    let strategy = load_strategy(&config, strategy_path)?;
    validate_run_config(&config, &strategy)?;

    let code = match code_override {
        Some(code) => code.trim().to_uppercase(),
        None => config
            .get_string("backtest", "code")
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| TrendscanError::ConfigMissing {
                section: "backtest".into(),
                key: "code".into(),
            })?,
    };

    let port = open_data_port(&config)?;
    let bt_config = build_backtest_config(&config);
    let result = backtest_engine::backtest(port.as_ref(), &code, &strategy, &bt_config)?;

    let exchange_rate = is_foreign(&code).then(|| resolve_exchange_rate(&config, port.as_ref()));
    print_backtest(&result, &strategy, exchange_rate);

    if let Some(dir) = output_dir {
        CsvReportAdapter.write_backtest(&result, &strategy, dir)?;
        eprintln!("\nReports written to: {}", dir.display());
    }
    Ok(())
}

fn print_backtest(result: &BacktestResult, strategy: &Strategy, exchange_rate: Option<f64>) {
    let m = &result.metrics;
    println!("=== Backtest: {} / {} ===", result.code, strategy.name);
    println!("Entry:            {}", strategy.entry);
    println!("Exits:            {}", describe_exit(&strategy.exit));
    println!("Initial Capital:  {}", group_thousands(m.initial_capital));
    println!("Final Equity:     {}", group_thousands(m.final_equity));
    println!("Total Return:     {:+.2}%", m.total_return_pct);
    println!("Win Rate:         {:.1}%", m.win_rate_pct);
    println!("Trades:           {} ({} won, {} lost)", m.trade_count, m.wins, m.losses);
    println!("Avg Trade:        {:+.2}%", m.avg_return_pct);
    println!("Max Drawdown:     -{:.2}%", m.max_drawdown_pct);
    if result.open_position {
        println!("Position:         still open, marked to last close");
    }
    println!("Verdict:          {}", m.verdict);

    if result.trades.is_empty() {
        println!("\nNo trades: the entry rule never fired.");
        return;
    }
    println!("\n=== Trade Log ===");
    for trade in &result.trades {
        let ret = trade
            .return_pct
            .map(|r| format!("{:+.2}%", r))
            .unwrap_or_default();
        println!(
            "  {}  {:<12} {:>30}  {}",
            trade.date,
            trade.kind.to_string(),
            format_price(&result.code, trade.price, exchange_rate),
            ret
        );
    }
}

fn run_validate(strategy_path: &Path) -> Result<(), TrendscanError> {
    eprintln!("Validating strategy: {}", strategy_path.display());
    let config = load_config(strategy_path)?;
    let strategy = Strategy::from_config(&config)?;
    validate_strategy(&strategy)?;

    println!("Strategy:     {}", strategy.name);
    if !strategy.description.is_empty() {
        println!("Description:  {}", strategy.description);
    }
    println!("Entry:        {}", strategy.entry);
    println!("Exits:        {}", describe_exit(&strategy.exit));
    println!("Min history:  {} bars", strategy.min_history());
    println!("\nScoring (max {}):", strategy.scoring.max_score());
    for group in &strategy.scoring.groups {
        println!("  [{}]", group.name);
        for rule in &group.rules {
            println!("    {:+4}  {}  {}", rule.points, rule.reason, rule.rule);
        }
    }
    for tier in strategy.scoring.tiers.tiers() {
        println!("  >= {:<4} {}", tier.min_score, tier.label);
    }
    println!("  else    {}", strategy.scoring.tiers.floor());

    eprintln!("\nStrategy configuration is valid.");
    Ok(())
}

fn run_presets() {
    for strategy in Strategy::presets() {
        println!("{}", strategy.name);
        println!("  {}", strategy.description);
        println!("  entry: {}", strategy.entry);
        println!("  exits: {}", describe_exit(&strategy.exit));
    }
}

fn run_list_symbols(config_path: &Path) -> Result<(), TrendscanError> {
    let config = load_config(config_path)?;
    let port = open_data_port(&config)?;
    let symbols = port.list_symbols()?;

    if symbols.is_empty() {
        warn!("no symbols found");
    }
    for symbol in &symbols {
        println!("{}", symbol);
    }
    eprintln!("{} symbols found", symbols.len());
    Ok(())
}
