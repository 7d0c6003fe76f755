//! Configuration validation.
//!
//! Validates the run configuration and a loaded strategy before any data is
//! fetched, so a bad file fails fast with the offending section and key.

use crate::domain::backtest::DEFAULT_BACKTEST_LOOKBACK;
use crate::domain::error::TrendscanError;
use crate::domain::strategy::{ExitReason, Strategy};
use crate::domain::universe::{DEFAULT_SCAN_LOOKBACK, RankBy};
use crate::ports::config_port::ConfigPort;

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> TrendscanError {
    TrendscanError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

/// Check the `[scan]`, `[backtest]` and `[display]` sections against the
/// strategy that will run with them.
pub fn validate_run_config(
    config: &dyn ConfigPort,
    strategy: &Strategy,
) -> Result<(), TrendscanError> {
    validate_initial_capital(config)?;
    validate_at_least_one(config, "scan", "top_n")?;
    validate_at_least_one(config, "scan", "concurrency")?;
    validate_lookback(config, "scan", DEFAULT_SCAN_LOOKBACK, strategy)?;
    validate_lookback(config, "backtest", DEFAULT_BACKTEST_LOOKBACK, strategy)?;
    validate_exchange_rate(config)?;
    validate_verification(config)?;
    Ok(())
}

/// Check a strategy's indicator windows, exit policy and tier table.
pub fn validate_strategy(strategy: &Strategy) -> Result<(), TrendscanError> {
    validate_windows(strategy)?;
    validate_exit_policy(strategy)?;
    strategy.scoring.tiers.validate()?;
    Ok(())
}

fn number(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<f64>, TrendscanError> {
    config
        .try_double(section, key)
        .map_err(|raw| invalid(section, key, format!("'{}' is not a number", raw)))
}

fn integer(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<i64>, TrendscanError> {
    config
        .try_int(section, key)
        .map_err(|raw| invalid(section, key, format!("'{}' is not an integer", raw)))
}

fn validate_initial_capital(config: &dyn ConfigPort) -> Result<(), TrendscanError> {
    let value = number(config, "backtest", "initial_capital")?.unwrap_or(1.0);
    if value <= 0.0 || !value.is_finite() {
        return Err(invalid(
            "backtest",
            "initial_capital",
            "initial_capital must be positive",
        ));
    }
    Ok(())
}

fn validate_at_least_one(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<(), TrendscanError> {
    let value = integer(config, section, key)?.unwrap_or(1);
    if value < 1 {
        return Err(invalid(section, key, format!("{key} must be at least 1")));
    }
    Ok(())
}

/// The effective lookback (configured, else `default`) must cover the
/// strategy's minimum history.
fn validate_lookback(
    config: &dyn ConfigPort,
    section: &str,
    default: usize,
    strategy: &Strategy,
) -> Result<(), TrendscanError> {
    let minimum = strategy.min_history();
    let value = match integer(config, section, "lookback")? {
        Some(value) => value,
        None => i64::try_from(default).unwrap_or(i64::MAX),
    };
    if value < minimum as i64 {
        return Err(invalid(
            section,
            "lookback",
            format!(
                "lookback {} is shorter than the {} bars strategy '{}' needs",
                value, minimum, strategy.name
            ),
        ));
    }
    Ok(())
}

fn validate_exchange_rate(config: &dyn ConfigPort) -> Result<(), TrendscanError> {
    let value = number(config, "display", "exchange_rate")?.unwrap_or(1.0);
    if value <= 0.0 || !value.is_finite() {
        return Err(invalid(
            "display",
            "exchange_rate",
            "exchange_rate must be positive",
        ));
    }
    Ok(())
}

fn validate_verification(config: &dyn ConfigPort) -> Result<(), TrendscanError> {
    config
        .try_bool("scan", "verify")
        .map_err(|raw| invalid("scan", "verify", format!("'{}' is not a boolean", raw)))?;
    if let Some(raw) = config.get_string("scan", "rank_by") {
        raw.parse::<RankBy>()
            .map_err(|e| invalid("scan", "rank_by", e))?;
    }
    Ok(())
}

fn validate_windows(strategy: &Strategy) -> Result<(), TrendscanError> {
    let p = &strategy.params;
    for (key, value) in [
        ("ma_short", p.ma_short),
        ("ma_mid", p.ma_mid),
        ("ma_long", p.ma_long),
        ("bollinger_period", p.bollinger_period),
        ("rsi_period", p.rsi_period),
        ("volume_period", p.volume_period),
    ] {
        if value == 0 {
            return Err(invalid("indicators", key, "window must be positive"));
        }
    }
    if !(p.ma_short < p.ma_mid && p.ma_mid < p.ma_long) {
        return Err(invalid(
            "indicators",
            "ma_mid",
            format!(
                "moving average windows must increase: {} < {} < {}",
                p.ma_short, p.ma_mid, p.ma_long
            ),
        ));
    }
    if p.bollinger_mult <= 0.0 || !p.bollinger_mult.is_finite() {
        return Err(invalid(
            "indicators",
            "bollinger_mult",
            "bollinger_mult must be positive",
        ));
    }
    Ok(())
}

fn validate_exit_policy(strategy: &Strategy) -> Result<(), TrendscanError> {
    let exit = &strategy.exit;
    for (key, pct) in [
        ("take_profit", exit.take_profit_pct),
        ("stop_loss", exit.stop_loss_pct),
    ] {
        if let Some(value) = pct {
            if value <= 0.0 || !value.is_finite() {
                return Err(invalid(
                    "strategy",
                    key,
                    format!("{key} must be a positive percentage"),
                ));
            }
        }
    }
    if let Some(pct) = exit.stop_loss_pct {
        if pct >= 100.0 {
            return Err(invalid("strategy", "stop_loss", "stop_loss must be below 100%"));
        }
    }
    for (i, reason) in exit.priority.iter().enumerate() {
        if exit.priority[..i].contains(reason) {
            return Err(invalid(
                "strategy",
                "exit_priority",
                format!("'{}' listed twice", reason),
            ));
        }
    }
    if let Some(missing) = ExitReason::ALL
        .into_iter()
        .find(|r| exit.is_enabled(*r) && !exit.priority.contains(r))
    {
        return Err(invalid(
            "strategy",
            "exit_priority",
            format!("'{}' is armed but missing from the priority order", missing),
        ));
    }
    Ok(())
}
