//! Configuration validation.
//!
//! Validates config fields before any run so a bad file fails fast with the
//! offending section and key.

use crate::domain::error::PmTraderError;
use crate::domain::filter::FilterOption;
use crate::domain::runner::RebalanceMode;
use crate::domain::universe::parse_tickers;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Upper bound on lookback and reevaluation spans, in days.
pub const MAX_SPAN_DAYS: i64 = 36_500;

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> PmTraderError {
    PmTraderError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn missing(section: &str, key: &str) -> PmTraderError {
    PmTraderError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    }
}

/// `[data]` and `[model]`, needed by every run.
pub fn validate_model_config(config: &dyn ConfigPort) -> Result<(), PmTraderError> {
    parse_date(config, "model", "start_date")?;
    validate_run_config(config)
}

/// `[data]` and `[model]` without a start date; comparisons pick their own.
pub fn validate_run_config(config: &dyn ConfigPort) -> Result<(), PmTraderError> {
    validate_price_dir(config)?;
    validate_duration(config, "model")?;
    validate_total_funds(config)?;
    validate_tranches(config)?;
    validate_costs(config)?;
    Ok(())
}

pub fn validate_momentum_config(config: &dyn ConfigPort) -> Result<(), PmTraderError> {
    validate_tickers(config)?;
    for key in ["long_history_days", "reevaluation_interval", "stock_count"] {
        if config.get_int("momentum", key, 1) < 1 {
            return Err(invalid("momentum", key, format!("{} must be at least 1", key)));
        }
    }
    for key in ["long_history_days", "reevaluation_interval"] {
        if config.get_int("momentum", key, 1) > MAX_SPAN_DAYS {
            return Err(invalid(
                "momentum",
                key,
                format!("{} must be at most {} days", key, MAX_SPAN_DAYS),
            ));
        }
    }
    filter_option(config)?;
    if config.get_double("momentum", "max_volatility", 0.1) < 0.0 {
        return Err(invalid(
            "momentum",
            "max_volatility",
            "max_volatility must be non-negative",
        ));
    }
    if config.get_double("momentum", "min_percent_gain", 0.05) <= -1.0 {
        return Err(invalid(
            "momentum",
            "min_percent_gain",
            "min_percent_gain must be greater than -1",
        ));
    }
    rebalance_mode(config)?;
    Ok(())
}

pub fn validate_compare_config(config: &dyn ConfigPort) -> Result<(), PmTraderError> {
    let start = config.get_int("compare", "start_year", 0);
    let end = config.get_int("compare", "end_year", 0);
    if start <= 0 {
        return Err(missing("compare", "start_year"));
    }
    if end <= start {
        return Err(invalid(
            "compare",
            "end_year",
            "end_year must be after start_year",
        ));
    }
    validate_duration(config, "compare")?;
    if matches!(config.get_string("compare", "baseline_ticker"), Some(t) if t.trim().is_empty()) {
        return Err(invalid(
            "compare",
            "baseline_ticker",
            "baseline_ticker must not be empty",
        ));
    }
    Ok(())
}

fn validate_price_dir(config: &dyn ConfigPort) -> Result<(), PmTraderError> {
    config.require_string("data", "price_dir").map(|_| ())
}

pub fn parse_date(config: &dyn ConfigPort, section: &str, key: &str) -> Result<NaiveDate, PmTraderError> {
    let value = config.require_string(section, key)?;
    NaiveDate::parse_from_str(&value, DATE_FORMAT)
        .map_err(|_| invalid(section, key, format!("invalid {} format, expected YYYY-MM-DD", key)))
}

fn validate_duration(config: &dyn ConfigPort, section: &str) -> Result<(), PmTraderError> {
    let years = config.get_int(section, "duration_years", 1);
    if !(1..=200).contains(&years) {
        return Err(invalid(
            section,
            "duration_years",
            "duration_years must be between 1 and 200",
        ));
    }
    Ok(())
}

fn validate_total_funds(config: &dyn ConfigPort) -> Result<(), PmTraderError> {
    if config.get_double("model", "total_funds", 30_000.0) <= 0.0 {
        return Err(invalid("model", "total_funds", "total_funds must be positive"));
    }
    Ok(())
}

fn validate_tranches(config: &dyn ConfigPort) -> Result<(), PmTraderError> {
    let count = config.get_string("model", "tranche_count");
    let size = config.get_string("model", "tranche_size");
    if count.is_some() && size.is_some() {
        return Err(invalid(
            "model",
            "tranche_size",
            "set tranche_count or tranche_size, not both",
        ));
    }
    if count.is_some() && config.get_int("model", "tranche_count", 0) < 1 {
        return Err(invalid(
            "model",
            "tranche_count",
            "tranche_count must be at least 1",
        ));
    }
    if size.is_some() && config.get_double("model", "tranche_size", 0.0) <= 0.0 {
        return Err(invalid("model", "tranche_size", "tranche_size must be positive"));
    }
    if config.get_int("model", "order_expiry_days", 10) < 1 {
        return Err(invalid(
            "model",
            "order_expiry_days",
            "order_expiry_days must be at least 1",
        ));
    }
    Ok(())
}

fn validate_costs(config: &dyn ConfigPort) -> Result<(), PmTraderError> {
    for key in ["commission_per_trade", "commission_pct", "slippage_pct"] {
        if config.get_double("model", key, 0.0) < 0.0 {
            return Err(invalid("model", key, format!("{} must be non-negative", key)));
        }
    }
    Ok(())
}

fn validate_tickers(config: &dyn ConfigPort) -> Result<(), PmTraderError> {
    let tickers = config.require_string("momentum", "tickers")?;
    if tickers == "*" {
        return Ok(());
    }
    parse_tickers(&tickers).map_err(|e| invalid("momentum", "tickers", e.to_string()))?;
    Ok(())
}

pub fn filter_option(config: &dyn ConfigPort) -> Result<FilterOption, PmTraderError> {
    let code = config.get_int("momentum", "filter_option", 3);
    u8::try_from(code)
        .ok()
        .and_then(FilterOption::from_code)
        .ok_or_else(|| invalid("momentum", "filter_option", "filter_option must be 0, 1, 2 or 3"))
}

pub fn rebalance_mode(config: &dyn ConfigPort) -> Result<RebalanceMode, PmTraderError> {
    config
        .get_string("momentum", "rebalance")
        .map(|s| {
            s.parse::<RebalanceMode>()
                .map_err(|e| invalid("momentum", "rebalance", e))
        })
        .unwrap_or(Ok(RebalanceMode::Liquidate))
}
