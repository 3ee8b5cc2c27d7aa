//! CLI definition and dispatch.

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::adapters::csv_adapter::CsvPriceAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::config_validation::{
    filter_option, parse_date, rebalance_mode, validate_compare_config, validate_model_config,
    validate_momentum_config, validate_run_config,
};
use crate::domain::error::PmTraderError;
use crate::domain::execution::ExecutionConfig;
use crate::domain::filter::FilterThresholds;
use crate::domain::runner::{
    self, CompareSettings, ComparisonRow, Contender, DEFAULT_PORTFOLIO_SIZE,
    DEFAULT_STARTING_TICKER, MomentumStrategy, RunResult, RunSettings,
};
use crate::domain::stock_picker::{BlendedQuery, MomentumQuery, RankedCandidate};
use crate::domain::trading_model::DEFAULT_ORDER_EXPIRY_DAYS;
use crate::domain::tranche::TrancheSizing;
use crate::domain::universe::{parse_tickers, screen_universe};
use crate::ports::config_port::ConfigPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "pmtrader", about = "Price momentum backtester")]
pub struct Cli {
    /// Log every order event and raise the default log level to debug
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Buy and hold one ticker, or every [momentum] ticker in equal tranches
    BuyHold {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        ticker: Option<String>,
        /// Hold the whole [momentum] ticker list instead of one ticker
        #[arg(long, conflicts_with = "ticker")]
        list: bool,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run the periodic momentum strategy
    Momentum {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        blended: bool,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Rank the ticker universe for one date
    Picks {
        #[arg(short, long)]
        config: PathBuf,
        /// Defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        blended: bool,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Compare momentum against buy-and-hold over successive start dates
    Compare {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        blended: bool,
        /// Run trials one after another instead of in parallel
        #[arg(long)]
        sequential: bool,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

/// Install the stderr log subscriber. `RUST_LOG` wins over `verbose`.
pub fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

pub fn run(cli: Cli) -> ExitCode {
    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

/// Dispatch one command. Results go to stdout, diagnostics to the log.
pub fn execute(cli: Cli) -> Result<(), PmTraderError> {
    let verbose = cli.verbose;
    match cli.command {
        Command::BuyHold {
            config,
            ticker,
            list,
            output,
        } => run_buy_hold(&config, ticker.as_deref(), list, output.as_deref(), verbose),
        Command::Momentum {
            config,
            blended,
            output,
        } => run_momentum(&config, blended, output.as_deref(), verbose),
        Command::Picks {
            config,
            date,
            blended,
            output,
        } => run_picks(&config, date, blended, output.as_deref()),
        Command::Compare {
            config,
            blended,
            sequential,
            output,
        } => run_compare(&config, blended, !sequential, output.as_deref(), verbose),
        Command::Validate { config } => run_validate(&config),
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, PmTraderError> {
    info!(path = %path.display(), "Loading config");
    FileConfigAdapter::from_file(path)
}

fn price_source(config: &dyn ConfigPort) -> Result<CsvPriceAdapter, PmTraderError> {
    let dir = config.require_string("data", "price_dir")?;
    Ok(CsvPriceAdapter::new(PathBuf::from(dir)))
}

fn to_u32(config: &dyn ConfigPort, section: &str, key: &str, default: u32) -> u32 {
    u32::try_from(config.get_int(section, key, i64::from(default))).unwrap_or(default)
}

pub fn build_execution_config(config: &dyn ConfigPort) -> ExecutionConfig {
    ExecutionConfig {
        commission_per_trade: config.get_double("model", "commission_per_trade", 0.0),
        commission_pct: config.get_double("model", "commission_pct", 0.0),
        slippage_pct: config.get_double("model", "slippage_pct", 0.0),
    }
}

/// `None` lets each driver pick its own tranche split.
pub fn build_tranche_sizing(config: &dyn ConfigPort) -> Option<TrancheSizing> {
    if config.get_string("model", "tranche_count").is_some() {
        let count = config.get_int("model", "tranche_count", 1).max(1);
        return Some(TrancheSizing::Count(count as usize));
    }
    if config.get_string("model", "tranche_size").is_some() {
        return Some(TrancheSizing::Size(
            config.get_double("model", "tranche_size", DEFAULT_PORTFOLIO_SIZE),
        ));
    }
    None
}

pub fn build_run_settings(config: &dyn ConfigPort, start_date: NaiveDate) -> RunSettings {
    let mut settings = RunSettings::new(start_date, to_u32(config, "model", "duration_years", 1));
    settings.total_funds = config.get_double("model", "total_funds", DEFAULT_PORTFOLIO_SIZE);
    settings.execution = build_execution_config(config);
    settings.order_expiry_days =
        to_u32(config, "model", "order_expiry_days", DEFAULT_ORDER_EXPIRY_DAYS);
    settings.tranche_sizing = build_tranche_sizing(config);
    settings.verbose = config.get_bool("model", "verbose", false);
    settings
}

pub fn starting_ticker(config: &dyn ConfigPort) -> String {
    config
        .get_string("model", "starting_ticker")
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_STARTING_TICKER.to_string())
}

/// Tickers from `[momentum] tickers`. `*` means every price file in the data
/// directory except the starting ticker, which only supplies the calendar.
pub fn resolve_tickers(
    config: &dyn ConfigPort,
    prices: &CsvPriceAdapter,
) -> Result<Vec<String>, PmTraderError> {
    let raw = config.require_string("momentum", "tickers")?;
    if raw == "*" {
        let skip = starting_ticker(config);
        let tickers: Vec<String> = prices
            .list_tickers()?
            .into_iter()
            .filter(|t| *t != skip)
            .collect();
        info!(count = tickers.len(), "Using every ticker in the data directory");
        return Ok(tickers);
    }

    parse_tickers(&raw).map_err(|e| PmTraderError::ConfigInvalid {
        section: "momentum".into(),
        key: "tickers".into(),
        reason: e.to_string(),
    })
}

pub fn build_momentum_strategy(
    config: &dyn ConfigPort,
    tickers: Vec<String>,
    force_blended: bool,
) -> Result<MomentumStrategy, PmTraderError> {
    let mut strategy = MomentumStrategy::new(tickers);
    strategy.starting_ticker = starting_ticker(config);
    strategy.long_history_days = to_u32(
        config,
        "momentum",
        "long_history_days",
        strategy.long_history_days,
    );
    strategy.reevaluation_interval = to_u32(
        config,
        "momentum",
        "reevaluation_interval",
        strategy.reevaluation_interval,
    );
    strategy.stock_count = config
        .get_int("momentum", "stock_count", strategy.stock_count as i64)
        .max(1) as usize;
    strategy.filter = filter_option(config)?;
    let defaults = FilterThresholds::default();
    strategy.thresholds = FilterThresholds {
        min_percent_gain: config.get_double(
            "momentum",
            "min_percent_gain",
            defaults.min_percent_gain,
        ),
        max_volatility: config.get_double("momentum", "max_volatility", defaults.max_volatility),
    };
    strategy.blended = force_blended || config.get_bool("momentum", "blended", false);
    strategy.rebalance = rebalance_mode(config)?;
    Ok(strategy)
}

pub fn build_compare_settings(
    config: &dyn ConfigPort,
    parallel: bool,
) -> Result<CompareSettings, PmTraderError> {
    let start_year = config.get_int("compare", "start_year", 0) as i32;
    let end_year = config.get_int("compare", "end_year", 0) as i32;
    let duration_years = to_u32(config, "compare", "duration_years", 1);
    let template_start =
        NaiveDate::from_ymd_opt(start_year, 1, 2).ok_or_else(|| PmTraderError::ConfigInvalid {
            section: "compare".into(),
            key: "start_year".into(),
            reason: format!("{} is not a valid year", start_year),
        })?;
    Ok(CompareSettings {
        start_year,
        end_year,
        duration_years,
        run: build_run_settings(config, template_start),
        parallel,
    })
}

fn print_result(result: &RunResult, funds: f64) {
    if !result.ready {
        println!("{}: no price data for the starting ticker", result.model_name);
        return;
    }
    let m = &result.metrics;
    println!("Model:             {}", result.model_name);
    println!("Ending value:      {:.2}", result.ending_value);
    println!("Gain:              {:.2}%", result.gain(funds) * 100.0);
    println!("Annualized return: {:.2}%", m.annualized_return * 100.0);
    println!("Sharpe ratio:      {:.3}", m.sharpe_ratio);
    println!(
        "Max drawdown:      {:.2}% ({} days)",
        m.max_drawdown * 100.0,
        m.max_drawdown_duration
    );
    println!(
        "Trades:            {} ({} won, {} lost, {:.1}% win rate)",
        m.trade_count,
        m.trades_won,
        m.trades_lost,
        m.win_rate * 100.0
    );
}

fn print_picks(date: NaiveDate, picks: &[RankedCandidate]) {
    println!("Picks for {}", date);
    if picks.is_empty() {
        println!("  (no ticker qualifies)");
        return;
    }
    println!(
        "  {:>4}  {:<8} {:>10} {:>10} {:>10} {:>8}  {}",
        "rank", "ticker", "long", "short", "vol", "points", "filter"
    );
    for (i, c) in picks.iter().enumerate() {
        println!(
            "  {:>4}  {:<8} {:>9.2}% {:>9.2}% {:>10.4} {:>8.3}  {}",
            i + 1,
            c.ticker,
            c.long_return * 100.0,
            c.short_return * 100.0,
            c.volatility,
            c.point_value,
            c.filter
        );
    }
}

fn print_comparison(baseline: &str, challenger: &str, rows: &[ComparisonRow]) {
    println!("{} vs {}", challenger, baseline);
    println!(
        "  {:<10} {:>5} {:>14} {:>14} {:>9} {:>9} {:>9}",
        "start", "years", "baseline", "challenger", "b gain", "c gain", "diff"
    );
    for row in rows {
        println!(
            "  {:<10} {:>5} {:>14.2} {:>14.2} {:>8.2}% {:>8.2}% {:>8.2}%",
            row.start_date,
            row.duration_years,
            row.baseline_ending_value,
            row.challenger_ending_value,
            row.baseline_gain * 100.0,
            row.challenger_gain * 100.0,
            row.difference * 100.0
        );
    }
    let wins = rows.iter().filter(|r| r.difference > 0.0).count();
    println!("  challenger ahead in {} of {} trials", wins, rows.len());
}

fn run_buy_hold(
    config_path: &Path,
    ticker: Option<&str>,
    list: bool,
    output: Option<&Path>,
    verbose: bool,
) -> Result<(), PmTraderError> {
    let config = load_config(config_path)?;
    validate_model_config(&config)?;
    let prices = price_source(&config)?;
    let mut settings = build_run_settings(&config, parse_date(&config, "model", "start_date")?);
    settings.verbose |= verbose;

    let result = if list {
        let tickers = resolve_tickers(&config, &prices)?;
        runner::run_buy_hold_list(&prices, &tickers, &settings)?
    } else {
        let ticker = ticker
            .map(|t| t.trim().to_uppercase())
            .unwrap_or_else(|| starting_ticker(&config));
        runner::run_buy_hold(&prices, &ticker, &settings)?
    };

    print_result(&result, settings.total_funds);
    if let Some(dir) = output {
        CsvReportAdapter::new(dir).write_daily_values(&result.model_name, &result.daily_values)?;
    }
    Ok(())
}

fn run_momentum(
    config_path: &Path,
    blended: bool,
    output: Option<&Path>,
    verbose: bool,
) -> Result<(), PmTraderError> {
    let config = load_config(config_path)?;
    validate_model_config(&config)?;
    validate_momentum_config(&config)?;
    let prices = price_source(&config)?;
    let mut settings = build_run_settings(&config, parse_date(&config, "model", "start_date")?);
    settings.verbose |= verbose;

    let tickers = resolve_tickers(&config, &prices)?;
    let universe = screen_universe(&prices, tickers, settings.start_date, settings.end_date())?;
    let strategy = build_momentum_strategy(&config, universe.tickers, blended)?;

    let result = if strategy.blended {
        runner::run_price_momentum_blended(&prices, &strategy, &settings)?
    } else {
        runner::run_price_momentum(&prices, &strategy, &settings)?
    };

    print_result(&result, settings.total_funds);
    if let Some(dir) = output {
        CsvReportAdapter::new(dir).write_daily_values(&result.model_name, &result.daily_values)?;
    }
    Ok(())
}

fn run_picks(
    config_path: &Path,
    date: Option<NaiveDate>,
    blended: bool,
    output: Option<&Path>,
) -> Result<(), PmTraderError> {
    let config = load_config(config_path)?;
    validate_momentum_config(&config)?;
    let prices = price_source(&config)?;
    let tickers = resolve_tickers(&config, &prices)?;
    let strategy = build_momentum_strategy(&config, tickers, blended)?;
    let date = date.unwrap_or_else(|| Local::now().date_naive());

    let picks = if strategy.blended {
        let query = BlendedQuery {
            current_date: date,
            long_history_days: strategy.long_history_days,
            stocks_to_return: strategy.stock_count,
            thresholds: strategy.thresholds,
        };
        runner::todays_blended_recommendations(&prices, &strategy.tickers, &query)?
    } else {
        let query = MomentumQuery::new(
            date,
            strategy.long_history_days,
            strategy.reevaluation_interval,
            strategy.stock_count,
            strategy.filter,
        )
        .with_thresholds(strategy.thresholds);
        runner::todays_recommendations(&prices, &strategy.tickers, &query)?
    };

    print_picks(date, &picks);
    if let Some(dir) = output {
        CsvReportAdapter::new(dir).write_candidates(&format!("picks_{}", date), &picks)?;
    }
    Ok(())
}

fn run_compare(
    config_path: &Path,
    blended: bool,
    parallel: bool,
    output: Option<&Path>,
    verbose: bool,
) -> Result<(), PmTraderError> {
    let config = load_config(config_path)?;
    validate_run_config(&config)?;
    validate_momentum_config(&config)?;
    validate_compare_config(&config)?;
    let prices = price_source(&config)?;
    let mut settings = build_compare_settings(&config, parallel)?;
    settings.run.verbose |= verbose;

    let tickers = resolve_tickers(&config, &prices)?;
    let window_end =
        NaiveDate::from_ymd_opt(settings.end_year, 1, 2).unwrap_or(settings.run.start_date);
    let universe = screen_universe(&prices, tickers, settings.run.start_date, window_end)?;
    let strategy = build_momentum_strategy(&config, universe.tickers, blended)?;

    let baseline_ticker = config
        .get_string("compare", "baseline_ticker")
        .map(|s| s.trim().to_uppercase())
        .unwrap_or_else(|| strategy.starting_ticker.clone());
    let baseline = Contender::BuyHold(baseline_ticker);
    let challenger = Contender::Momentum(strategy);

    let rows = runner::compare(&prices, &baseline, &challenger, &settings)?;
    print_comparison(&baseline.name(), &challenger.name(), &rows);

    let output = output
        .map(Path::to_path_buf)
        .or_else(|| config.get_string("compare", "output").map(PathBuf::from));
    if let Some(dir) = output {
        let name = format!("{}_vs_{}", challenger.name(), baseline.name());
        CsvReportAdapter::new(dir).write_comparison(&name, &rows)?;
    }
    Ok(())
}

fn run_validate(config_path: &Path) -> Result<(), PmTraderError> {
    let config = load_config(config_path)?;
    if config.get_string("model", "start_date").is_some() {
        validate_model_config(&config)?;
    } else {
        validate_run_config(&config)?;
    }
    if config.has_section("momentum") {
        validate_momentum_config(&config)?;
    }
    if config.has_section("compare") {
        validate_compare_config(&config)?;
    }

    println!("{}: OK", config_path.display());
    Ok(())
}
