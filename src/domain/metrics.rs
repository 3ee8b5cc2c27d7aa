//! Run summary statistics over the daily value history and closed trades.

use super::portfolio::DailyValue;
use super::position::ClosedTrade;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Metrics {
    pub ending_value: f64,
    pub total_return: f64,
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    /// Longest run of snapshots spent below a prior peak.
    pub max_drawdown_duration: usize,
    pub trade_count: usize,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub avg_trade_duration: f64,
}

impl Metrics {
    pub fn compute(daily_values: &[DailyValue], trades: &[ClosedTrade], initial_capital: f64) -> Self {
        let ending_value = daily_values
            .last()
            .map(DailyValue::total)
            .unwrap_or(initial_capital);

        let total_return = if initial_capital > 0.0 {
            (ending_value - initial_capital) / initial_capital
        } else {
            0.0
        };

        let years = daily_values.len() as f64 / TRADING_DAYS_PER_YEAR;
        let annualized_return = if years > 0.0 && total_return > -1.0 {
            (1.0 + total_return).powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let totals: Vec<f64> = daily_values.iter().map(DailyValue::total).collect();
        let (max_drawdown, max_drawdown_duration) = compute_drawdown(&totals);

        let trades_won = trades.iter().filter(|t| t.pnl > 0.0).count();
        let trades_lost = trades.iter().filter(|t| t.pnl < 0.0).count();
        let total_wins: f64 = trades.iter().map(|t| t.pnl.max(0.0)).sum();
        let total_losses: f64 = trades.iter().map(|t| (-t.pnl).max(0.0)).sum();

        let win_rate = if trades.is_empty() {
            0.0
        } else {
            trades_won as f64 / trades.len() as f64
        };

        let profit_factor = if total_losses > 0.0 {
            total_wins / total_losses
        } else if total_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let avg_trade_duration = if trades.is_empty() {
            0.0
        } else {
            trades
                .iter()
                .map(|t| (t.exit_date - t.entry_date).num_days() as f64)
                .sum::<f64>()
                / trades.len() as f64
        };

        Metrics {
            ending_value,
            total_return,
            annualized_return,
            sharpe_ratio: compute_sharpe(&totals),
            max_drawdown,
            max_drawdown_duration,
            trade_count: trades.len(),
            trades_won,
            trades_lost,
            win_rate,
            profit_factor,
            avg_trade_duration,
        }
    }
}

fn compute_drawdown(values: &[f64]) -> (f64, usize) {
    let Some(&first) = values.first() else {
        return (0.0, 0);
    };

    let mut peak = first;
    let mut max_dd = 0.0_f64;
    let mut run = 0usize;
    let mut max_run = 0usize;

    for &value in values {
        if value >= peak {
            peak = value;
            run = 0;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - value) / peak);
            run += 1;
            max_run = max_run.max(run);
        }
    }

    (max_dd, max_run)
}

/// Annualized Sharpe ratio of daily returns with a zero risk-free rate.
fn compute_sharpe(values: &[f64]) -> f64 {
    let returns: Vec<f64> = values
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect();
    if returns.len() < 2 {
        return 0.0;
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let stddev = (returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n).sqrt();
    if stddev > 0.0 {
        mean / stddev * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    }
}
