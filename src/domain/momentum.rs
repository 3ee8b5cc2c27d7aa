//! Momentum measures over trailing close series.
//!
//! RETURN(series) = last / first - 1
//! VOLATILITY(series) = sample standard deviation of close-to-close returns

use chrono::{Duration, NaiveDate};

use super::price::PricePoint;

/// Grace period allowed between the requested lookback start and the first
/// available close (weekends and holidays).
pub const HISTORY_GRACE_DAYS: i64 = 7;

/// True when `series` reaches far enough back to score a `long_days` return
/// ending on `current_date` and is still quoted within the grace period.
pub fn has_sufficient_history(
    series: &[PricePoint],
    current_date: NaiveDate,
    long_days: u32,
) -> bool {
    let (Some(first), Some(last)) = (series.first(), series.last()) else {
        return false;
    };
    if series.len() < 2 {
        return false;
    }
    let grace = Duration::days(HISTORY_GRACE_DAYS);
    let latest_start = current_date - Duration::days(i64::from(long_days)) + grace;
    first.date <= latest_start && last.date >= current_date - grace
}

/// Total return from the first to the last close, or `None` when the series
/// is too short or starts at a non-positive price.
pub fn trailing_return(series: &[PricePoint]) -> Option<f64> {
    let first = series.first()?;
    let last = series.last()?;
    if series.len() < 2 || first.price <= 0.0 {
        return None;
    }
    Some(last.price / first.price - 1.0)
}

/// The tail of `series` dated after `current_date - days`.
pub fn tail_window(series: &[PricePoint], current_date: NaiveDate, days: u32) -> &[PricePoint] {
    let from = current_date - Duration::days(i64::from(days));
    let start = series.partition_point(|p| p.date <= from);
    &series[start..]
}

pub fn daily_returns(series: &[PricePoint]) -> Vec<f64> {
    series
        .windows(2)
        .filter(|w| w[0].price > 0.0)
        .map(|w| w[1].price / w[0].price - 1.0)
        .collect()
}

/// Sample standard deviation of daily returns; zero with fewer than two
/// returns.
pub fn volatility(series: &[PricePoint]) -> f64 {
    let returns = daily_returns(series);
    let n = returns.len();
    if n < 2 {
        return 0.0;
    }
    let mean = returns.iter().sum::<f64>() / n as f64;
    let variance = returns
        .iter()
        .map(|r| {
            let diff = r - mean;
            diff * diff
        })
        .sum::<f64>()
        / (n - 1) as f64;
    variance.sqrt()
}

/// Return per calendar day of lookback.
pub fn pace(total_return: f64, days: u32) -> f64 {
    if days == 0 {
        return 0.0;
    }
    total_return / f64::from(days)
}
