//! Momentum ranking over a registered ticker universe.
//!
//! Tickers are ranked by trailing long-horizon return, descending, ties by
//! symbol. A [`QualificationPolicy`](super::filter::QualificationPolicy)
//! chosen by [`FilterOption`] then drops tickers whose short-horizon behavior
//! does not match. Each survivor carries a point value: its share of the
//! positive long returns in the returned set.

use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

use super::error::PmTraderError;
use super::filter::{FilterOption, FilterThresholds, MomentumSnapshot};
use super::momentum::{has_sufficient_history, tail_window, trailing_return, volatility};
use super::price::PricePoint;
use crate::ports::price_port::PriceSource;

/// Legs of a blended selection: (short history days, filter).
pub const BLENDED_LEGS: [(u32, FilterOption); 3] = [
    (40, FilterOption::Pullback),
    (20, FilterOption::SteadyGain),
    (40, FilterOption::SteadyGain),
];

#[derive(Debug, Clone, PartialEq)]
pub struct RankedCandidate {
    pub ticker: String,
    pub long_return: f64,
    pub short_return: f64,
    pub volatility: f64,
    /// Allocation weight; the point values of one result sum to 1.
    pub point_value: f64,
    pub filter: FilterOption,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MomentumQuery {
    pub current_date: NaiveDate,
    pub long_history_days: u32,
    pub short_history_days: u32,
    pub stocks_to_return: usize,
    pub filter: FilterOption,
    pub thresholds: FilterThresholds,
}

impl MomentumQuery {
    pub fn new(
        current_date: NaiveDate,
        long_history_days: u32,
        short_history_days: u32,
        stocks_to_return: usize,
        filter: FilterOption,
    ) -> Self {
        MomentumQuery {
            current_date,
            long_history_days,
            short_history_days,
            stocks_to_return,
            filter,
            thresholds: FilterThresholds::default(),
        }
    }

    pub fn with_thresholds(mut self, thresholds: FilterThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlendedQuery {
    pub current_date: NaiveDate,
    pub long_history_days: u32,
    pub stocks_to_return: usize,
    pub thresholds: FilterThresholds,
}

impl BlendedQuery {
    /// The per-leg queries, each asking for a third of the target rounded up.
    pub fn legs(&self) -> Vec<MomentumQuery> {
        let per_leg = self.stocks_to_return.div_ceil(BLENDED_LEGS.len());
        BLENDED_LEGS
            .iter()
            .map(|&(short_days, filter)| {
                MomentumQuery::new(
                    self.current_date,
                    self.long_history_days,
                    short_days,
                    per_leg,
                    filter,
                )
                .with_thresholds(self.thresholds)
            })
            .collect()
    }
}

type SeriesKey = (String, NaiveDate, u32);

pub struct StockPicker<'a> {
    source: &'a dyn PriceSource,
    tickers: Vec<String>,
    window: Option<(NaiveDate, NaiveDate)>,
    cache: RwLock<HashMap<SeriesKey, Arc<Vec<PricePoint>>>>,
}

impl<'a> StockPicker<'a> {
    pub fn new(source: &'a dyn PriceSource) -> Self {
        StockPicker {
            source,
            tickers: Vec::new(),
            window: None,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Only consider closes dated within `[start, end]`.
    pub fn with_window(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.window = Some((start, end));
        self
    }

    /// Register a ticker. Symbols are upper-cased; duplicates are ignored.
    pub fn add_ticker(&mut self, ticker: &str) {
        let ticker = ticker.trim().to_uppercase();
        if !ticker.is_empty() && !self.tickers.contains(&ticker) {
            self.tickers.push(ticker);
        }
    }

    pub fn add_tickers<I, S>(&mut self, tickers: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for ticker in tickers {
            self.add_ticker(ticker.as_ref());
        }
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    fn series(
        &self,
        ticker: &str,
        date: NaiveDate,
        days: u32,
    ) -> Result<Arc<Vec<PricePoint>>, PmTraderError> {
        let key = (ticker.to_string(), date, days);
        if let Some(hit) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(Arc::clone(hit));
        }

        let mut points = self.source.series_ending_on(ticker, date, days)?;
        if let Some((start, end)) = self.window {
            points.retain(|p| p.date >= start && p.date <= end);
        }
        let points = Arc::new(points);
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, Arc::clone(&points));
        Ok(points)
    }

    fn snapshot(
        &self,
        ticker: &str,
        query: &MomentumQuery,
    ) -> Result<Option<MomentumSnapshot>, PmTraderError> {
        let date = query.current_date;
        let lookback = query.long_history_days.max(query.short_history_days);
        let series = self.series(ticker, date, lookback)?;

        let long_series = tail_window(&series, date, query.long_history_days);
        if !has_sufficient_history(long_series, date, query.long_history_days) {
            return Ok(None);
        }
        let Some(long_return) = trailing_return(long_series) else {
            return Ok(None);
        };
        let short_series = tail_window(&series, date, query.short_history_days);
        let Some(short_return) = trailing_return(short_series) else {
            return Ok(None);
        };

        Ok(Some(MomentumSnapshot {
            long_return,
            short_return,
            volatility: volatility(short_series),
            long_days: query.long_history_days,
            short_days: query.short_history_days,
        }))
    }

    /// Rank the universe on `query.current_date`. An empty result is valid.
    pub fn get_highest_price_momentum(
        &self,
        query: &MomentumQuery,
    ) -> Result<Vec<RankedCandidate>, PmTraderError> {
        let policy = query.filter.policy();
        let mut ranked = Vec::new();
        let mut insufficient = 0usize;

        for ticker in &self.tickers {
            let Some(snapshot) = self.snapshot(ticker, query)? else {
                insufficient += 1;
                continue;
            };
            if !policy.qualifies(&snapshot, &query.thresholds) {
                continue;
            }
            ranked.push(RankedCandidate {
                ticker: ticker.clone(),
                long_return: snapshot.long_return,
                short_return: snapshot.short_return,
                volatility: snapshot.volatility,
                point_value: 0.0,
                filter: query.filter,
            });
        }

        ranked.sort_by(|a, b| {
            b.long_return
                .total_cmp(&a.long_return)
                .then_with(|| a.ticker.cmp(&b.ticker))
        });
        ranked.truncate(query.stocks_to_return);
        assign_point_values(&mut ranked);

        debug!(
            date = %query.current_date,
            filter = %query.filter,
            universe = self.tickers.len(),
            insufficient,
            selected = ranked.len(),
            "Momentum ranking"
        );
        Ok(ranked)
    }

    /// Concatenate the three blended legs in order and truncate. A ticker
    /// chosen by several legs appears once per leg.
    pub fn get_blended_momentum(
        &self,
        query: &BlendedQuery,
    ) -> Result<Vec<RankedCandidate>, PmTraderError> {
        let mut blended = Vec::new();
        for leg in query.legs() {
            blended.extend(self.get_highest_price_momentum(&leg)?);
        }
        blended.truncate(query.stocks_to_return);
        assign_point_values(&mut blended);
        Ok(blended)
    }
}

/// Weight each candidate by its share of the positive long returns; equal
/// weights when none is positive.
pub fn assign_point_values(candidates: &mut [RankedCandidate]) {
    if candidates.is_empty() {
        return;
    }
    let positive_total: f64 = candidates.iter().map(|c| c.long_return.max(0.0)).sum();
    if positive_total > 0.0 {
        for c in candidates.iter_mut() {
            c.point_value = c.long_return.max(0.0) / positive_total;
        }
    } else {
        let equal = 1.0 / candidates.len() as f64;
        for c in candidates.iter_mut() {
            c.point_value = equal;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_price_adapter::MemoryPriceSource;
    use crate::domain::price::PriceBar;
    use chrono::Duration;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    /// Daily closes moving linearly from `from` to `to` over `days` days.
    fn linear(start: NaiveDate, days: i64, from: f64, to: f64) -> Vec<PriceBar> {
        (0..=days)
            .map(|i| {
                let close = from + (to - from) * i as f64 / days as f64;
                PriceBar {
                    date: start + Duration::days(i),
                    open: close,
                    high: close,
                    low: close,
                    close,
                    volume: 100,
                }
            })
            .collect()
    }

    fn universe() -> MemoryPriceSource {
        // the first close inside a 365-day window ending 2024-01-01
        let start = d(2023, 1, 2);
        MemoryPriceSource::new()
            .with_bars("UP", linear(start, 364, 100.0, 120.0))
            .with_bars("DOWN", linear(start, 364, 100.0, 95.0))
            .with_bars("MID", linear(start, 364, 100.0, 108.0))
            .with_bars("NEW", linear(d(2023, 11, 1), 61, 10.0, 30.0))
    }

    fn picker(source: &MemoryPriceSource) -> StockPicker<'_> {
        let mut picker = StockPicker::new(source);
        picker.add_tickers(["up", "DOWN", "MID", "NEW", "up"]);
        picker
    }

    #[test]
    fn add_ticker_normalizes_and_dedupes() {
        let source = universe();
        let p = picker(&source);
        assert_eq!(p.tickers(), ["UP", "DOWN", "MID", "NEW"]);
    }

    #[test]
    fn no_filter_returns_top_by_long_return() {
        let source = universe();
        let p = picker(&source);
        let query = MomentumQuery::new(d(2024, 1, 1), 365, 20, 2, FilterOption::NoFilter);
        let picks = p.get_highest_price_momentum(&query).unwrap();
        let tickers: Vec<&str> = picks.iter().map(|c| c.ticker.as_str()).collect();
        assert_eq!(tickers, ["UP", "MID"]);
        assert!((picks[0].long_return - 0.2).abs() < 1e-9);
        assert!((picks[1].long_return - 0.08).abs() < 1e-9);
        assert!((picks[0].point_value - 0.2 / 0.28).abs() < 1e-9);
        assert!((picks.iter().map(|c| c.point_value).sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn recently_listed_ticker_is_excluded() {
        let source = universe();
        let p = picker(&source);
        let query = MomentumQuery::new(d(2024, 1, 1), 365, 20, 10, FilterOption::NoFilter);
        let picks = p.get_highest_price_momentum(&query).unwrap();
        assert!(picks.iter().all(|c| c.ticker != "NEW"));
        assert_eq!(picks.len(), 3);
    }

    #[test]
    fn delisted_ticker_is_not_ranked() {
        let source = universe()
            .with_bars("DEAD", linear(d(2022, 7, 1), 365, 100.0, 116.0))
            .with_bars("LIVE", linear(d(2023, 1, 20), 365, 100.0, 107.3));
        let mut p = StockPicker::new(&source);
        p.add_tickers(["DEAD", "LIVE"]);
        let query = MomentumQuery::new(d(2024, 1, 20), 365, 20, 5, FilterOption::Pullback);
        let tickers: Vec<String> = p
            .get_highest_price_momentum(&query)
            .unwrap()
            .into_iter()
            .map(|c| c.ticker)
            .collect();
        assert_eq!(tickers, ["LIVE"]);
    }

    #[test]
    fn sparse_short_window_is_not_ranked() {
        // one close inside the last 20 days is not enough to score it
        let mut bars = linear(d(2023, 1, 2), 340, 100.0, 120.0);
        bars.push(PriceBar {
            date: d(2023, 12, 30),
            open: 121.0,
            high: 121.0,
            low: 121.0,
            close: 121.0,
            volume: 100,
        });
        let source = MemoryPriceSource::new().with_bars("GAP", bars);
        let mut p = StockPicker::new(&source);
        p.add_ticker("GAP");
        let query = MomentumQuery::new(d(2024, 1, 1), 365, 20, 5, FilterOption::NoFilter);
        assert!(p.get_highest_price_momentum(&query).unwrap().is_empty());
    }

    #[test]
    fn ranking_is_deterministic() {
        let source = universe();
        let p = picker(&source);
        let query = MomentumQuery::new(d(2024, 1, 1), 365, 20, 3, FilterOption::NoFilter);
        let first = p.get_highest_price_momentum(&query).unwrap();
        let second = p.get_highest_price_momentum(&query).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn filter_drops_unqualified() {
        let source = universe();
        let p = picker(&source);
        // linear rises slow in relative terms, so the recent pace trails the
        // long pace and no ticker counts as a steady gainer
        let query = MomentumQuery::new(d(2024, 1, 1), 365, 20, 10, FilterOption::SteadyGain);
        assert!(p.get_highest_price_momentum(&query).unwrap().is_empty());

        let query = MomentumQuery::new(d(2024, 1, 1), 365, 20, 10, FilterOption::Pullback);
        let tickers: Vec<String> = p
            .get_highest_price_momentum(&query)
            .unwrap()
            .into_iter()
            .map(|c| c.ticker)
            .collect();
        assert_eq!(tickers, ["UP", "MID"]);
    }

    #[test]
    fn empty_universe_is_empty_result() {
        let source = universe();
        let p = StockPicker::new(&source);
        let query = MomentumQuery::new(d(2024, 1, 1), 365, 20, 5, FilterOption::NoFilter);
        assert!(p.get_highest_price_momentum(&query).unwrap().is_empty());
    }

    #[test]
    fn window_limits_history() {
        let source = universe();
        let mut p = StockPicker::new(&source).with_window(d(2023, 6, 1), d(2024, 12, 31));
        p.add_ticker("UP");
        let query = MomentumQuery::new(d(2024, 1, 1), 365, 20, 5, FilterOption::NoFilter);
        assert!(p.get_highest_price_momentum(&query).unwrap().is_empty());
    }

    #[test]
    fn blended_legs_split_target() {
        let query = BlendedQuery {
            current_date: d(2024, 1, 1),
            long_history_days: 365,
            stocks_to_return: 5,
            thresholds: FilterThresholds::default(),
        };
        let legs = query.legs();
        assert_eq!(legs.len(), 3);
        assert!(legs.iter().all(|l| l.stocks_to_return == 2));
        assert_eq!(legs[0].filter, FilterOption::Pullback);
        assert_eq!(legs[1].short_history_days, 20);
    }

    #[test]
    fn blended_keeps_leg_order_and_truncates() {
        let source = universe();
        let p = picker(&source);
        let query = BlendedQuery {
            current_date: d(2024, 1, 1),
            long_history_days: 365,
            stocks_to_return: 3,
            thresholds: FilterThresholds::default(),
        };
        let picks = p.get_blended_momentum(&query).unwrap();
        // only the pullback leg qualifies anything, one ticker per leg
        assert_eq!(picks.len(), 1);
        assert_eq!(picks[0].ticker, "UP");
        assert_eq!(picks[0].filter, FilterOption::Pullback);
        assert!((picks[0].point_value - 1.0).abs() < 1e-9);
    }

    #[test]
    fn point_values_fall_back_to_equal_weights() {
        let mut candidates: Vec<RankedCandidate> = ["A", "B"]
            .iter()
            .map(|t| RankedCandidate {
                ticker: t.to_string(),
                long_return: -0.1,
                short_return: 0.0,
                volatility: 0.0,
                point_value: 0.0,
                filter: FilterOption::NoFilter,
            })
            .collect();
        assign_point_values(&mut candidates);
        assert!((candidates[0].point_value - 0.5).abs() < f64::EPSILON);
    }
}
