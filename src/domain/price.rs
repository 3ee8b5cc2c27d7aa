//! Daily price bars and per-ticker price history.

use chrono::{Duration, NaiveDate};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl PriceBar {
    pub fn point(&self) -> PricePoint {
        PricePoint {
            date: self.date,
            price: self.close,
        }
    }
}

/// A (date, close) pair as returned by trailing series lookups.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: f64,
}

/// Full daily history for one ticker, sorted by date with a date index.
#[derive(Debug, Clone)]
pub struct PriceHistory {
    pub ticker: String,
    pub bars: Vec<PriceBar>,
    date_index: HashMap<NaiveDate, usize>,
}

impl PriceHistory {
    pub fn new(ticker: String, mut bars: Vec<PriceBar>) -> Self {
        bars.sort_by_key(|b| b.date);
        bars.dedup_by_key(|b| b.date);
        let date_index = bars
            .iter()
            .enumerate()
            .map(|(i, bar)| (bar.date, i))
            .collect();
        Self {
            ticker,
            bars,
            date_index,
        }
    }

    pub fn bar_count(&self) -> usize {
        self.bars.len()
    }

    pub fn get_bar(&self, date: NaiveDate) -> Option<&PriceBar> {
        self.date_index.get(&date).map(|&i| &self.bars[i])
    }

    /// Index of the first bar dated on or after `date`.
    fn lower_bound(&self, date: NaiveDate) -> usize {
        self.bars.partition_point(|b| b.date < date)
    }

    pub fn first_on_or_after(&self, date: NaiveDate) -> Option<&PriceBar> {
        self.bars.get(self.lower_bound(date))
    }

    /// Closes dated in `(date - lookback_days, date]`, oldest first.
    pub fn series_ending_on(&self, date: NaiveDate, lookback_days: u32) -> Vec<PricePoint> {
        let from = date - Duration::days(i64::from(lookback_days)) + Duration::days(1);
        let start = self.lower_bound(from);
        let end = self.bars.partition_point(|b| b.date <= date);
        if start >= end {
            return Vec::new();
        }
        self.bars[start..end].iter().map(PriceBar::point).collect()
    }

    /// Trading days in `[start, end)`.
    pub fn trading_days(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        let from = self.lower_bound(start);
        self.bars[from..]
            .iter()
            .map(|b| b.date)
            .take_while(|d| *d < end)
            .collect()
    }
}
