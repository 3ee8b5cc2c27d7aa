#![allow(dead_code)]

use chrono::{Duration, NaiveDate};
use pmtrader::domain::error::PmTraderError;
pub use pmtrader::domain::price::{PriceBar, PriceHistory, PricePoint};
use pmtrader::ports::price_port::PriceSource;
use std::collections::HashMap;

/// In-memory price source with optional per-ticker failures.
pub struct MockPriceSource {
    pub data: HashMap<String, PriceHistory>,
    pub errors: HashMap<String, String>,
}

impl MockPriceSource {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, ticker: &str, bars: Vec<PriceBar>) -> Self {
        self.data.insert(
            ticker.to_string(),
            PriceHistory::new(ticker.to_string(), bars),
        );
        self
    }

    pub fn with_error(mut self, ticker: &str, reason: &str) -> Self {
        self.errors.insert(ticker.to_string(), reason.to_string());
        self
    }

    fn check(&self, ticker: &str) -> Result<Option<&PriceHistory>, PmTraderError> {
        if let Some(reason) = self.errors.get(ticker) {
            return Err(PmTraderError::PriceData {
                reason: reason.clone(),
            });
        }
        Ok(self.data.get(ticker))
    }
}

impl PriceSource for MockPriceSource {
    fn price_on(&self, ticker: &str, date: NaiveDate) -> Result<Option<PriceBar>, PmTraderError> {
        Ok(self.check(ticker)?.and_then(|h| h.get_bar(date).cloned()))
    }

    fn series_ending_on(
        &self,
        ticker: &str,
        date: NaiveDate,
        lookback_days: u32,
    ) -> Result<Vec<PricePoint>, PmTraderError> {
        Ok(self
            .check(ticker)?
            .map(|h| h.series_ending_on(date, lookback_days))
            .unwrap_or_default())
    }

    fn trading_days(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, PmTraderError> {
        Ok(self
            .check(ticker)?
            .map(|h| h.trading_days(start, end))
            .unwrap_or_default())
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn make_bar(date_str: &str, close: f64) -> PriceBar {
    PriceBar {
        date: NaiveDate::parse_from_str(date_str, "%Y-%m-%d").unwrap(),
        open: close,
        high: close,
        low: close,
        close,
        volume: 1000,
    }
}

pub fn flat_bar(date: NaiveDate, price: f64) -> PriceBar {
    PriceBar {
        date,
        open: price,
        high: price,
        low: price,
        close: price,
        volume: 1000,
    }
}

/// One bar per calendar day for `days` days, moving linearly from `first`
/// to `last` close. Open/high/low equal the close.
pub fn linear_bars(start: NaiveDate, days: i64, first: f64, last: f64) -> Vec<PriceBar> {
    let steps = (days - 1).max(1) as f64;
    (0..days)
        .map(|i| {
            let price = first + (last - first) * i as f64 / steps;
            flat_bar(start + Duration::days(i), price)
        })
        .collect()
}

pub fn flat_bars(start: NaiveDate, days: i64, price: f64) -> Vec<PriceBar> {
    linear_bars(start, days, price, price)
}
