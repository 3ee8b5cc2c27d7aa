//! In-memory price source over preloaded histories.

use crate::domain::error::PmTraderError;
use crate::domain::price::{PriceBar, PriceHistory, PricePoint};
use crate::ports::price_port::PriceSource;
use chrono::NaiveDate;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct MemoryPriceSource {
    histories: HashMap<String, PriceHistory>,
}

impl MemoryPriceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bars(mut self, ticker: &str, bars: Vec<PriceBar>) -> Self {
        self.insert(ticker, bars);
        self
    }

    pub fn insert(&mut self, ticker: &str, bars: Vec<PriceBar>) {
        self.histories
            .insert(ticker.to_string(), PriceHistory::new(ticker.to_string(), bars));
    }

    pub fn history(&self, ticker: &str) -> Option<&PriceHistory> {
        self.histories.get(ticker)
    }
}

impl PriceSource for MemoryPriceSource {
    fn price_on(&self, ticker: &str, date: NaiveDate) -> Result<Option<PriceBar>, PmTraderError> {
        Ok(self
            .history(ticker)
            .and_then(|h| h.get_bar(date))
            .cloned())
    }

    fn series_ending_on(
        &self,
        ticker: &str,
        date: NaiveDate,
        lookback_days: u32,
    ) -> Result<Vec<PricePoint>, PmTraderError> {
        Ok(self
            .history(ticker)
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
            .history(ticker)
            .map(|h| h.trading_days(start, end))
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(date: NaiveDate, close: f64) -> PriceBar {
        PriceBar {
            date,
            open: close,
            high: close,
            low: close,
            close,
            volume: 0,
        }
    }

    #[test]
    fn unknown_ticker_is_empty_not_error() {
        let source = MemoryPriceSource::new();
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert!(source.price_on("XYZ", date).unwrap().is_none());
        assert!(source.series_ending_on("XYZ", date, 30).unwrap().is_empty());
        assert!(source.trading_days("XYZ", date, date).unwrap().is_empty());
    }

    #[test]
    fn first_trading_day_skips_gap() {
        let d = |day| NaiveDate::from_ymd_opt(2024, 1, day).unwrap();
        let source = MemoryPriceSource::new().with_bars("A", vec![bar(d(2), 1.0), bar(d(5), 2.0)]);
        assert_eq!(
            source.first_trading_day_on_or_after("A", d(3), d(31)).unwrap(),
            Some(d(5))
        );
        assert_eq!(source.first_trading_day_on_or_after("A", d(6), d(31)).unwrap(), None);
    }
}
