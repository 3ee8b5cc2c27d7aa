//! Historical price lookup port.

use crate::domain::error::PmTraderError;
use crate::domain::price::{PriceBar, PricePoint};
use chrono::NaiveDate;

/// Read-only access to immutable daily price history.
///
/// Unknown tickers and dates without a bar are `Ok(None)` / empty, never
/// errors. Implementations must be safe to share across backtest workers.
pub trait PriceSource: Send + Sync {
    fn price_on(&self, ticker: &str, date: NaiveDate) -> Result<Option<PriceBar>, PmTraderError>;

    /// Closes dated in `(date - lookback_days, date]`, oldest first.
    fn series_ending_on(
        &self,
        ticker: &str,
        date: NaiveDate,
        lookback_days: u32,
    ) -> Result<Vec<PricePoint>, PmTraderError>;

    /// Trading days in `[start, end)` on which `ticker` has a bar.
    fn trading_days(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, PmTraderError>;

    fn first_trading_day_on_or_after(
        &self,
        ticker: &str,
        date: NaiveDate,
        end: NaiveDate,
    ) -> Result<Option<NaiveDate>, PmTraderError> {
        Ok(self.trading_days(ticker, date, end)?.into_iter().next())
    }
}
