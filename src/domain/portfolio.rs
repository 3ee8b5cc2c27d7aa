//! Portfolio state: cash, tranches, held lots and valuation history.

use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};

use super::execution::{ExecutionConfig, calculate_commission};
use super::position::{ClosedTrade, Lot, Position};
use super::tranche::{Tranche, TrancheId, TrancheSizing, TrancheState};

/// One end-of-day valuation snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailyValue {
    pub date: NaiveDate,
    pub cash: f64,
    pub assets: f64,
}

impl DailyValue {
    pub fn total(&self) -> f64 {
        self.cash + self.assets
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    pub cash: f64,
    pub initial_capital: f64,
    pub tranches: Vec<Tranche>,
    pub positions: BTreeMap<String, Position>,
    pub closed_trades: Vec<ClosedTrade>,
    pub daily_values: Vec<DailyValue>,
    last_prices: HashMap<String, f64>,
}

impl Portfolio {
    pub fn new(initial_capital: f64, sizing: TrancheSizing) -> Self {
        Portfolio {
            cash: initial_capital,
            initial_capital,
            tranches: sizing.build(initial_capital),
            positions: BTreeMap::new(),
            closed_trades: Vec::new(),
            daily_values: Vec::new(),
            last_prices: HashMap::new(),
        }
    }

    pub fn tranche_count(&self) -> usize {
        self.tranches.len()
    }

    pub fn free_tranche(&self) -> Option<TrancheId> {
        self.tranches.iter().find(|t| t.is_free()).map(|t| t.id)
    }

    pub fn free_tranche_count(&self) -> usize {
        self.tranches.iter().filter(|t| t.is_free()).count()
    }

    pub fn tranche(&self, id: TrancheId) -> &Tranche {
        &self.tranches[id]
    }

    pub fn set_tranche_state(&mut self, id: TrancheId, state: TrancheState) {
        self.tranches[id].state = state;
    }

    pub fn has_position(&self, ticker: &str) -> bool {
        self.positions.contains_key(ticker)
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    pub fn add_lot(&mut self, ticker: &str, lot: Lot, price: f64) {
        self.set_tranche_state(lot.tranche, TrancheState::Held);
        self.mark_price(ticker, price);
        self.positions
            .entry(ticker.to_string())
            .or_insert_with(|| Position::new(ticker.to_string()))
            .lots
            .push(lot);
    }

    /// Sell the lot backed by `tranche`, free the tranche and record the
    /// trade. Returns `None` if no such lot is held.
    pub fn close_lot(
        &mut self,
        ticker: &str,
        tranche: TrancheId,
        exit_price: f64,
        exit_date: NaiveDate,
        config: &ExecutionConfig,
    ) -> Option<ClosedTrade> {
        let position = self.positions.get_mut(ticker)?;
        let lot = position.take_lot(tranche)?;
        if position.is_empty() {
            self.positions.remove(ticker);
        }

        let exit_value = lot.shares * exit_price;
        let exit_commission = if exit_value > 0.0 {
            calculate_commission(exit_value, config)
        } else {
            0.0
        };
        self.cash += exit_value - exit_commission;
        self.set_tranche_state(tranche, TrancheState::Free);

        let pnl = lot.unrealized_pnl(exit_price) - lot.entry_commission - exit_commission;
        let trade = ClosedTrade {
            ticker: ticker.to_string(),
            shares: lot.shares,
            entry_price: lot.entry_price,
            exit_price,
            entry_date: lot.entry_date,
            exit_date,
            pnl,
        };
        self.closed_trades.push(trade.clone());
        Some(trade)
    }

    pub fn mark_price(&mut self, ticker: &str, price: f64) {
        self.last_prices.insert(ticker.to_string(), price);
    }

    pub fn last_price(&self, ticker: &str) -> Option<f64> {
        self.last_prices.get(ticker).copied()
    }

    /// Mark every position at its last known price.
    pub fn asset_value(&self) -> f64 {
        self.positions
            .values()
            .map(|pos| {
                let price = self
                    .last_price(&pos.ticker)
                    .unwrap_or_else(|| pos.entry_price());
                pos.market_value(price)
            })
            .sum()
    }

    pub fn total_value(&self) -> f64 {
        self.cash + self.asset_value()
    }

    pub fn record_value(&mut self, date: NaiveDate) {
        let assets = self.asset_value();
        self.daily_values.push(DailyValue {
            date,
            cash: self.cash,
            assets,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn buy(portfolio: &mut Portfolio, ticker: &str, shares: f64, price: f64) -> TrancheId {
        let tranche = portfolio.free_tranche().unwrap();
        portfolio.cash -= shares * price;
        portfolio.add_lot(
            ticker,
            Lot {
                tranche,
                shares,
                entry_price: price,
                entry_date: d(2),
                entry_commission: 0.0,
            },
            price,
        );
        tranche
    }

    #[test]
    fn new_portfolio() {
        let portfolio = Portfolio::new(30_000.0, TrancheSizing::Count(10));
        assert!((portfolio.cash - 30_000.0).abs() < f64::EPSILON);
        assert_eq!(portfolio.tranche_count(), 10);
        assert_eq!(portfolio.free_tranche_count(), 10);
        assert!(portfolio.positions.is_empty());
        assert!(portfolio.daily_values.is_empty());
    }

    #[test]
    fn add_lot_binds_tranche() {
        let mut portfolio = Portfolio::new(30_000.0, TrancheSizing::Count(10));
        let t = buy(&mut portfolio, "MSFT", 30.0, 100.0);
        assert_eq!(portfolio.tranche(t).state, TrancheState::Held);
        assert_eq!(portfolio.free_tranche_count(), 9);
        assert!(portfolio.has_position("MSFT"));
    }

    #[test]
    fn same_ticker_spans_tranches() {
        let mut portfolio = Portfolio::new(30_000.0, TrancheSizing::Count(10));
        buy(&mut portfolio, "MSFT", 30.0, 100.0);
        buy(&mut portfolio, "MSFT", 30.0, 100.0);
        assert_eq!(portfolio.position_count(), 1);
        assert_eq!(portfolio.positions["MSFT"].lots.len(), 2);
    }

    #[test]
    fn close_lot_frees_tranche_and_records_trade() {
        let mut portfolio = Portfolio::new(30_000.0, TrancheSizing::Count(10));
        let t = buy(&mut portfolio, "MSFT", 30.0, 100.0);
        let trade = portfolio
            .close_lot("MSFT", t, 110.0, d(5), &ExecutionConfig::default())
            .unwrap();
        assert!((trade.pnl - 300.0).abs() < 1e-9);
        assert!((portfolio.cash - 30_300.0).abs() < 1e-9);
        assert!(portfolio.tranche(t).is_free());
        assert!(!portfolio.has_position("MSFT"));
        assert_eq!(portfolio.closed_trades.len(), 1);
    }

    #[test]
    fn close_lot_charges_commission() {
        let mut portfolio = Portfolio::new(30_000.0, TrancheSizing::Count(10));
        let t = buy(&mut portfolio, "MSFT", 10.0, 100.0);
        let config = ExecutionConfig {
            commission_per_trade: 5.0,
            ..Default::default()
        };
        let trade = portfolio.close_lot("MSFT", t, 100.0, d(5), &config).unwrap();
        assert!((trade.pnl + 5.0).abs() < 1e-9);
        assert!((portfolio.cash - 29_995.0).abs() < 1e-9);
    }

    #[test]
    fn close_missing_lot_is_none() {
        let mut portfolio = Portfolio::new(30_000.0, TrancheSizing::Count(10));
        assert!(
            portfolio
                .close_lot("XYZ", 0, 1.0, d(5), &ExecutionConfig::default())
                .is_none()
        );
    }

    #[test]
    fn asset_value_uses_last_known_price() {
        let mut portfolio = Portfolio::new(30_000.0, TrancheSizing::Count(10));
        buy(&mut portfolio, "MSFT", 30.0, 100.0);
        portfolio.mark_price("MSFT", 120.0);
        assert!((portfolio.asset_value() - 3_600.0).abs() < 1e-9);
        assert!((portfolio.total_value() - 30_600.0).abs() < 1e-9);
    }

    #[test]
    fn record_value_appends() {
        let mut portfolio = Portfolio::new(1_000.0, TrancheSizing::Count(1));
        portfolio.record_value(d(2));
        portfolio.record_value(d(3));
        assert_eq!(portfolio.daily_values.len(), 2);
        assert!((portfolio.daily_values[1].total() - 1_000.0).abs() < f64::EPSILON);
    }
}
