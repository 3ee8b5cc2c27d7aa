//! Held lots, positions and closed trades.

use chrono::NaiveDate;

use super::tranche::TrancheId;

/// Shares bought with one tranche.
#[derive(Debug, Clone, PartialEq)]
pub struct Lot {
    pub tranche: TrancheId,
    pub shares: f64,
    pub entry_price: f64,
    pub entry_date: NaiveDate,
    pub entry_commission: f64,
}

impl Lot {
    pub fn market_value(&self, price: f64) -> f64 {
        self.shares * price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.shares * (price - self.entry_price)
    }
}

/// All lots held in one ticker. A ticker bought several times spans several
/// tranches.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub ticker: String,
    pub lots: Vec<Lot>,
}

impl Position {
    pub fn new(ticker: String) -> Self {
        Self {
            ticker,
            lots: Vec::new(),
        }
    }

    pub fn shares(&self) -> f64 {
        self.lots.iter().map(|l| l.shares).sum()
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.lots.iter().map(|l| l.market_value(price)).sum()
    }

    /// Share-weighted average entry price.
    pub fn entry_price(&self) -> f64 {
        let shares = self.shares();
        if shares <= 0.0 {
            return 0.0;
        }
        self.lots.iter().map(|l| l.shares * l.entry_price).sum::<f64>() / shares
    }

    /// Earliest entry date across lots.
    pub fn entry_date(&self) -> Option<NaiveDate> {
        self.lots.iter().map(|l| l.entry_date).min()
    }

    pub fn tranches(&self) -> Vec<TrancheId> {
        self.lots.iter().map(|l| l.tranche).collect()
    }

    pub fn take_lot(&mut self, tranche: TrancheId) -> Option<Lot> {
        let idx = self.lots.iter().position(|l| l.tranche == tranche)?;
        Some(self.lots.remove(idx))
    }

    pub fn is_empty(&self) -> bool {
        self.lots.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClosedTrade {
    pub ticker: String,
    pub shares: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub pnl: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lot(tranche: TrancheId, shares: f64, entry_price: f64, day: u32) -> Lot {
        Lot {
            tranche,
            shares,
            entry_price,
            entry_date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            entry_commission: 0.0,
        }
    }

    fn sample_position() -> Position {
        Position {
            ticker: "AAPL".into(),
            lots: vec![lot(0, 10.0, 100.0, 15), lot(3, 30.0, 120.0, 10)],
        }
    }

    #[test]
    fn lot_values() {
        let l = lot(0, 10.0, 50.0, 15);
        assert!((l.market_value(55.0) - 550.0).abs() < f64::EPSILON);
        assert!((l.unrealized_pnl(45.0) + 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn position_aggregates_lots() {
        let p = sample_position();
        assert!((p.shares() - 40.0).abs() < f64::EPSILON);
        assert!((p.market_value(110.0) - 4400.0).abs() < 1e-9);
        assert!((p.entry_price() - 115.0).abs() < 1e-9);
        assert_eq!(p.entry_date(), NaiveDate::from_ymd_opt(2024, 1, 10));
        assert_eq!(p.tranches(), vec![0, 3]);
    }

    #[test]
    fn take_lot_by_tranche() {
        let mut p = sample_position();
        let taken = p.take_lot(3).unwrap();
        assert!((taken.shares - 30.0).abs() < f64::EPSILON);
        assert!(p.take_lot(3).is_none());
        assert!(!p.is_empty());
        p.take_lot(0);
        assert!(p.is_empty());
    }

    #[test]
    fn empty_position_entry_price_is_zero() {
        let p = Position::new("XYZ".into());
        assert_eq!(p.entry_price(), 0.0);
        assert!(p.entry_date().is_none());
    }
}
