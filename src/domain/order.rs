//! Pending orders and their lifecycle.

use chrono::NaiveDate;
use std::fmt;

use super::tranche::TrancheId;

pub type OrderId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrderKind {
    /// Fills at the next available open.
    Market,
    /// Fills only once the day's range reaches the price.
    Limit(f64),
}

impl OrderKind {
    /// Build from the `(price, market_order)` pair drivers pass around; the
    /// price is ignored for market orders.
    pub fn from_request(price: f64, market_order: bool) -> Self {
        if market_order {
            OrderKind::Market
        } else {
            OrderKind::Limit(price)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: OrderId,
    pub ticker: String,
    pub side: OrderSide,
    pub kind: OrderKind,
    pub placed_on: NaiveDate,
    pub expire_after_days: u32,
    pub age_days: u32,
    pub tranche: TrancheId,
}

impl Order {
    /// Record one unfilled trading day. Returns true once the order has
    /// outlived its expiry; an expiry of zero behaves like one day.
    pub fn age_one_day(&mut self) -> bool {
        self.age_days += 1;
        self.age_days >= self.expire_after_days.max(1)
    }
}
