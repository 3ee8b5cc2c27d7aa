//! Fill simulation: slippage, commissions and order trigger prices.

use super::order::{OrderKind, OrderSide};
use super::price::PriceBar;

/// Configuration for fill costs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExecutionConfig {
    pub commission_per_trade: f64,
    pub commission_pct: f64,
    pub slippage_pct: f64,
}

/// Calculate commission: flat_fee + (trade_value * pct / 100).
pub fn calculate_commission(trade_value: f64, config: &ExecutionConfig) -> f64 {
    config.commission_per_trade + (trade_value * config.commission_pct / 100.0)
}

/// Buy: execution_price = market_price * (1 + slippage_pct / 100)
pub fn apply_slippage_buy(market_price: f64, slippage_pct: f64) -> f64 {
    market_price * (1.0 + slippage_pct / 100.0)
}

/// Sell: execution_price = market_price * (1 - slippage_pct / 100)
pub fn apply_slippage_sell(market_price: f64, slippage_pct: f64) -> f64 {
    market_price * (1.0 - slippage_pct / 100.0)
}

/// Execution price for an order against one day's bar, or `None` if the
/// order does not trigger that day.
///
/// Market orders take the open. A limit buy triggers when the low reaches
/// the limit and fills at the better of open and limit; a limit sell mirrors
/// that against the high. Slippage only applies to market orders.
pub fn fill_price(
    side: OrderSide,
    kind: OrderKind,
    bar: &PriceBar,
    config: &ExecutionConfig,
) -> Option<f64> {
    let price = match (side, kind) {
        (OrderSide::Buy, OrderKind::Market) => apply_slippage_buy(bar.open, config.slippage_pct),
        (OrderSide::Sell, OrderKind::Market) => apply_slippage_sell(bar.open, config.slippage_pct),
        (OrderSide::Buy, OrderKind::Limit(limit)) => {
            if bar.low > limit {
                return None;
            }
            bar.open.min(limit)
        }
        (OrderSide::Sell, OrderKind::Limit(limit)) => {
            if bar.high < limit {
                return None;
            }
            bar.open.max(limit)
        }
    };
    (price > 0.0).then_some(price)
}

/// Shares bought with `budget` at `price` after commission, and the
/// commission charged. Returns `None` when the budget cannot cover the fee.
pub fn shares_for_budget(budget: f64, price: f64, config: &ExecutionConfig) -> Option<(f64, f64)> {
    if budget <= 0.0 || price <= 0.0 {
        return None;
    }
    // commission = flat + pct * notional, notional = budget - commission
    let pct = config.commission_pct / 100.0;
    let notional = (budget - config.commission_per_trade) / (1.0 + pct);
    if notional <= 0.0 {
        return None;
    }
    let commission = budget - notional;
    Some((notional / price, commission))
}
