//! Day-stepped portfolio simulation.
//!
//! A [`TradingModel`] owns cash, a fixed set of capital tranches, the lots
//! bought with them and a queue of pending orders. The driver places orders
//! and calls [`TradingModel::process_day`] until
//! [`TradingModel::model_completed`], then [`TradingModel::close_model`].
//!
//! Every tranche is always in exactly one of four states (free, pending buy,
//! held, pending sell), so free + pending buys + bound lots equals the
//! tranche count at every point.

use chrono::{Duration, NaiveDate};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::{info, warn};

use super::allocation::TargetAllocation;
use super::error::{ModelError, PmTraderError};
use super::execution::{ExecutionConfig, fill_price, shares_for_budget};
use super::order::{Order, OrderId, OrderKind, OrderSide};
use super::portfolio::Portfolio;
use super::position::{ClosedTrade, Lot, Position};
use super::price::PriceBar;
use super::tranche::{TrancheId, TrancheSizing, TrancheState};
use crate::ports::price_port::PriceSource;

pub use super::portfolio::DailyValue;

pub const DAYS_PER_YEAR: i64 = 365;
pub const DEFAULT_ORDER_EXPIRY_DAYS: u32 = 10;

/// Logs at info for verbose models, debug otherwise.
macro_rules! trade_event {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            tracing::info!($($arg)+)
        } else {
            tracing::debug!($($arg)+)
        }
    };
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub name: String,
    /// Ticker whose trading days form the model calendar.
    pub starting_ticker: String,
    pub start_date: NaiveDate,
    pub duration_years: u32,
    pub total_funds: f64,
    pub tranche_sizing: TrancheSizing,
    pub execution: ExecutionConfig,
    /// Expiry used for orders the model places itself during alignment.
    pub order_expiry_days: u32,
    pub verbose: bool,
}

impl ModelConfig {
    pub fn new(
        name: impl Into<String>,
        starting_ticker: impl Into<String>,
        start_date: NaiveDate,
        duration_years: u32,
        total_funds: f64,
        tranche_sizing: TrancheSizing,
    ) -> Self {
        ModelConfig {
            name: name.into(),
            starting_ticker: starting_ticker.into(),
            start_date,
            duration_years,
            total_funds,
            tranche_sizing,
            execution: ExecutionConfig::default(),
            order_expiry_days: DEFAULT_ORDER_EXPIRY_DAYS,
            verbose: false,
        }
    }

    pub fn end_date(&self) -> NaiveDate {
        self.start_date + Duration::days(DAYS_PER_YEAR * i64::from(self.duration_years))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelStatus {
    /// The starting ticker had no price history in the model window.
    NotReady,
    Ready,
    Running,
    Closed,
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelStatus::NotReady => write!(f, "not ready"),
            ModelStatus::Ready => write!(f, "ready"),
            ModelStatus::Running => write!(f, "running"),
            ModelStatus::Closed => write!(f, "closed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuyOutcome {
    Queued(OrderId),
    /// Every tranche is already committed; stop placing buys.
    NoTrancheAvailable,
    ModelNotReady,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SellOutcome {
    Queued(OrderId),
    NoLotAvailable,
    ModelNotReady,
}

/// Tranche counts by state. The four fields sum to the tranche count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PositionSummary {
    pub available: usize,
    pub buy_pending: usize,
    pub sell_pending: usize,
    pub long: usize,
}

impl fmt::Display for PositionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "available/buy/sell/long {}/{}/{}/{}",
            self.available, self.buy_pending, self.sell_pending, self.long
        )
    }
}

/// Orders emitted by one alignment pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AlignReport {
    pub sells: usize,
    pub buys: usize,
    pub cancelled_buys: usize,
    /// Target tranches that could not be bought for lack of a free tranche.
    pub shortfall: usize,
}

impl AlignReport {
    pub fn order_count(&self) -> usize {
        self.sells + self.buys + self.cancelled_buys
    }
}

pub struct TradingModel<'a> {
    source: &'a dyn PriceSource,
    config: ModelConfig,
    status: ModelStatus,
    calendar: Vec<NaiveDate>,
    day_index: usize,
    current_date: NaiveDate,
    end_date: NaiveDate,
    portfolio: Portfolio,
    pending: Vec<Order>,
    next_order_id: OrderId,
}

impl<'a> TradingModel<'a> {
    /// Build a model over the starting ticker's trading days in
    /// `[start, start + duration)`. A ticker with no days there yields a
    /// model in [`ModelStatus::NotReady`]; price source failures are errors.
    pub fn new(source: &'a dyn PriceSource, config: ModelConfig) -> Result<Self, PmTraderError> {
        let end_date = config.end_date();
        let calendar = source.trading_days(&config.starting_ticker, config.start_date, end_date)?;
        let portfolio = Portfolio::new(config.total_funds, config.tranche_sizing);

        let (status, current_date) = match calendar.first() {
            Some(&first) => (ModelStatus::Ready, first),
            None => {
                warn!(
                    model = %config.name,
                    ticker = %config.starting_ticker,
                    start = %config.start_date,
                    "Unable to initialize price history"
                );
                (ModelStatus::NotReady, config.start_date)
            }
        };

        if status == ModelStatus::Ready {
            info!(
                model = %config.name,
                start = %current_date,
                end = %end_date,
                trading_days = calendar.len(),
                tranches = portfolio.tranche_count(),
                "Model ready"
            );
        }

        Ok(TradingModel {
            source,
            config,
            status,
            calendar,
            day_index: 0,
            current_date,
            end_date,
            portfolio,
            pending: Vec::new(),
            next_order_id: 1,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn status(&self) -> ModelStatus {
        self.status
    }

    pub fn is_ready(&self) -> bool {
        self.status != ModelStatus::NotReady
    }

    pub fn current_date(&self) -> NaiveDate {
        self.current_date
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    pub fn tranche_count(&self) -> usize {
        self.portfolio.tranche_count()
    }

    pub fn pending_orders(&self) -> &[Order] {
        &self.pending
    }

    pub fn positions(&self) -> &BTreeMap<String, Position> {
        &self.portfolio.positions
    }

    pub fn closed_trades(&self) -> &[ClosedTrade] {
        &self.portfolio.closed_trades
    }

    /// The append-only end-of-day valuation history.
    pub fn daily_values(&self) -> &[DailyValue] {
        &self.portfolio.daily_values
    }

    fn ensure_open(&self, operation: &'static str) -> Result<(), ModelError> {
        if self.status == ModelStatus::Closed {
            return Err(ModelError::InvalidState {
                operation,
                status: self.status,
            });
        }
        Ok(())
    }

    fn next_id(&mut self) -> OrderId {
        let id = self.next_order_id;
        self.next_order_id += 1;
        id
    }

    /// Queue a buy sized to one free tranche.
    pub fn place_buy(
        &mut self,
        ticker: &str,
        kind: OrderKind,
        expire_after_days: u32,
    ) -> Result<BuyOutcome, PmTraderError> {
        self.ensure_open("place_buy")?;
        if self.status == ModelStatus::NotReady {
            return Ok(BuyOutcome::ModelNotReady);
        }
        let Some(tranche) = self.portfolio.free_tranche() else {
            return Ok(BuyOutcome::NoTrancheAvailable);
        };

        let id = self.queue_order(ticker, OrderSide::Buy, kind, expire_after_days, tranche);
        self.portfolio
            .set_tranche_state(tranche, TrancheState::PendingBuy(id));
        Ok(BuyOutcome::Queued(id))
    }

    /// Queue a sell of the most recently bought held lot of `ticker`.
    pub fn place_sell(
        &mut self,
        ticker: &str,
        kind: OrderKind,
        expire_after_days: u32,
    ) -> Result<SellOutcome, PmTraderError> {
        self.ensure_open("place_sell")?;
        if self.status == ModelStatus::NotReady {
            return Ok(SellOutcome::ModelNotReady);
        }
        let Some(tranche) = self.held_lots(ticker).last().copied() else {
            return Ok(SellOutcome::NoLotAvailable);
        };

        let id = self.queue_order(ticker, OrderSide::Sell, kind, expire_after_days, tranche);
        self.portfolio
            .set_tranche_state(tranche, TrancheState::PendingSell(id));
        Ok(SellOutcome::Queued(id))
    }

    fn queue_order(
        &mut self,
        ticker: &str,
        side: OrderSide,
        kind: OrderKind,
        expire_after_days: u32,
        tranche: TrancheId,
    ) -> OrderId {
        let id = self.next_id();
        trade_event!(
            self.config.verbose,
            model = %self.config.name,
            date = %self.current_date,
            order = id,
            %side,
            ticker,
            ?kind,
            expire_after_days,
            "Order placed"
        );
        self.pending.push(Order {
            id,
            ticker: ticker.to_string(),
            side,
            kind,
            placed_on: self.current_date,
            expire_after_days,
            age_days: 0,
            tranche,
        });
        id
    }

    /// Tranches of held lots of `ticker` with no pending sale, oldest first.
    fn held_lots(&self, ticker: &str) -> Vec<TrancheId> {
        self.portfolio
            .positions
            .get(ticker)
            .map(|pos| {
                pos.lots
                    .iter()
                    .map(|l| l.tranche)
                    .filter(|&t| self.portfolio.tranche(t).state == TrancheState::Held)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn cancel_order(&mut self, id: OrderId) -> Option<Order> {
        let idx = self.pending.iter().position(|o| o.id == id)?;
        let order = self.pending.remove(idx);
        let released = match order.side {
            OrderSide::Buy => TrancheState::Free,
            OrderSide::Sell => TrancheState::Held,
        };
        self.portfolio.set_tranche_state(order.tranche, released);
        Some(order)
    }

    fn cancel_pending(&mut self, side: Option<OrderSide>) -> usize {
        let ids: Vec<OrderId> = self
            .pending
            .iter()
            .filter(|o| side.is_none_or(|s| o.side == s))
            .map(|o| o.id)
            .collect();
        ids.into_iter()
            .filter_map(|id| self.cancel_order(id))
            .count()
    }

    /// Close price on `date`, falling back to the last price seen for the
    /// ticker, then to its entry price. The flag is set when the price came
    /// from a bar on `date`.
    fn liquidation_price(
        &self,
        ticker: &str,
        date: NaiveDate,
    ) -> Result<(f64, bool), PmTraderError> {
        if let Some(bar) = self.source.price_on(ticker, date)? {
            return Ok((bar.close, true));
        }
        let fallback = self.portfolio.last_price(ticker).unwrap_or_else(|| {
            self.portfolio
                .positions
                .get(ticker)
                .map(Position::entry_price)
                .unwrap_or(0.0)
        });
        Ok((fallback, false))
    }

    fn liquidate_all(&mut self, date: NaiveDate) -> Result<usize, PmTraderError> {
        let mut holdings = Vec::with_capacity(self.portfolio.positions.len());
        for position in self.portfolio.positions.values() {
            let (price, quoted) = self.liquidation_price(&position.ticker, date)?;
            holdings.push((position.ticker.clone(), position.tranches(), price, quoted));
        }
        self.cancel_pending(Some(OrderSide::Sell));

        let mut sold = 0;
        for (ticker, tranches, price, quoted) in holdings {
            if quoted {
                self.portfolio.mark_price(&ticker, price);
            }
            for tranche in tranches {
                if let Some(trade) =
                    self.portfolio
                        .close_lot(&ticker, tranche, price, date, &self.config.execution)
                {
                    trade_event!(
                        self.config.verbose,
                        model = %self.config.name,
                        %date,
                        ticker = %trade.ticker,
                        price = trade.exit_price,
                        pnl = trade.pnl,
                        "Position liquidated"
                    );
                    sold += 1;
                }
            }
        }
        Ok(sold)
    }

    /// Sell every held lot at the best available price on `date` and free
    /// their tranches. Pending sells are cancelled first; pending buys stay.
    /// Returns the number of lots sold.
    pub fn sell_all_positions(&mut self, date: NaiveDate) -> Result<usize, PmTraderError> {
        self.ensure_open("sell_all_positions")?;
        if self.status == ModelStatus::NotReady {
            return Ok(0);
        }
        self.liquidate_all(date)
    }

    /// Reconcile holdings with `target`.
    ///
    /// Exposure per ticker counts held lots without a pending sale plus
    /// pending buys. Tickers over target first lose pending buys, then sell
    /// their newest lots; tickers absent from the target are sold out.
    /// Tickers under target buy while free tranches remain, largest target
    /// first. Tranches left over stay in cash. A second call with the same
    /// target emits nothing.
    pub fn align_positions(
        &mut self,
        target: &TargetAllocation,
    ) -> Result<AlignReport, PmTraderError> {
        self.ensure_open("align_positions")?;
        let mut report = AlignReport::default();
        if self.status == ModelStatus::NotReady {
            return Ok(report);
        }

        let desired = target.tranche_counts(self.portfolio.tranche_count());
        let expiry = self.config.order_expiry_days;

        let mut tickers: Vec<String> = self.portfolio.positions.keys().cloned().collect();
        tickers.extend(self.pending.iter().map(|o| o.ticker.clone()));
        tickers.sort();
        tickers.dedup();

        for ticker in &tickers {
            let want = desired.get(ticker).copied().unwrap_or(0);
            let mut pending_buys: Vec<OrderId> = self
                .pending
                .iter()
                .filter(|o| o.side == OrderSide::Buy && &o.ticker == ticker)
                .map(|o| o.id)
                .collect();
            let mut held = self.held_lots(ticker);
            let mut exposure = held.len() + pending_buys.len();

            while exposure > want {
                if let Some(id) = pending_buys.pop() {
                    self.cancel_order(id);
                    report.cancelled_buys += 1;
                } else if let Some(tranche) = held.pop() {
                    let id =
                        self.queue_order(ticker, OrderSide::Sell, OrderKind::Market, expiry, tranche);
                    self.portfolio
                        .set_tranche_state(tranche, TrancheState::PendingSell(id));
                    report.sells += 1;
                } else {
                    break;
                }
                exposure -= 1;
            }
        }

        let mut wanted: Vec<(&String, usize)> = desired.iter().map(|(t, n)| (t, *n)).collect();
        wanted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        for (ticker, want) in wanted {
            let exposure = self.held_lots(ticker).len()
                + self
                    .pending
                    .iter()
                    .filter(|o| o.side == OrderSide::Buy && &o.ticker == ticker)
                    .count();
            for _ in exposure..want {
                match self.place_buy(ticker, OrderKind::Market, expiry)? {
                    BuyOutcome::Queued(_) => report.buys += 1,
                    _ => report.shortfall += 1,
                }
            }
        }

        trade_event!(
            self.config.verbose,
            model = %self.config.name,
            date = %self.current_date,
            sells = report.sells,
            buys = report.buys,
            cancelled = report.cancelled_buys,
            shortfall = report.shortfall,
            "Positions aligned"
        );
        Ok(report)
    }

    /// Advance one trading day, resolve every pending order against the new
    /// day's prices and append a valuation snapshot.
    ///
    /// Every price the day needs is fetched before any state changes, so a
    /// failed lookup leaves the model on the previous day with its orders
    /// and tranches untouched.
    pub fn process_day(&mut self) -> Result<(), PmTraderError> {
        self.ensure_open("process_day")?;
        if self.status == ModelStatus::NotReady || self.model_completed() {
            return Ok(());
        }

        let next_index = self.day_index + 1;
        let next_date = self
            .calendar
            .get(next_index)
            .copied()
            .unwrap_or(self.end_date);
        let bars = self.fetch_day_bars(next_date)?;

        self.status = ModelStatus::Running;
        self.day_index = next_index;
        self.current_date = next_date;

        self.resolve_orders(&bars);
        self.mark_holdings(&bars);
        self.portfolio.record_value(self.current_date);
        Ok(())
    }

    /// Bars on `date` for every ticker with a pending order or a position.
    fn fetch_day_bars(
        &self,
        date: NaiveDate,
    ) -> Result<HashMap<String, Option<PriceBar>>, PmTraderError> {
        let mut bars = HashMap::new();
        let tickers = self
            .pending
            .iter()
            .map(|o| &o.ticker)
            .chain(self.portfolio.positions.keys());
        for ticker in tickers {
            if !bars.contains_key(ticker) {
                let bar = self.source.price_on(ticker, date)?;
                bars.insert(ticker.clone(), bar);
            }
        }
        Ok(bars)
    }

    fn resolve_orders(&mut self, bars: &HashMap<String, Option<PriceBar>>) {
        let orders = std::mem::take(&mut self.pending);
        let mut still_pending = Vec::with_capacity(orders.len());

        for mut order in orders {
            let price = bars
                .get(&order.ticker)
                .and_then(Option::as_ref)
                .and_then(|b| fill_price(order.side, order.kind, b, &self.config.execution));

            match price {
                Some(price) => self.fill(&order, price),
                None if order.age_one_day() => self.expire(&order),
                None => still_pending.push(order),
            }
        }

        // fills never queue new orders, so nothing was added meanwhile
        self.pending = still_pending;
    }

    fn fill(&mut self, order: &Order, price: f64) {
        let date = self.current_date;
        match order.side {
            OrderSide::Buy => {
                let budget = self
                    .portfolio
                    .tranche(order.tranche)
                    .size
                    .min(self.portfolio.cash);
                let Some((shares, commission)) =
                    shares_for_budget(budget, price, &self.config.execution)
                else {
                    warn!(
                        model = %self.config.name,
                        %date,
                        ticker = %order.ticker,
                        cash = self.portfolio.cash,
                        "Insufficient cash to fill buy, releasing tranche"
                    );
                    self.portfolio
                        .set_tranche_state(order.tranche, TrancheState::Free);
                    return;
                };
                self.portfolio.cash -= budget;
                self.portfolio.add_lot(
                    &order.ticker,
                    Lot {
                        tranche: order.tranche,
                        shares,
                        entry_price: price,
                        entry_date: date,
                        entry_commission: commission,
                    },
                    price,
                );
                trade_event!(
                    self.config.verbose,
                    model = %self.config.name,
                    %date,
                    order = order.id,
                    ticker = %order.ticker,
                    price,
                    shares,
                    "Buy filled"
                );
            }
            OrderSide::Sell => {
                if let Some(trade) = self.portfolio.close_lot(
                    &order.ticker,
                    order.tranche,
                    price,
                    date,
                    &self.config.execution,
                ) {
                    trade_event!(
                        self.config.verbose,
                        model = %self.config.name,
                        %date,
                        order = order.id,
                        ticker = %order.ticker,
                        price,
                        pnl = trade.pnl,
                        "Sell filled"
                    );
                }
            }
        }
    }

    fn expire(&mut self, order: &Order) {
        let released = match order.side {
            OrderSide::Buy => TrancheState::Free,
            OrderSide::Sell => TrancheState::Held,
        };
        self.portfolio.set_tranche_state(order.tranche, released);
        trade_event!(
            self.config.verbose,
            model = %self.config.name,
            date = %self.current_date,
            order = order.id,
            side = %order.side,
            ticker = %order.ticker,
            "Order expired"
        );
    }

    fn mark_holdings(&mut self, bars: &HashMap<String, Option<PriceBar>>) {
        for (ticker, bar) in bars {
            if let Some(bar) = bar {
                if self.portfolio.has_position(ticker) {
                    self.portfolio.mark_price(ticker, bar.close);
                }
            }
        }
    }

    /// `(cash, assets)` with positions marked at their last known close.
    pub fn value(&self) -> (f64, f64) {
        if self.status == ModelStatus::NotReady {
            return (0.0, 0.0);
        }
        (self.portfolio.cash, self.portfolio.asset_value())
    }

    pub fn position_summary(&self) -> PositionSummary {
        let mut summary = PositionSummary::default();
        if self.status == ModelStatus::NotReady {
            return summary;
        }
        for tranche in &self.portfolio.tranches {
            match tranche.state {
                TrancheState::Free => summary.available += 1,
                TrancheState::PendingBuy(_) => summary.buy_pending += 1,
                TrancheState::PendingSell(_) => summary.sell_pending += 1,
                TrancheState::Held => summary.long += 1,
            }
        }
        summary
    }

    pub fn tranches_available(&self) -> bool {
        matches!(self.status, ModelStatus::Ready | ModelStatus::Running)
            && self.portfolio.free_tranche().is_some()
    }

    pub fn model_completed(&self) -> bool {
        match self.status {
            ModelStatus::NotReady | ModelStatus::Closed => true,
            ModelStatus::Ready | ModelStatus::Running => self.current_date >= self.end_date,
        }
    }

    /// Cancel pending orders, liquidate at the current date, append the final
    /// snapshot and return the ending value. Only valid once.
    pub fn close_model(&mut self) -> Result<f64, PmTraderError> {
        self.ensure_open("close_model")?;
        if self.status == ModelStatus::NotReady {
            self.status = ModelStatus::Closed;
            return Ok(0.0);
        }

        let cancelled = self.cancel_pending(None);
        let date = self.current_date;
        self.liquidate_all(date)?;
        self.portfolio.record_value(date);
        self.status = ModelStatus::Closed;

        let ending = self.portfolio.total_value();
        info!(
            model = %self.config.name,
            %date,
            ending_value = ending,
            cancelled_orders = cancelled,
            trades = self.portfolio.closed_trades.len(),
            "Model closed"
        );
        Ok(ending)
    }
}
