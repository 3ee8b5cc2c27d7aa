//! Capital tranches: the unit of position sizing.

use std::fmt;

use super::order::OrderId;

pub type TrancheId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrancheState {
    /// Backing uninvested cash.
    Free,
    /// Committed to a pending buy order.
    PendingBuy(OrderId),
    /// Bound to a held lot.
    Held,
    /// Bound to a held lot that has a pending sell order.
    PendingSell(OrderId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tranche {
    pub id: TrancheId,
    pub size: f64,
    pub state: TrancheState,
}

impl Tranche {
    pub fn is_free(&self) -> bool {
        self.state == TrancheState::Free
    }

    /// Held or pending sale: the tranche backs an open lot.
    pub fn is_bound(&self) -> bool {
        matches!(self.state, TrancheState::Held | TrancheState::PendingSell(_))
    }
}

/// How total funds are split into tranches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrancheSizing {
    /// `total / n` per tranche.
    Count(usize),
    /// Fixed amount per tranche; `floor(total / amount)` tranches, at least one.
    Size(f64),
}

impl TrancheSizing {
    pub fn build(&self, total_funds: f64) -> Vec<Tranche> {
        let (count, size) = match *self {
            TrancheSizing::Count(n) => {
                let n = n.max(1);
                (n, total_funds / n as f64)
            }
            TrancheSizing::Size(amount) if amount > 0.0 => {
                let n = ((total_funds / amount).floor() as usize).max(1);
                (n, amount)
            }
            TrancheSizing::Size(_) => (1, total_funds),
        };
        (0..count)
            .map(|id| Tranche {
                id,
                size,
                state: TrancheState::Free,
            })
            .collect()
    }
}

impl fmt::Display for TrancheSizing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrancheSizing::Count(n) => write!(f, "{} tranches", n),
            TrancheSizing::Size(amount) => write!(f, "tranches of {:.2}", amount),
        }
    }
}
