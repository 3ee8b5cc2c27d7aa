//! Mapping ranked candidates onto tranches.
//!
//! Two policies are supported: a target allocation reconciled by
//! `TradingModel::align_positions`, and round-robin assignment of free
//! tranches across a fixed candidate list.

use std::collections::BTreeMap;

use super::stock_picker::RankedCandidate;

/// Upper bound on buy placements in one round-robin pass.
pub const MAX_PLACEMENTS: usize = 100;

/// Desired holdings, by weight or by explicit tranche count.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetAllocation {
    Weights(BTreeMap<String, f64>),
    Counts(BTreeMap<String, usize>),
}

impl TargetAllocation {
    pub fn empty() -> Self {
        TargetAllocation::Counts(BTreeMap::new())
    }

    /// Weights from point values; a ticker listed more than once accumulates.
    pub fn from_candidates(candidates: &[RankedCandidate]) -> Self {
        let mut weights = BTreeMap::new();
        for c in candidates {
            *weights.entry(c.ticker.clone()).or_insert(0.0) += c.point_value;
        }
        TargetAllocation::Weights(weights)
    }

    /// Resolve to a tranche count per ticker given `total` tranches.
    pub fn tranche_counts(&self, total: usize) -> BTreeMap<String, usize> {
        match self {
            TargetAllocation::Counts(counts) => counts
                .iter()
                .filter(|(_, n)| **n > 0)
                .map(|(t, n)| (t.clone(), *n))
                .collect(),
            TargetAllocation::Weights(weights) => largest_remainder(weights, total),
        }
    }
}

/// Split `total` units across positive weights by the largest-remainder
/// method. Ties on remainder go to the larger weight, then the smaller ticker.
pub fn largest_remainder(weights: &BTreeMap<String, f64>, total: usize) -> BTreeMap<String, usize> {
    let positive: Vec<(&String, f64)> = weights
        .iter()
        .filter(|(_, w)| w.is_finite() && **w > 0.0)
        .map(|(t, w)| (t, *w))
        .collect();
    let sum: f64 = positive.iter().map(|(_, w)| w).sum();
    if positive.is_empty() || sum <= 0.0 || total == 0 {
        return BTreeMap::new();
    }

    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut remainders = Vec::with_capacity(positive.len());
    let mut assigned = 0usize;
    for (ticker, weight) in &positive {
        let quota = weight / sum * total as f64;
        let whole = quota.floor() as usize;
        assigned += whole;
        counts.insert((*ticker).clone(), whole);
        remainders.push((quota - whole as f64, *weight, *ticker));
    }

    remainders.sort_by(|a, b| {
        b.0.total_cmp(&a.0)
            .then_with(|| b.1.total_cmp(&a.1))
            .then_with(|| a.2.cmp(b.2))
    });
    for (_, _, ticker) in remainders.iter().take(total.saturating_sub(assigned)) {
        if let Some(n) = counts.get_mut(*ticker) {
            *n += 1;
        }
    }

    counts.retain(|_, n| *n > 0);
    counts
}

/// Assign `slots` free tranches across `tickers` in order, wrapping to the
/// start of the list when there are more slots than candidates. Capped at
/// [`MAX_PLACEMENTS`].
pub fn round_robin(tickers: &[String], slots: usize) -> Vec<String> {
    if tickers.is_empty() {
        return Vec::new();
    }
    tickers
        .iter()
        .cycle()
        .take(slots.min(MAX_PLACEMENTS))
        .cloned()
        .collect()
}
