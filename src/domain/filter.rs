//! Short-horizon qualification policies applied after long-horizon ranking.
//!
//! Each [`FilterOption`] maps to one [`QualificationPolicy`]. Paces compare
//! returns per calendar day so a 20-day and a 365-day return are comparable.

use std::fmt;

use super::momentum::pace;

/// Measures for one ticker on one date, as seen by a policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MomentumSnapshot {
    pub long_return: f64,
    pub short_return: f64,
    pub volatility: f64,
    pub long_days: u32,
    pub short_days: u32,
}

impl MomentumSnapshot {
    pub fn long_pace(&self) -> f64 {
        pace(self.long_return, self.long_days)
    }

    pub fn short_pace(&self) -> f64 {
        pace(self.short_return, self.short_days)
    }
}

/// Thresholds a policy may consult. Gains and volatility are fractions
/// (0.1 = 10%).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterThresholds {
    pub min_percent_gain: f64,
    pub max_volatility: f64,
}

impl Default for FilterThresholds {
    fn default() -> Self {
        FilterThresholds {
            min_percent_gain: 0.05,
            max_volatility: 0.1,
        }
    }
}

pub trait QualificationPolicy: Send + Sync {
    fn qualifies(&self, snapshot: &MomentumSnapshot, thresholds: &FilterThresholds) -> bool;
}

pub struct NoFilterPolicy;

impl QualificationPolicy for NoFilterPolicy {
    fn qualifies(&self, _: &MomentumSnapshot, _: &FilterThresholds) -> bool {
        true
    }
}

/// Strong long trend whose recent pace has slowed without turning negative.
pub struct PullbackPolicy;

impl QualificationPolicy for PullbackPolicy {
    fn qualifies(&self, s: &MomentumSnapshot, t: &FilterThresholds) -> bool {
        s.long_return > t.min_percent_gain && s.short_return >= 0.0 && s.short_pace() < s.long_pace()
    }
}

pub struct LowVolatilityPolicy;

impl QualificationPolicy for LowVolatilityPolicy {
    fn qualifies(&self, s: &MomentumSnapshot, t: &FilterThresholds) -> bool {
        s.volatility <= t.max_volatility
    }
}

/// Strong long trend still rising at least as fast recently.
pub struct SteadyGainPolicy;

impl QualificationPolicy for SteadyGainPolicy {
    fn qualifies(&self, s: &MomentumSnapshot, t: &FilterThresholds) -> bool {
        s.long_return > t.min_percent_gain
            && s.short_return >= 0.0
            && s.short_pace() >= s.long_pace()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FilterOption {
    NoFilter,
    Pullback,
    LowVolatility,
    SteadyGain,
}

impl FilterOption {
    pub const ALL: [FilterOption; 4] = [
        FilterOption::NoFilter,
        FilterOption::Pullback,
        FilterOption::LowVolatility,
        FilterOption::SteadyGain,
    ];

    /// Numeric codes as used in configuration files.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(FilterOption::NoFilter),
            1 => Some(FilterOption::Pullback),
            2 => Some(FilterOption::LowVolatility),
            3 => Some(FilterOption::SteadyGain),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            FilterOption::NoFilter => 0,
            FilterOption::Pullback => 1,
            FilterOption::LowVolatility => 2,
            FilterOption::SteadyGain => 3,
        }
    }

    pub fn policy(self) -> &'static dyn QualificationPolicy {
        match self {
            FilterOption::NoFilter => &NoFilterPolicy,
            FilterOption::Pullback => &PullbackPolicy,
            FilterOption::LowVolatility => &LowVolatilityPolicy,
            FilterOption::SteadyGain => &SteadyGainPolicy,
        }
    }
}

impl fmt::Display for FilterOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FilterOption::NoFilter => "none",
            FilterOption::Pullback => "pullback",
            FilterOption::LowVolatility => "low-volatility",
            FilterOption::SteadyGain => "steady-gain",
        };
        write!(f, "{}", name)
    }
}
