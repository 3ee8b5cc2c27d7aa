//! Ticker universe parsing and screening.
//!
//! Parses ticker lists from configuration and drops tickers without enough
//! price history in the run window.

use crate::domain::error::PmTraderError;
use crate::ports::price_port::PriceSource;
use chrono::NaiveDate;
use std::collections::HashSet;
use tracing::{info, warn};

pub const MIN_PRICE_BARS: usize = 30;

#[derive(Debug, Clone, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in ticker list")]
    EmptyToken,

    #[error("duplicate ticker: {0}")]
    DuplicateTicker(String),
}

/// Split a comma-separated ticker list, upper-casing each symbol.
pub fn parse_tickers(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut tickers = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let ticker = trimmed.to_uppercase();
        if !seen.insert(ticker.clone()) {
            return Err(UniverseError::DuplicateTicker(ticker));
        }
        tickers.push(ticker);
    }

    Ok(tickers)
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    NoData,
    InsufficientBars { bars: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedTicker {
    pub ticker: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScreenedUniverse {
    pub tickers: Vec<String>,
    pub skipped: Vec<SkippedTicker>,
}

/// Keep tickers with at least [`MIN_PRICE_BARS`] bars in `[start, end)`.
/// Fails with `InsufficientData` when nothing survives.
pub fn screen_universe(
    source: &dyn PriceSource,
    tickers: Vec<String>,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<ScreenedUniverse, PmTraderError> {
    let total = tickers.len();
    let mut kept = Vec::new();
    let mut skipped = Vec::new();

    for ticker in tickers {
        let bars = source.trading_days(&ticker, start, end)?.len();
        let reason = match bars {
            0 => Some(SkipReason::NoData),
            n if n < MIN_PRICE_BARS => Some(SkipReason::InsufficientBars { bars: n }),
            _ => None,
        };
        match reason {
            Some(reason) => {
                warn!(%ticker, ?reason, "Skipping ticker");
                skipped.push(SkippedTicker { ticker, reason });
            }
            None => kept.push(ticker),
        }
    }

    if kept.is_empty() {
        return Err(PmTraderError::InsufficientData {
            ticker: "all".to_string(),
            points: 0,
            minimum: MIN_PRICE_BARS,
        });
    }
    if !skipped.is_empty() {
        info!(kept = kept.len(), total, "Screened ticker universe");
    }

    Ok(ScreenedUniverse {
        tickers: kept,
        skipped,
    })
}
