//! Domain error types.

use super::trading_model::ModelStatus;

/// Hard failures raised by the trading model.
///
/// Capacity problems and missing prices are not errors: they surface as
/// [`BuyOutcome`](super::trading_model::BuyOutcome) variants or are recovered
/// by carrying the last known price forward.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("{operation} is not valid while the model is {status}")]
    InvalidState {
        operation: &'static str,
        status: ModelStatus,
    },
}

/// Top-level error type for pmtrader.
#[derive(Debug, thiserror::Error)]
pub enum PmTraderError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("price data error: {reason}")]
    PriceData { reason: String },

    #[error("no price data for {ticker} on or after {date}")]
    NoData {
        ticker: String,
        date: chrono::NaiveDate,
    },

    #[error("insufficient data for {ticker}: have {points} points, need {minimum}")]
    InsufficientData {
        ticker: String,
        points: usize,
        minimum: usize,
    },

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&PmTraderError> for std::process::ExitCode {
    fn from(err: &PmTraderError) -> Self {
        let code: u8 = match err {
            PmTraderError::Io(_) | PmTraderError::Csv(_) => 1,
            PmTraderError::ConfigParse { .. }
            | PmTraderError::ConfigMissing { .. }
            | PmTraderError::ConfigInvalid { .. } => 2,
            PmTraderError::PriceData { .. } => 3,
            PmTraderError::Model(_) => 4,
            PmTraderError::NoData { .. } | PmTraderError::InsufficientData { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
