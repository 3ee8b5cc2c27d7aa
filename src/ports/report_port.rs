//! Tabular output port for run artifacts.

use crate::domain::error::PmTraderError;
use crate::domain::runner::ComparisonRow;
use crate::domain::stock_picker::RankedCandidate;
use crate::domain::trading_model::DailyValue;

/// Port for persisting the data the drivers produce.
pub trait ReportPort {
    fn write_daily_values(&self, model_name: &str, values: &[DailyValue])
    -> Result<(), PmTraderError>;

    fn write_candidates(&self, name: &str, candidates: &[RankedCandidate])
    -> Result<(), PmTraderError>;

    fn write_comparison(&self, name: &str, rows: &[ComparisonRow]) -> Result<(), PmTraderError>;
}
