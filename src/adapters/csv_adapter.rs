//! CSV price file adapter.
//!
//! One file per ticker at `<base>/<TICKER>.csv` with columns
//! `date,open,high,low,close,volume` and ISO dates. Each file is parsed once
//! and kept for the life of the adapter.

use crate::domain::error::PmTraderError;
use crate::domain::price::{PriceBar, PriceHistory, PricePoint};
use crate::ports::price_port::PriceSource;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

pub struct CsvPriceAdapter {
    base_path: PathBuf,
    cache: RwLock<HashMap<String, Option<Arc<PriceHistory>>>>,
}

impl CsvPriceAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self {
            base_path,
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn csv_path(&self, ticker: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", ticker))
    }

    /// Parsed history for `ticker`, or `None` when no file exists.
    pub fn history(&self, ticker: &str) -> Result<Option<Arc<PriceHistory>>, PmTraderError> {
        if let Some(cached) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(ticker)
        {
            return Ok(cached.clone());
        }

        let loaded = self.load(ticker)?.map(Arc::new);
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(ticker.to_string(), loaded.clone());
        Ok(loaded)
    }

    fn load(&self, ticker: &str) -> Result<Option<PriceHistory>, PmTraderError> {
        let path = self.csv_path(ticker);
        if !path.exists() {
            debug!(ticker, path = %path.display(), "No price file");
            return Ok(None);
        }
        let content = fs::read_to_string(&path).map_err(|e| PmTraderError::PriceData {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();
        for (line, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| PmTraderError::PriceData {
                reason: format!("{}: CSV parse error: {}", path.display(), e),
            })?;
            bars.push(parse_bar(&record).map_err(|reason| PmTraderError::PriceData {
                reason: format!("{} row {}: {}", path.display(), line + 2, reason),
            })?);
        }

        debug!(ticker, bars = bars.len(), "Loaded price file");
        Ok(Some(PriceHistory::new(ticker.to_string(), bars)))
    }

    /// Tickers with a price file in the base directory, sorted.
    pub fn list_tickers(&self) -> Result<Vec<String>, PmTraderError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| PmTraderError::PriceData {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut tickers = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(ticker) = name.to_string_lossy().strip_suffix(".csv") {
                tickers.push(ticker.to_string());
            }
        }
        tickers.sort();
        Ok(tickers)
    }
}

fn field<T: std::str::FromStr>(record: &csv::StringRecord, idx: usize, name: &str) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    record
        .get(idx)
        .ok_or_else(|| format!("missing {} column", name))?
        .trim()
        .parse()
        .map_err(|e| format!("invalid {} value: {}", name, e))
}

fn parse_bar(record: &csv::StringRecord) -> Result<PriceBar, String> {
    let date_str = record.get(0).ok_or("missing date column")?;
    let date = NaiveDate::parse_from_str(date_str.trim(), "%Y-%m-%d")
        .map_err(|e| format!("invalid date format: {}", e))?;
    // volume is optional and sometimes written as a float
    let volume = record
        .get(5)
        .and_then(|v| v.trim().parse::<f64>().ok())
        .map(|v| v as i64)
        .unwrap_or(0);

    Ok(PriceBar {
        date,
        open: field(record, 1, "open")?,
        high: field(record, 2, "high")?,
        low: field(record, 3, "low")?,
        close: field(record, 4, "close")?,
        volume,
    })
}

impl PriceSource for CsvPriceAdapter {
    fn price_on(&self, ticker: &str, date: NaiveDate) -> Result<Option<PriceBar>, PmTraderError> {
        Ok(self
            .history(ticker)?
            .and_then(|h| h.get_bar(date).cloned()))
    }

    fn series_ending_on(
        &self,
        ticker: &str,
        date: NaiveDate,
        lookback_days: u32,
    ) -> Result<Vec<PricePoint>, PmTraderError> {
        Ok(self
            .history(ticker)?
            .map(|h| h.series_ending_on(date, lookback_days))
            .unwrap_or_default())
    }

    fn trading_days(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, PmTraderError> {
        Ok(self
            .history(ticker)?
            .map(|h| h.trading_days(start, end))
            .unwrap_or_default())
    }
}
