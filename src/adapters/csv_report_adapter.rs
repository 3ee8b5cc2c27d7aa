//! CSV report adapter implementing ReportPort.
//!
//! Writes one file per artifact under the output directory:
//! `<name>_daily.csv`, `<name>_picks.csv` and `<name>_compare.csv`.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use crate::domain::error::PmTraderError;
use crate::domain::runner::ComparisonRow;
use crate::domain::stock_picker::RankedCandidate;
use crate::domain::trading_model::DailyValue;
use crate::ports::report_port::ReportPort;

#[derive(Serialize)]
struct DailyValueRow {
    date: NaiveDate,
    cash: f64,
    assets: f64,
    total: f64,
}

#[derive(Serialize)]
struct CandidateRow<'a> {
    rank: usize,
    ticker: &'a str,
    long_return: f64,
    short_return: f64,
    volatility: f64,
    point_value: f64,
    filter: String,
}

pub struct CsvReportAdapter {
    output_dir: PathBuf,
}

impl CsvReportAdapter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Path of the report `name` with `suffix`, with path separators in the
    /// name replaced so every report stays inside the output directory.
    pub fn report_path(&self, name: &str, suffix: &str) -> PathBuf {
        let stem: String = name
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        self.output_dir.join(format!("{}_{}.csv", stem, suffix))
    }

    fn write_rows<T, I>(&self, path: &Path, rows: I) -> Result<(), PmTraderError>
    where
        T: Serialize,
        I: IntoIterator<Item = T>,
    {
        fs::create_dir_all(&self.output_dir)?;
        let mut writer = csv::Writer::from_path(path)?;
        let mut count = 0usize;
        for row in rows {
            writer.serialize(row)?;
            count += 1;
        }
        writer.flush()?;
        info!(path = %path.display(), rows = count, "Report written");
        Ok(())
    }
}

impl ReportPort for CsvReportAdapter {
    fn write_daily_values(
        &self,
        model_name: &str,
        values: &[DailyValue],
    ) -> Result<(), PmTraderError> {
        let path = self.report_path(model_name, "daily");
        self.write_rows(
            &path,
            values.iter().map(|v| DailyValueRow {
                date: v.date,
                cash: v.cash,
                assets: v.assets,
                total: v.total(),
            }),
        )
    }

    fn write_candidates(
        &self,
        name: &str,
        candidates: &[RankedCandidate],
    ) -> Result<(), PmTraderError> {
        let path = self.report_path(name, "picks");
        self.write_rows(
            &path,
            candidates.iter().enumerate().map(|(i, c)| CandidateRow {
                rank: i + 1,
                ticker: &c.ticker,
                long_return: c.long_return,
                short_return: c.short_return,
                volatility: c.volatility,
                point_value: c.point_value,
                filter: c.filter.to_string(),
            }),
        )
    }

    fn write_comparison(&self, name: &str, rows: &[ComparisonRow]) -> Result<(), PmTraderError> {
        let path = self.report_path(name, "compare");
        self.write_rows(&path, rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::filter::FilterOption;
    use tempfile::TempDir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn writes_daily_values_with_total() {
        let dir = TempDir::new().unwrap();
        let adapter = CsvReportAdapter::new(dir.path());
        let values = vec![
            DailyValue {
                date: date(2020, 1, 2),
                cash: 100.0,
                assets: 0.0,
            },
            DailyValue {
                date: date(2020, 1, 3),
                cash: 0.0,
                assets: 110.5,
            },
        ];
        adapter.write_daily_values("BuyHold_MSFT_2020", &values).unwrap();

        let contents =
            fs::read_to_string(dir.path().join("BuyHold_MSFT_2020_daily.csv")).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], "date,cash,assets,total");
        assert_eq!(lines[1], "2020-01-02,100.0,0.0,100.0");
        assert_eq!(lines[2], "2020-01-03,0.0,110.5,110.5");
    }

    #[test]
    fn writes_ranked_candidates() {
        let dir = TempDir::new().unwrap();
        let adapter = CsvReportAdapter::new(dir.path().join("nested"));
        let picks = vec![RankedCandidate {
            ticker: "UP".to_string(),
            long_return: 0.2,
            short_return: 0.01,
            volatility: 0.0,
            point_value: 1.0,
            filter: FilterOption::SteadyGain,
        }];
        adapter.write_candidates("picks_2024-01-01", &picks).unwrap();

        let contents =
            fs::read_to_string(dir.path().join("nested/picks_2024-01-01_picks.csv")).unwrap();
        assert!(contents.starts_with("rank,ticker,long_return"));
        assert!(contents.contains("1,UP,0.2,0.01,0.0,1.0,steady-gain"));
    }

    #[test]
    fn writes_comparison_rows() {
        let dir = TempDir::new().unwrap();
        let adapter = CsvReportAdapter::new(dir.path());
        let rows = vec![ComparisonRow {
            start_date: date(1982, 1, 2),
            duration_years: 6,
            baseline_ending_value: 30000.0,
            challenger_ending_value: 33000.0,
            baseline_gain: 0.0,
            challenger_gain: 0.1,
            difference: 0.1,
        }];
        adapter.write_comparison("cmp", &rows).unwrap();

        let contents = fs::read_to_string(dir.path().join("cmp_compare.csv")).unwrap();
        assert!(contents.starts_with("start_date,duration_years,baseline_ending_value"));
        assert!(contents.contains("1982-01-02,6,30000.0,33000.0,0.0,0.1,0.1"));
    }

    #[test]
    fn report_path_stays_in_output_dir() {
        let adapter = CsvReportAdapter::new("/tmp/out");
        assert_eq!(
            adapter.report_path("a/b", "daily"),
            PathBuf::from("/tmp/out/a_b_daily.csv")
        );
    }
}
