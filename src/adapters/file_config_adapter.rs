//! INI file configuration adapter.

use crate::domain::error::PmTraderError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

#[derive(Debug)]
pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, PmTraderError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config
            .load(path)
            .map_err(|reason| PmTraderError::ConfigParse {
                file: path.display().to_string(),
                reason,
            })?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, PmTraderError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| PmTraderError::ConfigParse {
                file: "<string>".to_string(),
                reason,
            })?;
        Ok(Self { config })
    }

    pub fn has_section(&self, section: &str) -> bool {
        self.config
            .sections()
            .iter()
            .any(|s| s.eq_ignore_ascii_case(section))
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.trim().to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.config
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.config
            .get(section, key)
            .as_deref()
            .and_then(Self::parse_bool)
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    const SAMPLE: &str = r#"
[data]
price_dir = data/prices

[model]
name = Momentum Run
start_date = 1982-01-04
total_funds = 30000.0
tranche_count = 10
verbose = yes

[momentum]
tickers = MSFT, AAPL, ^SPX
filter_option = 3
blended = off
"#;

    #[test]
    fn from_string_parses_sections() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert_eq!(
            adapter.get_string("data", "price_dir"),
            Some("data/prices".to_string())
        );
        assert_eq!(
            adapter.get_string("model", "name"),
            Some("Momentum Run".to_string())
        );
        assert_eq!(
            adapter.get_string("momentum", "tickers"),
            Some("MSFT, AAPL, ^SPX".to_string())
        );
    }

    #[test]
    fn get_string_returns_none_for_missing_key() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert_eq!(adapter.get_string("model", "missing"), None);
        assert_eq!(adapter.get_string("missing_section", "key"), None);
    }

    #[test]
    fn numeric_getters() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert_eq!(adapter.get_int("model", "tranche_count", 0), 10);
        assert_eq!(adapter.get_int("model", "missing", 42), 42);
        assert_eq!(adapter.get_double("model", "total_funds", 0.0), 30000.0);
        assert_eq!(adapter.get_double("model", "missing", 99.9), 99.9);
    }

    #[test]
    fn numeric_getters_fall_back_on_garbage() {
        let adapter =
            FileConfigAdapter::from_string("[model]\ntranche_count = ten\ntotal_funds = lots\n")
                .unwrap();
        assert_eq!(adapter.get_int("model", "tranche_count", 7), 7);
        assert_eq!(adapter.get_double("model", "total_funds", 1.5), 1.5);
    }

    #[test]
    fn get_bool_variants() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert!(adapter.get_bool("model", "verbose", false));
        assert!(!adapter.get_bool("momentum", "blended", true));
        assert!(adapter.get_bool("momentum", "missing", true));
        assert!(!adapter.get_bool("momentum", "tickers", false));
    }

    #[test]
    fn has_section_is_case_insensitive() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert!(adapter.has_section("momentum"));
        assert!(adapter.has_section("MODEL"));
        assert!(!adapter.has_section("compare"));
    }

    #[test]
    fn from_file_reads_config() {
        let file = create_temp_config(SAMPLE);
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(adapter.get_int("momentum", "filter_option", 0), 3);
    }

    #[test]
    fn from_file_missing_is_config_parse_error() {
        let err = FileConfigAdapter::from_file("/nonexistent/path/config.ini").unwrap_err();
        assert!(
            matches!(err, PmTraderError::ConfigParse { file, .. } if file.ends_with("config.ini"))
        );
    }
}
