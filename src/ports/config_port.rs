//! Configuration access port trait.

use crate::domain::error::PmTraderError;

/// Section/key lookups over a loaded configuration. Typed getters fall back
/// to `default` when the key is absent or does not parse.
pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64;
    fn get_double(&self, section: &str, key: &str, default: f64) -> f64;
    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool;

    /// Trimmed value of a key that must be present and non-blank.
    fn require_string(&self, section: &str, key: &str) -> Result<String, PmTraderError> {
        self.get_string(section, key)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| PmTraderError::ConfigMissing {
                section: section.to_string(),
                key: key.to_string(),
            })
    }
}
