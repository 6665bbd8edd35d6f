//! User settings for famledger
//!
//! Manages preferences including the currency table, budget defaults and the
//! recurring-expense preview horizon.

use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};

use super::currency::CurrencyTable;
use super::paths::LedgerPaths;
use crate::error::LedgerError;
use crate::models::RecurrencePattern;

/// User settings for famledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Schema version for migration support
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Base currency and conversion rates
    #[serde(default)]
    pub currency: CurrencyTable,

    /// Alert threshold (percent used) for budgets created without one
    #[serde(default = "default_alert_threshold")]
    pub default_alert_threshold: u8,

    /// Period for budgets created without one
    #[serde(default = "default_budget_period")]
    pub default_budget_period: RecurrencePattern,

    /// How many days ahead `recurring preview` looks
    #[serde(default = "default_preview_days")]
    pub preview_days: u32,

    /// strftime format for dates in listings and details
    #[serde(default = "default_date_format")]
    pub date_format: String,
}

fn default_schema_version() -> u32 {
    1
}

fn default_alert_threshold() -> u8 {
    80
}

fn default_budget_period() -> RecurrencePattern {
    RecurrencePattern::Monthly
}

fn default_preview_days() -> u32 {
    30
}

fn default_date_format() -> String {
    "%Y-%m-%d".to_string()
}

/// Reject strftime strings chrono cannot render; formatting one would panic
fn validate_date_format(format: &str) -> Result<(), LedgerError> {
    if format.trim().is_empty() || StrftimeItems::new(format).any(|item| item == Item::Error) {
        return Err(LedgerError::Config(format!(
            "Invalid date_format '{}': expected a strftime pattern like %Y-%m-%d",
            format
        )));
    }
    Ok(())
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            currency: CurrencyTable::default(),
            default_alert_threshold: default_alert_threshold(),
            default_budget_period: default_budget_period(),
            preview_days: default_preview_days(),
            date_format: default_date_format(),
        }
    }
}

impl Settings {
    /// Load settings from disk, or return defaults if the file doesn't exist
    pub fn load_or_create(paths: &LedgerPaths) -> Result<Self, LedgerError> {
        let settings_path = paths.settings_file();

        if settings_path.exists() {
            let contents = std::fs::read_to_string(&settings_path)
                .map_err(|e| LedgerError::Io(format!("Failed to read settings file: {}", e)))?;

            let settings: Settings = serde_json::from_str(&contents).map_err(|e| {
                LedgerError::Config(format!("Failed to parse settings file: {}", e))
            })?;
            validate_date_format(&settings.date_format)?;

            Ok(settings)
        } else {
            // Don't save yet - let caller decide when to persist
            Ok(Settings::default())
        }
    }

    /// Save settings to disk
    pub fn save(&self, paths: &LedgerPaths) -> Result<(), LedgerError> {
        validate_date_format(&self.date_format)?;
        paths.ensure_directories()?;

        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| LedgerError::Config(format!("Failed to serialize settings: {}", e)))?;

        std::fs::write(paths.settings_file(), contents)
            .map_err(|e| LedgerError::Io(format!("Failed to write settings file: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.default_alert_threshold, 80);
        assert_eq!(settings.default_budget_period, RecurrencePattern::Monthly);
        assert_eq!(settings.currency.base, "USD");
        assert_eq!(settings.preview_days, 30);
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let paths = LedgerPaths::with_base_dir(temp_dir.path().to_path_buf());

        let mut settings = Settings::default();
        settings.default_alert_threshold = 90;
        settings.currency.base = "EUR".to_string();
        settings.save(&paths).unwrap();

        let loaded = Settings::load_or_create(&paths).unwrap();
        assert_eq!(loaded.default_alert_threshold, 90);
        assert_eq!(loaded.currency.base, "EUR");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let paths = LedgerPaths::with_base_dir(temp_dir.path().to_path_buf());
        paths.ensure_directories().unwrap();
        std::fs::write(paths.settings_file(), r#"{"preview_days": 7}"#).unwrap();

        let loaded = Settings::load_or_create(&paths).unwrap();
        assert_eq!(loaded.preview_days, 7);
        assert_eq!(loaded.default_alert_threshold, 80);
        assert!(loaded.currency.currencies.contains_key("EUR"));
        assert_eq!(loaded.date_format, "%Y-%m-%d");
    }

    #[test]
    fn test_custom_date_format_loads() {
        let temp_dir = TempDir::new().unwrap();
        let paths = LedgerPaths::with_base_dir(temp_dir.path().to_path_buf());
        paths.ensure_directories().unwrap();
        std::fs::write(paths.settings_file(), r#"{"date_format": "%d/%m/%Y"}"#).unwrap();

        let loaded = Settings::load_or_create(&paths).unwrap();
        assert_eq!(loaded.date_format, "%d/%m/%Y");
    }

    #[test]
    fn test_invalid_date_format_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let paths = LedgerPaths::with_base_dir(temp_dir.path().to_path_buf());
        paths.ensure_directories().unwrap();
        std::fs::write(paths.settings_file(), r#"{"date_format": "%Q-%"}"#).unwrap();

        let err = Settings::load_or_create(&paths).unwrap_err();
        assert!(matches!(err, LedgerError::Config(_)));

        let settings = Settings {
            date_format: String::new(),
            ..Settings::default()
        };
        assert!(settings.save(&paths).is_err());
    }
}
