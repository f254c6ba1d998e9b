use std::collections::BTreeSet;
use std::env;
use std::path::Path;

use chrono::NaiveDate;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const DEFAULT_WORK_ORDER_PREFIX: &str = "WO";
const DEFAULT_REQUISITION_PREFIX: &str = "PR";
const DEFAULT_LEDGER_ACTOR: &str = "system";
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;
const HOLIDAY_FORMAT: &str = "%Y-%m-%d";

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Prefix of work-order numbers, e.g. `WO` in `WO-2025-00001`
    #[serde(default = "default_work_order_prefix")]
    #[validate(custom = "validate_number_prefix")]
    pub work_order_prefix: String,

    /// Prefix of purchase-requisition numbers
    #[serde(default = "default_requisition_prefix")]
    #[validate(custom = "validate_number_prefix")]
    pub requisition_prefix: String,

    /// Actor label written on every stock transaction
    #[serde(default = "default_ledger_actor")]
    #[validate(length(min = 1, message = "ledger_actor must not be empty"))]
    pub ledger_actor: String,

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    #[validate(custom = "validate_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Shop holidays as `YYYY-MM-DD`
    #[serde(default)]
    #[validate(custom = "validate_holidays")]
    pub holidays: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            log_level: default_log_level(),
            log_json: false,
            work_order_prefix: default_work_order_prefix(),
            requisition_prefix: default_requisition_prefix(),
            ledger_actor: default_ledger_actor(),
            event_channel_capacity: default_event_channel_capacity(),
            holidays: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Parsed holiday dates. Entries that fail to parse are rejected by validation.
    pub fn holiday_dates(&self) -> BTreeSet<NaiveDate> {
        self.holidays
            .iter()
            .filter_map(|d| NaiveDate::parse_from_str(d.trim(), HOLIDAY_FORMAT).ok())
            .collect()
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Default value functions
fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_work_order_prefix() -> String {
    DEFAULT_WORK_ORDER_PREFIX.to_string()
}

fn default_requisition_prefix() -> String {
    DEFAULT_REQUISITION_PREFIX.to_string()
}

fn default_ledger_actor() -> String {
    DEFAULT_LEDGER_ACTOR.to_string()
}

fn default_event_channel_capacity() -> usize {
    DEFAULT_EVENT_CHANNEL_CAPACITY
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_number_prefix(prefix: &str) -> Result<(), ValidationError> {
    let well_formed = (1..=8).contains(&prefix.len())
        && prefix.chars().all(|c| c.is_ascii_uppercase());
    if well_formed {
        Ok(())
    } else {
        let mut err = ValidationError::new("prefix");
        err.message = Some("Prefix must be 1-8 uppercase ASCII letters".into());
        Err(err)
    }
}

fn validate_event_channel_capacity(capacity: usize) -> Result<(), ValidationError> {
    if capacity == 0 {
        let mut err = ValidationError::new("event_channel_capacity");
        err.message = Some("event_channel_capacity must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

fn validate_holidays(dates: &[String]) -> Result<(), ValidationError> {
    if let Some(bad) = dates
        .iter()
        .find(|d| NaiveDate::parse_from_str(d.trim(), HOLIDAY_FORMAT).is_err())
    {
        let mut err = ValidationError::new("holidays");
        err.message = Some(format!("'{}' is not a YYYY-MM-DD date", bad).into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("fleet_repair={}", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);
    let filter = EnvFilter::new(filter_directive);

    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    load_config_from(Path::new(CONFIG_DIR), &run_env)
}

/// Same as [`load_config`] with an explicit config directory and profile.
pub fn load_config_from(config_dir: &Path, run_env: &str) -> Result<AppConfig, AppConfigError> {
    info!("Loading configuration for environment: {}", run_env);
    if !config_dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            config_dir.display()
        );
    }

    let default_file = config_dir.join("default");
    let env_file = config_dir.join(run_env);
    let config = Config::builder()
        .set_default("environment", run_env)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .set_default("work_order_prefix", DEFAULT_WORK_ORDER_PREFIX)?
        .set_default("requisition_prefix", DEFAULT_REQUISITION_PREFIX)?
        .set_default("ledger_actor", DEFAULT_LEDGER_ACTOR)?
        .set_default("event_channel_capacity", DEFAULT_EVENT_CHANNEL_CAPACITY as i64)?
        .add_source(File::with_name(&default_file.to_string_lossy()).required(false))
        .add_source(File::with_name(&env_file.to_string_lossy()).required(false))
        .add_source(
            Environment::with_prefix("APP")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("holidays")
                .try_parsing(true),
        )
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_profile(dir: &TempDir, name: &str, content: &str) {
        fs::write(dir.path().join(format!("{}.toml", name)), content).unwrap();
    }

    #[test]
    fn defaults_apply_without_files() {
        let dir = TempDir::new().unwrap();
        let cfg = load_config_from(dir.path(), "test").unwrap();
        assert_eq!(cfg.work_order_prefix, "WO");
        assert_eq!(cfg.requisition_prefix, "PR");
        assert_eq!(cfg.ledger_actor, "system");
        assert_eq!(cfg.environment, "test");
        assert!(cfg.holidays.is_empty());
    }

    #[test]
    fn profile_overrides_default_file() {
        let dir = TempDir::new().unwrap();
        write_profile(&dir, "default", "log_level = \"debug\"\nledger_actor = \"depot\"\n");
        write_profile(
            &dir,
            "staging",
            "ledger_actor = \"night-shift\"\nholidays = [\"2025-12-25\", \"2025-12-26\"]\n",
        );
        let cfg = load_config_from(dir.path(), "staging").unwrap();
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.ledger_actor, "night-shift");
        assert_eq!(cfg.holiday_dates().len(), 2);
    }

    #[test]
    fn malformed_holiday_fails_validation() {
        let dir = TempDir::new().unwrap();
        write_profile(&dir, "default", "holidays = [\"2025-13-01\"]\n");
        let result = load_config_from(dir.path(), "test");
        assert!(matches!(result, Err(AppConfigError::Validation(_))));
    }

    #[test]
    fn lowercase_prefix_fails_validation() {
        let cfg = AppConfig {
            work_order_prefix: "wo".into(),
            ..AppConfig::default()
        };
        let errors = cfg.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("work_order_prefix"));
    }

    #[test]
    fn zero_capacity_fails_validation() {
        let cfg = AppConfig {
            event_channel_capacity: 0,
            ..AppConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = TempDir::new().unwrap();
        write_profile(&dir, "default", "database_url = \"sqlite://x\"\n");
        assert!(matches!(
            load_config_from(dir.path(), "test"),
            Err(AppConfigError::Load(_))
        ));
    }
}
