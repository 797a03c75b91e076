use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use tracing::info;
use validator::Validate;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_DB_MIN_CONNECTIONS: u32 = 1;
const DEFAULT_CONSUMPTION_LOOKBACK_DAYS: i64 = 30;
const DEFAULT_PREDICTION_HORIZON_DAYS: i64 = 14;

/// Tunables for the stock alert engine
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AlertConfig {
    /// How many days of deduction history feed the consumption velocity
    #[serde(default = "default_consumption_lookback_days")]
    pub consumption_lookback_days: i64,

    /// Horizon used by predictive scans when the caller does not pass one
    #[serde(default = "default_prediction_horizon_days")]
    pub default_horizon_days: i64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            consumption_lookback_days: default_consumption_lookback_days(),
            default_horizon_days: default_prediction_horizon_days(),
        }
    }
}

/// Application configuration with validation
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    #[validate(length(min = 1))]
    pub database_url: String,

    /// Deployment environment name ("development", "test", "production")
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Log level filter for the tracing subscriber
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Maximum number of pooled database connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// Minimum number of pooled database connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// Run pending migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// Alert engine tunables
    #[serde(default)]
    pub alerts: AlertConfig,
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_db_max_connections() -> u32 {
    DEFAULT_DB_MAX_CONNECTIONS
}

fn default_db_min_connections() -> u32 {
    DEFAULT_DB_MIN_CONNECTIONS
}

fn default_consumption_lookback_days() -> i64 {
    DEFAULT_CONSUMPTION_LOOKBACK_DAYS
}

fn default_prediction_horizon_days() -> i64 {
    DEFAULT_PREDICTION_HORIZON_DAYS
}

impl AppConfig {
    /// Builds a configuration directly, used by tests and embedding callers.
    pub fn new(database_url: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            environment: environment.into(),
            log_level: default_log_level(),
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            auto_migrate: false,
            alerts: AlertConfig::default(),
        }
    }

    /// Loads configuration from layered sources: `config/default.toml`, an
    /// environment-specific `config/{env}.toml`, then `APP_*` environment
    /// variable overrides (e.g. `APP_DATABASE_URL`).
    pub fn load() -> Result<Self, ConfigError> {
        let environment = env::var("APP_ENVIRONMENT").unwrap_or_else(|_| DEFAULT_ENV.to_string());

        let mut builder = Config::builder()
            .set_default("environment", environment.clone())?
            .set_default("log_level", DEFAULT_LOG_LEVEL)?;

        let default_path = Path::new(CONFIG_DIR).join("default.toml");
        if default_path.exists() {
            builder = builder.add_source(File::from(default_path));
        }
        let env_path = Path::new(CONFIG_DIR).join(format!("{environment}.toml"));
        if env_path.exists() {
            builder = builder.add_source(File::from(env_path));
        }

        let settings = builder
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?;

        let cfg: AppConfig = settings.try_deserialize()?;
        cfg.validate()
            .map_err(|e| ConfigError::Message(format!("invalid configuration: {e}")))?;

        info!(environment = %cfg.environment, "configuration loaded");
        Ok(cfg)
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_applies_defaults() {
        let cfg = AppConfig::new("sqlite::memory:", "test");
        assert_eq!(cfg.db_max_connections, DEFAULT_DB_MAX_CONNECTIONS);
        assert_eq!(cfg.alerts.consumption_lookback_days, 30);
        assert_eq!(cfg.alerts.default_horizon_days, 14);
        assert!(!cfg.auto_migrate);
        assert!(!cfg.is_production());
    }
}
