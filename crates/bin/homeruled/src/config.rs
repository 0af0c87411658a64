//! Configuration loading: TOML file with environment variable overrides.
//!
//! Looks for `homerule.toml` in the working directory, or the file named by
//! `HOMERULE_CONFIG`. Every field has a sensible default so the file is
//! optional. Environment variables take precedence over file values.

use std::time::Duration;

use serde::Deserialize;

use homerule_app::engine::EngineSettings;
use homerule_domain::automation::SunTimes;
use homerule_domain::time::parse_time_of_day;

const DEFAULT_PATH: &str = "homerule.toml";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database settings.
    pub database: DatabaseConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Execution engine limits.
    pub engine: EngineConfig,
    /// Waiting-execution resumer.
    pub resumer: ResumerConfig,
    /// Schedule trigger ticker.
    pub scheduler: SchedulerConfig,
    /// In-process event bus.
    pub event_bus: EventBusConfig,
    /// Fixed sunrise and sunset table.
    pub sun: SunConfig,
}

/// `SQLite` database configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `SQLite` connection URL or file path.
    pub url: String,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_transition_attempts: u32,
    pub max_chain_depth: usize,
    pub admission_attempts: u32,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ResumerConfig {
    /// Seconds between two scans for due executions.
    pub interval_seconds: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Fire schedule triggers once a minute.
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EventBusConfig {
    /// Events buffered per subscriber before the slowest one lags.
    pub capacity: usize,
}

/// Sunrise and sunset as `HH:MM` (UTC), applied to every premises.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SunConfig {
    pub sunrise: String,
    pub sunset: String,
}

impl Config {
    /// Load configuration from `homerule.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if a
    /// value fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("HOMERULE_CONFIG").unwrap_or_else(|_| DEFAULT_PATH.to_string());
        let mut config = Self::from_file(&path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("HOMERULE_DATABASE_URL") {
            self.database.url = val;
        }
        if let Ok(val) = std::env::var("HOMERULE_RESUMER_INTERVAL")
            && let Ok(seconds) = val.parse()
        {
            self.resumer.interval_seconds = seconds;
        }
        if let Ok(val) = std::env::var("HOMERULE_SCHEDULER_ENABLED")
            && let Ok(enabled) = val.parse()
        {
            self.scheduler.enabled = enabled;
        }
        if let Ok(val) = std::env::var("HOMERULE_SUNRISE") {
            self.sun.sunrise = val;
        }
        if let Ok(val) = std::env::var("HOMERULE_SUNSET") {
            self.sun.sunset = val;
        }
        if let Ok(val) = std::env::var("HOMERULE_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.max_transition_attempts == 0 || self.engine.admission_attempts == 0 {
            return Err(ConfigError::Validation(
                "engine attempts must be non-zero".to_string(),
            ));
        }
        if self.resumer.interval_seconds == 0 {
            return Err(ConfigError::Validation(
                "resumer interval must be non-zero".to_string(),
            ));
        }
        if self.event_bus.capacity == 0 {
            return Err(ConfigError::Validation(
                "event bus capacity must be non-zero".to_string(),
            ));
        }
        self.sun_times()?;
        Ok(())
    }

    /// Return the database URL in `sqlx`-compatible format.
    #[must_use]
    pub fn database_url(&self) -> &str {
        &self.database.url
    }

    #[must_use]
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            max_transition_attempts: self.engine.max_transition_attempts,
            max_chain_depth: self.engine.max_chain_depth,
            admission_attempts: self.engine.admission_attempts,
        }
    }

    #[must_use]
    pub fn resume_interval(&self) -> Duration {
        Duration::from_secs(self.resumer.interval_seconds)
    }

    /// Parse the configured sun table.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] when either time is not `HH:MM`.
    pub fn sun_times(&self) -> Result<SunTimes, ConfigError> {
        let parse = |label: &str, text: &str| {
            parse_time_of_day(text)
                .map_err(|_| ConfigError::Validation(format!("{label} must be HH:MM, got {text:?}")))
        };
        Ok(SunTimes {
            sunrise: parse("sunrise", &self.sun.sunrise)?,
            sunset: parse("sunset", &self.sun.sunset)?,
        })
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:homerule.db?mode=rwc".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "homeruled=info,homerule_app=info,homerule_adapter_storage_sqlite_sqlx=warn"
                .to_string(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        let settings = EngineSettings::default();
        Self {
            max_transition_attempts: settings.max_transition_attempts,
            max_chain_depth: settings.max_chain_depth,
            admission_attempts: settings.admission_attempts,
        }
    }
}

impl Default for ResumerConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 15,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}

impl Default for SunConfig {
    fn default() -> Self {
        Self {
            sunrise: "06:30".to_string(),
            sunset: "19:30".to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use chrono::NaiveTime;

    use super::*;

    #[test]
    fn should_produce_sensible_defaults() {
        let config = Config::default();
        assert_eq!(config.database.url, "sqlite:homerule.db?mode=rwc");
        assert_eq!(config.resumer.interval_seconds, 15);
        assert!(config.scheduler.enabled);
        assert_eq!(config.event_bus.capacity, 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn should_parse_minimal_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.engine.max_chain_depth, 8);
    }

    #[test]
    fn should_parse_full_toml() {
        let toml = "
            [database]
            url = 'sqlite:test.db'

            [logging]
            filter = 'debug'

            [engine]
            max_transition_attempts = 5
            max_chain_depth = 2
            admission_attempts = 4

            [resumer]
            interval_seconds = 30

            [scheduler]
            enabled = false

            [event_bus]
            capacity = 64

            [sun]
            sunrise = '05:45'
            sunset = '21:10'
        ";
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.database_url(), "sqlite:test.db");
        assert_eq!(config.logging.filter, "debug");
        assert_eq!(config.engine_settings().max_chain_depth, 2);
        assert_eq!(config.engine_settings().admission_attempts, 4);
        assert_eq!(config.resume_interval(), Duration::from_secs(30));
        assert!(!config.scheduler.enabled);
        assert_eq!(config.event_bus.capacity, 64);
        assert_eq!(
            config.sun_times().unwrap().sunset,
            NaiveTime::from_hms_opt(21, 10, 0).unwrap()
        );
    }

    #[test]
    fn should_return_default_when_file_not_found() {
        let config = Config::from_file("nonexistent.toml").unwrap();
        assert_eq!(config.resumer.interval_seconds, 15);
    }

    #[test]
    fn should_reject_zero_interval_and_capacity() {
        let mut interval = Config::default();
        interval.resumer.interval_seconds = 0;
        let mut capacity = Config::default();
        capacity.event_bus.capacity = 0;
        let mut attempts = Config::default();
        attempts.engine.max_transition_attempts = 0;

        assert!(interval.validate().is_err());
        assert!(capacity.validate().is_err());
        assert!(attempts.validate().is_err());
    }

    #[test]
    fn should_reject_unparsable_sun_time() {
        let mut config = Config::default();
        config.sun.sunset = "dusk".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn should_report_parse_error_for_invalid_toml() {
        let result: Result<Config, _> = toml::from_str("invalid {{{");
        assert!(result.is_err());
    }
}
