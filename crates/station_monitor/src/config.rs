use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

use validator::Validate;

use crate::biopetrol_client::DEFAULT_BIOPETROL_URL;
use crate::call_retry::CallRetryProtocol;
use crate::monitor_types::{MonitorError, StationId};
use crate::scheduler::SchedulerConfig;

/// Default seconds between polls of one station (5 minutes).
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;
/// Default call attempt budget.
pub const DEFAULT_MAX_CALL_RETRIES: u32 = 3;
/// Default seconds to wait after a busy line.
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 60;
/// Default CallMeBot voice.
pub const DEFAULT_CALL_LANGUAGE: &str = "es-ES-Standard-A";

/// Validated runtime configuration of the monitor
#[derive(Debug, Clone, Validate)]
pub struct MonitorConfig {
    /// Stations to watch
    #[validate(
        length(min = 1, message = "At least one station is required"),
        custom(function = "validate_station_ids")
    )]
    pub stations: Vec<StationId>,

    /// Seconds between polls of one station
    #[validate(range(min = 1, message = "Poll interval must be greater than zero"))]
    pub poll_interval_secs: u64,

    /// Total call attempts per alert
    pub max_call_retries: u32,

    /// Seconds to wait after a busy line
    pub retry_delay_secs: u64,

    /// CallMeBot voice/language code
    #[validate(length(min = 1, message = "Call language is required"))]
    pub call_language: String,

    /// Station listing page
    #[validate(length(min = 1, message = "Station page URL is required"))]
    pub biopetrol_url: String,

    /// Optional file receiving a copy of the log
    pub log_file: Option<String>,
}

/// Values given on the command line; they win over the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Stations named on the command line
    pub stations: Vec<String>,
    /// `--interval`
    pub poll_interval_secs: Option<u64>,
    /// `--max-retries`
    pub max_call_retries: Option<u32>,
    /// `--retry-delay`
    pub retry_delay_secs: Option<u64>,
    /// `--lang`
    pub call_language: Option<String>,
    /// `--log-file`
    pub log_file: Option<String>,
}

impl MonitorConfig {
    /// Build the configuration from the process environment.
    pub fn from_env(overrides: ConfigOverrides) -> Result<Self, MonitorError> {
        Self::from_lookup(|key| std::env::var(key).ok(), overrides)
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F, overrides: ConfigOverrides) -> Result<Self, MonitorError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let poll_interval_secs = match overrides.poll_interval_secs {
            Some(secs) => secs,
            None => parse_var(&lookup, "POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS)?,
        };
        let max_call_retries = match overrides.max_call_retries {
            Some(retries) => retries,
            None => parse_var(&lookup, "CALL_MAX_RETRIES", DEFAULT_MAX_CALL_RETRIES)?,
        };
        let retry_delay_secs = match overrides.retry_delay_secs {
            Some(secs) => secs,
            None => parse_var(&lookup, "CALL_RETRY_DELAY_SECS", DEFAULT_RETRY_DELAY_SECS)?,
        };

        let call_language = overrides
            .call_language
            .or_else(|| lookup("CALLMEBOT_LANG"))
            .unwrap_or_else(|| DEFAULT_CALL_LANGUAGE.to_string())
            .trim()
            .to_string();

        let biopetrol_url = lookup("BIOPETROL_URL")
            .unwrap_or_else(|| DEFAULT_BIOPETROL_URL.to_string())
            .trim()
            .to_string();

        let log_file = overrides
            .log_file
            .or_else(|| lookup("MONITOR_LOG_FILE"))
            .filter(|path| !path.trim().is_empty());

        let config = Self {
            stations: overrides.stations.iter().map(StationId::new).collect(),
            poll_interval_secs,
            max_call_retries,
            retry_delay_secs,
            call_language,
            biopetrol_url,
            log_file,
        };

        config
            .validate()
            .map_err(|e| MonitorError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Interval between polls of one station.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Retry protocol for phone calls.
    pub fn retry_protocol(&self) -> CallRetryProtocol {
        CallRetryProtocol::new(
            self.max_call_retries,
            Duration::from_secs(self.retry_delay_secs),
        )
    }

    /// Scheduler settings.
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            stations: self.stations.clone(),
            poll_interval: self.poll_interval(),
        }
    }
}

fn parse_var<T, F>(lookup: &F, key: &str, default: T) -> Result<T, MonitorError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw.trim().parse().map_err(|_| {
            MonitorError::Config(format!("{} must be a non-negative integer, got '{}'", key, raw))
        }),
        _ => Ok(default),
    }
}

fn validate_station_ids(stations: &[StationId]) -> Result<(), validator::ValidationError> {
    if stations.iter().any(|id| id.as_str().is_empty()) {
        return Err(validator::ValidationError::new("empty_station_id"));
    }

    // Page names are matched ignoring case, so CHACO and chaco are one station.
    let mut seen = HashSet::new();
    for id in stations {
        if !seen.insert(id.as_str().to_uppercase()) {
            let mut err = validator::ValidationError::new("duplicate_station_id");
            err.message = Some(format!("Station '{}' is listed more than once", id).into());
            return Err(err);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn stations(names: &[&str]) -> ConfigOverrides {
        ConfigOverrides {
            stations: names.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| env.get(key).cloned()
    }

    #[test]
    fn defaults_apply() {
        let config = MonitorConfig::from_lookup(lookup_from(&[]), stations(&["CHACO"])).unwrap();

        assert_eq!(config.poll_interval_secs, 300);
        assert_eq!(config.max_call_retries, 3);
        assert_eq!(config.retry_delay_secs, 60);
        assert_eq!(config.call_language, DEFAULT_CALL_LANGUAGE);
        assert_eq!(config.biopetrol_url, DEFAULT_BIOPETROL_URL);
        assert!(config.log_file.is_none());
    }

    #[test]
    fn cli_overrides_environment() {
        let lookup = lookup_from(&[("POLL_INTERVAL_SECS", "120"), ("CALL_MAX_RETRIES", "5")]);
        let overrides = ConfigOverrides {
            poll_interval_secs: Some(30),
            ..stations(&["CHACO"])
        };

        let config = MonitorConfig::from_lookup(lookup, overrides).unwrap();
        assert_eq!(config.poll_interval_secs, 30);
        assert_eq!(config.max_call_retries, 5);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let lookup = lookup_from(&[("POLL_INTERVAL_SECS", "0")]);
        let err = MonitorConfig::from_lookup(lookup, stations(&["CHACO"])).unwrap_err();
        assert!(matches!(err, MonitorError::Config(_)));
    }

    #[test]
    fn negative_retries_are_rejected() {
        let lookup = lookup_from(&[("CALL_MAX_RETRIES", "-1")]);
        let err = MonitorConfig::from_lookup(lookup, stations(&["CHACO"])).unwrap_err();
        assert!(err.to_string().contains("CALL_MAX_RETRIES"));
    }

    #[test]
    fn zero_retries_and_delay_are_allowed() {
        let lookup = lookup_from(&[("CALL_MAX_RETRIES", "0"), ("CALL_RETRY_DELAY_SECS", "0")]);
        let config = MonitorConfig::from_lookup(lookup, stations(&["CHACO"])).unwrap();
        assert_eq!(config.retry_protocol().max_retries, 0);
        assert_eq!(config.retry_protocol().retry_delay, Duration::ZERO);
    }

    #[test]
    fn duplicate_stations_are_rejected() {
        let err = MonitorConfig::from_lookup(lookup_from(&[]), stations(&["CHACO", "FORMOSA", "chaco"]))
            .unwrap_err();
        assert!(matches!(err, MonitorError::Config(ref msg) if msg.contains("chaco")));
    }

    #[test]
    fn stations_are_required() {
        assert!(MonitorConfig::from_lookup(lookup_from(&[]), stations(&[])).is_err());
        assert!(MonitorConfig::from_lookup(lookup_from(&[]), stations(&["  "])).is_err());
    }
}
