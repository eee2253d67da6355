use std::env;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use bon::Builder;
use chrono::TimeDelta;
use url::Url;

use crate::bin_context::BinContext;
use crate::notification_context::NotificationContext;
use crate::poller::DEFAULT_REQUEST_TIMEOUT;
use crate::position::DEFAULT_HISTORY_CAPACITY;
use crate::resolver::{DEFAULT_LOCATION, DefaultLocation};
use crate::source::{HttpApi, SourceError};
use crate::state_machine::backoff::{
    BackoffPolicy, NOTIFICATION_BASE_INTERVAL, NOTIFICATION_MAX_INTERVAL,
};
use crate::state_machine::notification::{DEFAULT_RESUME_DELAY, NotificationMachine};
use crate::state_machine::telemetry::{DEFAULT_SAMPLE_TIMEOUT, TelemetryMachine, TelemetrySettings};

/// Default interval between telemetry fetches for a bin.
pub const DEFAULT_TELEMETRY_INTERVAL: Duration = Duration::from_secs(2);

/// Everything needed to wire up monitoring against one backend.
#[derive(Debug, Clone, Builder)]
pub struct MonitorConfig {
    /// Root of the monitoring API, e.g. `http://localhost:3000/api`.
    pub api_base_url: Url,

    #[builder(default = DEFAULT_TELEMETRY_INTERVAL)]
    pub telemetry_interval: Duration,

    #[builder(default = NOTIFICATION_BASE_INTERVAL)]
    pub notification_interval: Duration,

    /// Ceiling for the notification interval under backoff.
    #[builder(default = NOTIFICATION_MAX_INTERVAL)]
    pub notification_max_interval: Duration,

    #[builder(default = 1.5)]
    pub backoff_multiplier: f64,

    /// Consecutive failures tolerated before the notification interval starts growing.
    #[builder(default = 3)]
    pub backoff_failure_threshold: u32,

    /// Delay before polling again after the host returns to the foreground.
    #[builder(default = DEFAULT_RESUME_DELAY)]
    pub resume_delay: Duration,

    #[builder(default = DEFAULT_REQUEST_TIMEOUT)]
    pub request_timeout: Duration,

    /// A sample whose last sign of life is older than this is treated as offline.
    #[builder(default = DEFAULT_SAMPLE_TIMEOUT)]
    pub sample_timeout: Duration,

    /// Rendered when a bin has never reported a valid fix.
    #[builder(default = DEFAULT_LOCATION)]
    pub default_location: DefaultLocation,

    #[builder(default = DEFAULT_HISTORY_CAPACITY)]
    pub history_capacity: usize,
}

impl MonitorConfig {
    /// Load from `BINWATCH_*` environment variables. Only `BINWATCH_API_URL` is required.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let raw_url = lookup("BINWATCH_API_URL")
            .map(|value| value.trim().to_string())
            .ok_or_else(|| anyhow!("missing env var BINWATCH_API_URL"))?;
        let api_base_url = Url::parse(&raw_url).context("invalid BINWATCH_API_URL")?;

        let millis = |key: &str, default: Duration| -> Result<Duration> {
            Ok(Duration::from_millis(parse_or(
                &lookup,
                key,
                default.as_millis() as u64,
            )?))
        };

        let telemetry_interval =
            millis("BINWATCH_TELEMETRY_INTERVAL_MS", DEFAULT_TELEMETRY_INTERVAL)?;
        let notification_interval =
            millis("BINWATCH_NOTIFICATION_INTERVAL_MS", NOTIFICATION_BASE_INTERVAL)?;
        let request_timeout = millis("BINWATCH_REQUEST_TIMEOUT_MS", DEFAULT_REQUEST_TIMEOUT)?;

        let default_location = DefaultLocation {
            latitude: parse_or(&lookup, "BINWATCH_DEFAULT_LAT", DEFAULT_LOCATION.latitude)?,
            longitude: parse_or(&lookup, "BINWATCH_DEFAULT_LNG", DEFAULT_LOCATION.longitude)?,
        };
        let history_capacity = parse_or(&lookup, "BINWATCH_HISTORY_CAP", DEFAULT_HISTORY_CAPACITY)?;

        Ok(Self::builder()
            .api_base_url(api_base_url)
            .telemetry_interval(telemetry_interval)
            .notification_interval(notification_interval)
            .request_timeout(request_timeout)
            .default_location(default_location)
            .history_capacity(history_capacity)
            .build())
    }

    pub fn telemetry_settings(&self) -> TelemetrySettings {
        TelemetrySettings {
            default_location: self.default_location,
            history_capacity: self.history_capacity,
            sample_timeout: TimeDelta::from_std(self.sample_timeout).unwrap_or(TimeDelta::MAX),
        }
    }

    pub fn notification_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            base_interval: self.notification_interval,
            max_interval: self.notification_max_interval,
            multiplier: self.backoff_multiplier,
            failure_threshold: self.backoff_failure_threshold,
        }
    }

    pub fn http_api(&self) -> Result<HttpApi, SourceError> {
        HttpApi::new(self.api_base_url.clone(), self.request_timeout)
    }

    /// A fresh, empty context for one bin.
    pub fn bin_context(&self) -> BinContext {
        BinContext::new(TelemetryMachine::new(self.telemetry_settings()))
    }

    /// A fresh, empty context for one user's notifications.
    pub fn notification_context(&self) -> NotificationContext {
        NotificationContext::new(NotificationMachine::new(
            self.notification_policy(),
            self.resume_delay,
        ))
    }
}

fn parse_or<T>(lookup: impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("invalid {key}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = MonitorConfig::from_lookup(lookup(&[(
            "BINWATCH_API_URL",
            "http://localhost:3000/api",
        )]))
        .unwrap();

        assert_eq!(config.telemetry_interval, Duration::from_secs(2));
        assert_eq!(config.notification_interval, Duration::from_secs(30));
        assert_eq!(config.notification_max_interval, Duration::from_secs(300));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.resume_delay, Duration::from_secs(1));
        assert_eq!(config.default_location, DEFAULT_LOCATION);
        assert_eq!(config.history_capacity, 50);
        assert_eq!(config.notification_policy(), BackoffPolicy::default());
        assert_eq!(
            config.telemetry_settings().sample_timeout,
            TimeDelta::minutes(5)
        );
    }

    #[test]
    fn test_overrides() {
        let config = MonitorConfig::from_lookup(lookup(&[
            ("BINWATCH_API_URL", " http://api.example.com/ "),
            ("BINWATCH_TELEMETRY_INTERVAL_MS", "5000"),
            ("BINWATCH_NOTIFICATION_INTERVAL_MS", "60000"),
            ("BINWATCH_DEFAULT_LAT", "14.5995"),
            ("BINWATCH_DEFAULT_LNG", "120.9842"),
            ("BINWATCH_HISTORY_CAP", "10"),
        ]))
        .unwrap();

        assert_eq!(config.api_base_url.as_str(), "http://api.example.com/");
        assert_eq!(config.telemetry_interval, Duration::from_secs(5));
        assert_eq!(config.notification_policy().base_interval, Duration::from_secs(60));
        assert_eq!(config.default_location.latitude, 14.5995);
        assert_eq!(config.default_location.longitude, 120.9842);
        assert_eq!(config.telemetry_settings().history_capacity, 10);
    }

    #[test]
    fn test_missing_url() {
        let err = MonitorConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(err.to_string().contains("BINWATCH_API_URL"));
    }

    #[test]
    fn test_invalid_number_names_the_variable() {
        let err = MonitorConfig::from_lookup(lookup(&[
            ("BINWATCH_API_URL", "http://localhost:3000"),
            ("BINWATCH_HISTORY_CAP", "lots"),
        ]))
        .unwrap_err();
        assert_eq!(err.to_string(), "invalid BINWATCH_HISTORY_CAP");
    }

    #[test]
    fn test_builder_requires_only_url() {
        let config = MonitorConfig::builder()
            .api_base_url(Url::parse("http://localhost:3000").unwrap())
            .telemetry_interval(Duration::from_millis(500))
            .build();
        assert_eq!(config.telemetry_interval, Duration::from_millis(500));
        assert_eq!(config.backoff_failure_threshold, 3);
        assert!(config.http_api().is_ok());
    }
}
