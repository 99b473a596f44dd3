//! Configuration file structures for fxnews.
//!
//! This module defines the configuration file format using YAML. The
//! configuration is split into two sections: feed settings and alert settings.
//! Every key is optional; missing keys take the defaults shown below.
//!
//! # Configuration File Format
//!
//! ```yaml
//! feed:
//!   # Calendar feed url
//!   api_url: "https://nfs.faireconomy.media/ff_calendar_thisweek.json"
//!   # Timezone the feed expresses dates and times in
//!   timezone: "America/New_York"
//!   # Seconds per fetch attempt
//!   fetch_timeout: 15
//!   # Total fetch attempts
//!   retry_max: 3
//!   # Seconds before the first retry, doubled on each retry
//!   retry_backoff_base: 2.0
//!   # Seconds between timer refreshes
//!   refresh_interval: 1800
//!   # Seconds after which the cached calendar is stale
//!   cache_ttl: 1800
//!
//! alerts:
//!   enabled: true
//!   # Minutes before the event start
//!   offsets: [60, 30, 15, 5]
//!   impacts: { high: true, medium: false, low: false, holiday: false }
//!   snooze_default_minutes: 5
//! ```
//!
//! # Environment Variable Overrides
//!
//! Any value can be overridden with an environment variable prefixed with
//! `FXNEWS_`, nested keys being separated by `__`:
//!
//! ```bash
//! export FXNEWS_FEED__API_URL="https://nfs.faireconomy.media/ff_calendar_nextweek.json"
//! export FXNEWS_ALERTS__ENABLED=false
//! ```

use std::{
    collections::HashSet,
    path::Path,
    time::{Duration, Instant},
};

use anyhow::ensure;
use chrono_tz::Tz;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::{
    alerts::{AlertSettings, SchedulingError},
    feed::{Impact, RetryPolicy},
};

/// Prefix of the environment variables overriding the file.
const ENV_PREFIX: &str = "FXNEWS_";

/// Root configuration structure.
///
/// # Examples
///
/// ```no_run
/// # use fxnews::config::Config;
/// # fn main() -> anyhow::Result<()> {
/// let config = Config::load("config.yaml")?;
/// println!("Feed: {}", config.feed.api_url);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Calendar feed configuration
    pub feed: FeedConfig,
    /// Alert configuration
    pub alerts: AlertsConfig,
}

/// Calendar feed configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Url of the JSON calendar feed.
    pub api_url: String,

    /// IANA timezone of the dates and times given by the feed.
    ///
    /// Only used for records without an explicit UTC offset.
    pub timezone: String,

    /// Bound of each fetch attempt, in seconds.
    pub fetch_timeout: i64,

    /// Total number of fetch attempts, including the first one.
    pub retry_max: u32,

    /// Delay before the first retry, in seconds.
    pub retry_backoff_base: f64,

    /// Seconds between two timer refreshes.
    pub refresh_interval: i64,

    /// Age in seconds after which the cached calendar is refreshed.
    pub cache_ttl: i64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        FeedConfig {
            api_url: "https://nfs.faireconomy.media/ff_calendar_thisweek.json".to_owned(),
            timezone: "America/New_York".to_owned(),
            fetch_timeout: 15,
            retry_max: 3,
            retry_backoff_base: 2.0,
            refresh_interval: 1800,
            cache_ttl: 1800,
        }
    }
}

impl FeedConfig {
    /// Parsed feed timezone.
    pub fn timezone(&self) -> Result<Tz, SchedulingError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| SchedulingError::InvalidValue {
                field: "feed.timezone",
                reason: format!("unknown timezone {:?}", self.timezone),
            })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_max,
            Duration::try_from_secs_f64(self.retry_backoff_base).unwrap_or(Duration::from_secs(2)),
            Duration::from_secs(self.fetch_timeout.unsigned_abs()),
        )
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval.unsigned_abs())
    }

    /// Cache time to live, saturated for values [`FeedConfig::validate`] rejects.
    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::try_seconds(self.cache_ttl).unwrap_or(chrono::Duration::MAX)
    }

    fn validate(&self) -> Result<(), SchedulingError> {
        ensure_positive("feed.fetch_timeout", self.fetch_timeout)?;
        ensure_positive("feed.refresh_interval", self.refresh_interval)?;
        ensure_positive("feed.cache_ttl", self.cache_ttl)?;

        ensure_schedulable("feed.fetch_timeout", self.fetch_timeout)?;
        ensure_schedulable("feed.refresh_interval", self.refresh_interval)?;
        if chrono::Duration::try_seconds(self.cache_ttl).is_none() {
            return Err(SchedulingError::InvalidValue {
                field: "feed.cache_ttl",
                reason: format!("{} seconds is out of range", self.cache_ttl),
            });
        }

        if !(self.retry_backoff_base.is_finite() && self.retry_backoff_base > 0.0) {
            return Err(SchedulingError::InvalidValue {
                field: "feed.retry_backoff_base",
                reason: format!("must be positive, got {}", self.retry_backoff_base),
            });
        }
        let schedulable_backoff = Duration::try_from_secs_f64(self.retry_backoff_base)
            .ok()
            .and_then(|base| Instant::now().checked_add(base));
        if schedulable_backoff.is_none() {
            return Err(SchedulingError::InvalidValue {
                field: "feed.retry_backoff_base",
                reason: format!("{} seconds is out of range", self.retry_backoff_base),
            });
        }
        if self.retry_max == 0 {
            return Err(SchedulingError::InvalidValue {
                field: "feed.retry_max",
                reason: "at least one attempt is required".to_owned(),
            });
        }

        self.timezone()?;

        Ok(())
    }
}

/// Alert configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    /// Master switch for alerts.
    pub enabled: bool,

    /// Minutes before the event start at which alerts fire.
    ///
    /// Normalized to a descending list without duplicates.
    pub offsets: Vec<i64>,

    /// Impacts alerts are generated for.
    pub impacts: ImpactsConfig,

    /// Snooze duration used when none is given, in minutes.
    pub snooze_default_minutes: i64,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        AlertsConfig {
            enabled: true,
            offsets: vec![60, 30, 15, 5],
            impacts: ImpactsConfig::default(),
            snooze_default_minutes: 5,
        }
    }
}

/// Which impacts produce alerts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImpactsConfig {
    pub high: bool,
    pub medium: bool,
    pub low: bool,
    pub holiday: bool,
}

impl Default for ImpactsConfig {
    fn default() -> Self {
        ImpactsConfig {
            high: true,
            medium: false,
            low: false,
            holiday: false,
        }
    }
}

impl ImpactsConfig {
    fn enabled(&self) -> HashSet<Impact> {
        [
            (Impact::High, self.high),
            (Impact::Medium, self.medium),
            (Impact::Low, self.low),
            (Impact::Holiday, self.holiday),
        ]
        .into_iter()
        .filter_map(|(impact, enabled)| enabled.then_some(impact))
        .collect()
    }
}

impl AlertsConfig {
    /// Offsets sorted in descending order without duplicates.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulingError::InvalidOffset`] for a zero or negative
    /// offset and `InvalidValue` for an empty list.
    pub fn normalized_offsets(&self) -> Result<Vec<u32>, SchedulingError> {
        if self.offsets.is_empty() {
            return Err(SchedulingError::InvalidValue {
                field: "alerts.offsets",
                reason: "at least one offset is required".to_owned(),
            });
        }

        let mut offsets = self
            .offsets
            .iter()
            .map(|&offset| {
                u32::try_from(offset)
                    .ok()
                    .filter(|offset| *offset > 0)
                    .ok_or(SchedulingError::InvalidOffset(offset))
            })
            .collect::<Result<Vec<u32>, SchedulingError>>()?;

        offsets.sort_unstable_by(|a, b| b.cmp(a));
        offsets.dedup();

        Ok(offsets)
    }

    /// Alert settings derived from this configuration.
    pub fn settings(&self) -> Result<AlertSettings, SchedulingError> {
        let snooze_default_minutes = u32::try_from(self.snooze_default_minutes)
            .ok()
            .filter(|minutes| *minutes > 0)
            .ok_or_else(|| SchedulingError::InvalidValue {
                field: "alerts.snooze_default_minutes",
                reason: format!(
                    "must be a positive number of minutes, got {}",
                    self.snooze_default_minutes
                ),
            })?;

        Ok(AlertSettings {
            enabled: self.enabled,
            offsets: self.normalized_offsets()?,
            impacts: self.impacts.enabled(),
            snooze_default_minutes,
        })
    }
}

impl Config {
    /// Loads the configuration from a YAML file and `FXNEWS_` environment variables.
    ///
    /// Values are layered: built-in defaults, then the file, then the
    /// environment. The result is validated before being returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist, cannot be parsed, or holds
    /// invalid values.
    pub fn load(path: &str) -> Result<Self, anyhow::Error> {
        ensure!(
            Path::new(path).is_file(),
            "configuration file {} not found",
            path
        );

        let config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        config.validate()?;

        Ok(config)
    }

    /// Checks every value that the types alone do not constrain.
    pub fn validate(&self) -> Result<(), SchedulingError> {
        self.feed.validate()?;
        self.alerts.settings()?;
        Ok(())
    }
}

fn ensure_positive(field: &'static str, value: i64) -> Result<(), SchedulingError> {
    if value <= 0 {
        return Err(SchedulingError::InvalidValue {
            field,
            reason: format!("must be positive, got {}", value),
        });
    }
    Ok(())
}

/// Rejects a number of seconds that cannot be added to the current instant.
fn ensure_schedulable(field: &'static str, seconds: i64) -> Result<(), SchedulingError> {
    let delay = Duration::from_secs(seconds.unsigned_abs());
    if Instant::now().checked_add(delay).is_none() {
        return Err(SchedulingError::InvalidValue {
            field,
            reason: format!("{} seconds is out of range", seconds),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    #[serial]
    fn test_load_applies_defaults() {
        let file = write_config("feed:\n  retry_max: 5\n");
        let config = Config::load(file.path().to_str().unwrap()).unwrap();

        assert_eq!(config.feed.retry_max, 5);
        assert_eq!(config.feed.timezone, "America/New_York");
        assert_eq!(config.feed.cache_ttl, 1800);
        assert_eq!(config.alerts, AlertsConfig::default());
    }

    #[test]
    #[serial]
    fn test_load_full_file() {
        let file = write_config(
            r#"
feed:
  api_url: "http://calendar.server/feed.json"
  timezone: "Europe/London"
  fetch_timeout: 10
  retry_max: 2
  retry_backoff_base: 0.5
  refresh_interval: 600
  cache_ttl: 300
alerts:
  enabled: false
  offsets: [5, 30, 5, 120]
  impacts: { high: true, medium: true }
  snooze_default_minutes: 10
"#,
        );
        let config = Config::load(file.path().to_str().unwrap()).unwrap();

        assert_eq!(config.feed.api_url, "http://calendar.server/feed.json");
        assert_eq!(config.feed.timezone().unwrap(), chrono_tz::Europe::London);
        assert_eq!(
            config.feed.retry_policy(),
            RetryPolicy::new(2, Duration::from_millis(500), Duration::from_secs(10))
        );
        assert_eq!(config.feed.refresh_interval(), Duration::from_secs(600));
        assert_eq!(config.feed.cache_ttl(), chrono::Duration::minutes(5));

        let settings = config.alerts.settings().unwrap();
        assert!(!settings.enabled);
        assert_eq!(settings.offsets, vec![120, 30, 5]);
        assert_eq!(
            settings.impacts,
            HashSet::from([Impact::High, Impact::Medium])
        );
        assert_eq!(settings.snooze_default_minutes, 10);
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        let file = write_config("feed:\n  retry_max: 5\n");

        // SAFETY: tests touching the environment run serially
        unsafe {
            std::env::set_var("FXNEWS_FEED__RETRY_MAX", "7");
            std::env::set_var("FXNEWS_ALERTS__IMPACTS__LOW", "true");
        }
        let config = Config::load(file.path().to_str().unwrap());
        unsafe {
            std::env::remove_var("FXNEWS_FEED__RETRY_MAX");
            std::env::remove_var("FXNEWS_ALERTS__IMPACTS__LOW");
        }

        let config = config.unwrap();
        assert_eq!(config.feed.retry_max, 7);
        assert!(config.alerts.impacts.low);
    }

    #[test]
    #[serial]
    fn test_load_missing_file_fails() {
        assert!(Config::load("nonexistent_config.yaml").is_err());
    }

    #[test]
    #[serial]
    fn test_load_rejects_invalid_values() {
        let file = write_config("alerts:\n  offsets: [30, -5]\n");
        let error = Config::load(file.path().to_str().unwrap()).unwrap_err();
        assert_eq!(
            error.downcast_ref::<SchedulingError>(),
            Some(&SchedulingError::InvalidOffset(-5))
        );
    }

    #[test]
    fn test_validate_rejects_bad_feed_values() {
        let mut config = Config::default();
        config.feed.timezone = "Mars/Olympus_Mons".to_owned();
        assert!(matches!(
            config.validate(),
            Err(SchedulingError::InvalidValue {
                field: "feed.timezone",
                ..
            })
        ));

        let mut config = Config::default();
        config.feed.fetch_timeout = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.feed.retry_backoff_base = -1.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.feed.retry_max = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.feed.cache_ttl = -60;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_durations() {
        let mut config = Config::default();
        config.feed.cache_ttl = i64::MAX;
        assert!(matches!(
            config.validate(),
            Err(SchedulingError::InvalidValue {
                field: "feed.cache_ttl",
                ..
            })
        ));

        let mut config = Config::default();
        config.feed.refresh_interval = i64::MAX;
        assert!(matches!(
            config.validate(),
            Err(SchedulingError::InvalidValue {
                field: "feed.refresh_interval",
                ..
            })
        ));

        let mut config = Config::default();
        config.feed.retry_backoff_base = 1e300;
        assert!(matches!(
            config.validate(),
            Err(SchedulingError::InvalidValue {
                field: "feed.retry_backoff_base",
                ..
            })
        ));
    }

    #[test]
    fn test_cache_ttl_saturates_out_of_range_values() {
        let mut config = Config::default();
        config.feed.cache_ttl = i64::MAX;
        assert_eq!(config.feed.cache_ttl(), chrono::Duration::MAX);
    }

    #[test]
    fn test_validate_rejects_bad_alert_values() {
        let mut config = Config::default();
        config.alerts.offsets = vec![];
        assert!(matches!(
            config.validate(),
            Err(SchedulingError::InvalidValue { .. })
        ));

        let mut config = Config::default();
        config.alerts.offsets = vec![15, 0];
        assert_eq!(config.validate(), Err(SchedulingError::InvalidOffset(0)));

        let mut config = Config::default();
        config.alerts.snooze_default_minutes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(
            config.alerts.settings().unwrap(),
            AlertSettings::default()
        );
    }
}
