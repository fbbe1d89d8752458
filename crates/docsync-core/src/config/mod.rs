//! Sync engine settings.
//!
//! Defaults match the engine's documented behavior; every value can be
//! overridden through `DOCSYNC_*` environment variables.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Which trigger sources may schedule sync work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct TriggerToggles {
    pub periodic: bool,
    pub user_activity: bool,
    pub network_reconnect: bool,
    pub visibility: bool,
    pub document_change: bool,
}

impl Default for TriggerToggles {
    fn default() -> Self {
        Self {
            periodic: true,
            user_activity: true,
            network_reconnect: true,
            visibility: true,
            document_change: true,
        }
    }
}

/// Tunables for the queue, scheduler and status aggregator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Period of the background reconciliation pass
    pub sync_interval: Duration,
    /// Inactivity after which the user counts as idle
    pub user_activity_threshold: Duration,
    /// Delay between user input and the sync it schedules
    pub activity_debounce: Duration,
    /// Delay between a document change signal and its upload
    pub change_debounce: Duration,
    /// Total attempts per operation, including the first
    pub max_retries: u32,
    /// Base backoff delay, doubled for every further retry
    pub retry_delay: Duration,
    /// Change signals flushed per batch pass
    pub max_batch_size: usize,
    /// Upper bound for a single remote call
    pub request_timeout: Duration,
    /// Capacity of the status event ring buffer
    pub event_history_capacity: usize,
    pub auto_resolve_conflicts: bool,
    /// Only sync while the user is active
    pub require_user_activity: bool,
    pub triggers: TriggerToggles,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(5 * 60),
            user_activity_threshold: Duration::from_secs(30),
            activity_debounce: Duration::from_secs(1),
            change_debounce: Duration::from_millis(500),
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
            max_batch_size: 10,
            request_timeout: Duration::from_secs(30),
            event_history_capacity: 100,
            auto_resolve_conflicts: true,
            require_user_activity: false,
            triggers: TriggerToggles::default(),
        }
    }
}

impl SyncSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let settings = Self {
            sync_interval: duration_secs(&lookup, "DOCSYNC_SYNC_INTERVAL_SECS", defaults.sync_interval)?,
            user_activity_threshold: duration_secs(
                &lookup,
                "DOCSYNC_USER_ACTIVITY_THRESHOLD_SECS",
                defaults.user_activity_threshold,
            )?,
            activity_debounce: duration_millis(
                &lookup,
                "DOCSYNC_ACTIVITY_DEBOUNCE_MS",
                defaults.activity_debounce,
            )?,
            change_debounce: duration_millis(
                &lookup,
                "DOCSYNC_CHANGE_DEBOUNCE_MS",
                defaults.change_debounce,
            )?,
            max_retries: parsed(&lookup, "DOCSYNC_MAX_RETRIES", defaults.max_retries)?,
            retry_delay: duration_millis(&lookup, "DOCSYNC_RETRY_DELAY_MS", defaults.retry_delay)?,
            max_batch_size: parsed(&lookup, "DOCSYNC_MAX_BATCH_SIZE", defaults.max_batch_size)?,
            request_timeout: duration_secs(
                &lookup,
                "DOCSYNC_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout,
            )?,
            event_history_capacity: parsed(
                &lookup,
                "DOCSYNC_EVENT_HISTORY",
                defaults.event_history_capacity,
            )?,
            auto_resolve_conflicts: flag(
                &lookup,
                "DOCSYNC_AUTO_RESOLVE",
                defaults.auto_resolve_conflicts,
            )?,
            require_user_activity: flag(
                &lookup,
                "DOCSYNC_REQUIRE_ACTIVITY",
                defaults.require_user_activity,
            )?,
            triggers: TriggerToggles {
                periodic: flag(&lookup, "DOCSYNC_TRIGGER_PERIODIC", true)?,
                user_activity: flag(&lookup, "DOCSYNC_TRIGGER_ACTIVITY", true)?,
                network_reconnect: flag(&lookup, "DOCSYNC_TRIGGER_RECONNECT", true)?,
                visibility: flag(&lookup, "DOCSYNC_TRIGGER_VISIBILITY", true)?,
                document_change: flag(&lookup, "DOCSYNC_TRIGGER_DOCUMENT_CHANGE", true)?,
            },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "sync interval must be greater than zero".to_string(),
            ));
        }
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid(
                "max retries must allow at least one attempt".to_string(),
            ));
        }
        if self.max_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "max batch size must be greater than zero".to_string(),
            ));
        }
        if self.event_history_capacity == 0 {
            return Err(ConfigError::Invalid(
                "event history capacity must be greater than zero".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "request timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Backoff before retry number `retry_count` (1-based): `retry_delay * 2^(n-1)`
    pub fn backoff_delay(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.saturating_sub(1).min(16);
        self.retry_delay.saturating_mul(1 << exponent)
    }
}

fn lookup_trimmed(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    crate::util::normalize_text_option(lookup(name))
}

fn parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup_trimmed(lookup, name) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        None => Ok(default),
    }
}

fn duration_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    parsed(lookup, name, default.as_secs()).map(Duration::from_secs)
}

fn duration_millis(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    parsed(lookup, name, default_ms).map(Duration::from_millis)
}

fn flag(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    let Some(value) = lookup_trimmed(lookup, name) else {
        return Ok(default);
    };
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue { name, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        move |name| values.get(name).cloned()
    }

    #[test]
    fn defaults_apply_without_overrides() {
        let settings = SyncSettings::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(settings, SyncSettings::default());
        assert_eq!(settings.sync_interval, Duration::from_secs(300));
        assert_eq!(settings.max_retries, 3);
        assert_eq!(settings.max_batch_size, 10);
    }

    #[test]
    fn overrides_are_parsed() {
        let settings = SyncSettings::from_lookup(lookup_from(&[
            ("DOCSYNC_SYNC_INTERVAL_SECS", "60"),
            ("DOCSYNC_RETRY_DELAY_MS", " 250 "),
            ("DOCSYNC_TRIGGER_VISIBILITY", "off"),
            ("DOCSYNC_REQUIRE_ACTIVITY", "yes"),
        ]))
        .unwrap();
        assert_eq!(settings.sync_interval, Duration::from_secs(60));
        assert_eq!(settings.retry_delay, Duration::from_millis(250));
        assert!(!settings.triggers.visibility);
        assert!(settings.require_user_activity);
    }

    #[test]
    fn invalid_values_are_reported_by_name() {
        let error =
            SyncSettings::from_lookup(lookup_from(&[("DOCSYNC_MAX_RETRIES", "three")])).unwrap_err();
        assert_eq!(
            error,
            ConfigError::InvalidValue {
                name: "DOCSYNC_MAX_RETRIES",
                value: "three".to_string()
            }
        );
    }

    #[test]
    fn validate_rejects_zero_limits() {
        let error = SyncSettings::from_lookup(lookup_from(&[("DOCSYNC_MAX_BATCH_SIZE", "0")]))
            .unwrap_err();
        assert!(error.to_string().contains("batch size"));
    }

    #[test]
    fn backoff_doubles_from_base_delay() {
        let settings = SyncSettings::default();
        assert_eq!(settings.backoff_delay(1), Duration::from_secs(5));
        assert_eq!(settings.backoff_delay(2), Duration::from_secs(10));
        assert_eq!(settings.backoff_delay(3), Duration::from_secs(20));
    }
}
