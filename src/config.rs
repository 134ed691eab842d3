//! Handler configuration

use crate::{BackoffPolicy, ConfigError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Enables debounced stabilization checks (`true`/`false`/`1`/`0`)
pub const ENV_PROBING_ENABLED: &str = "RECONCILE_PROBING_ENABLED";
/// Whole seconds between re-invocations
pub const ENV_BACKOFF_DELAY_SECONDS: &str = "RECONCILE_BACKOFF_DELAY_SECONDS";
/// Whole seconds an operation may stay in progress
pub const ENV_BACKOFF_TIMEOUT_SECONDS: &str = "RECONCILE_BACKOFF_TIMEOUT_SECONDS";

/// Options consumed by the engine
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlerConfig {
    /// Debounce stabilization checks instead of trusting a single read
    pub probing_enabled: bool,
    /// Re-invocation cadence and abandonment bound
    pub backoff: BackoffPolicy,
}

impl HandlerConfig {
    /// Parse a JSON document; missing fields keep their defaults
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read overrides from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read overrides through `lookup`; unset keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let probing_enabled = match lookup(ENV_PROBING_ENABLED) {
            Some(value) => parse_bool(ENV_PROBING_ENABLED, &value)?,
            None => defaults.probing_enabled,
        };
        let delay = match lookup(ENV_BACKOFF_DELAY_SECONDS) {
            Some(value) => Duration::from_secs(parse_seconds(ENV_BACKOFF_DELAY_SECONDS, &value)?),
            None => defaults.backoff.delay(),
        };
        let timeout = match lookup(ENV_BACKOFF_TIMEOUT_SECONDS) {
            Some(value) => Duration::from_secs(parse_seconds(ENV_BACKOFF_TIMEOUT_SECONDS, &value)?),
            None => defaults.backoff.timeout(),
        };

        Ok(Self {
            probing_enabled,
            backoff: BackoffPolicy::new(delay, timeout)?,
        })
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

fn parse_seconds(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.into(),
        value: value.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = HandlerConfig::from_lookup(lookup(&[])).unwrap();
        assert!(!config.probing_enabled);
        assert_eq!(config.backoff, BackoffPolicy::default());
    }

    #[test]
    fn test_env_overrides() {
        let config = HandlerConfig::from_lookup(lookup(&[
            (ENV_PROBING_ENABLED, "true"),
            (ENV_BACKOFF_DELAY_SECONDS, "15"),
            (ENV_BACKOFF_TIMEOUT_SECONDS, "900"),
        ]))
        .unwrap();
        assert!(config.probing_enabled);
        assert_eq!(config.backoff.delay_seconds(), 15);
        assert_eq!(config.backoff.timeout(), Duration::from_secs(900));
    }

    #[test]
    fn test_env_rejects_garbage() {
        let err =
            HandlerConfig::from_lookup(lookup(&[(ENV_PROBING_ENABLED, "maybe")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let err = HandlerConfig::from_lookup(lookup(&[(ENV_BACKOFF_TIMEOUT_SECONDS, "1")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::TimeoutShorterThanDelay { .. }));
    }

    #[test]
    fn test_json_partial() {
        let config = HandlerConfig::from_json(r#"{"probing_enabled": true}"#).unwrap();
        assert!(config.probing_enabled);
        assert_eq!(config.backoff, BackoffPolicy::default());

        assert!(HandlerConfig::from_json("{").is_err());
    }
}
