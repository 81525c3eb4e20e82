use std::env;
use std::time::Duration;

use url::Url;

use crate::delivery::DeliveryPolicy;
use crate::error::ConfigError;

pub const ENV_API_BASE_URL: &str = "KWAVE_API_BASE_URL";
pub const ENV_API_TIMEOUT_SECS: &str = "KWAVE_API_TIMEOUT_SECS";
pub const ENV_DELIVERY_MAX_ATTEMPTS: &str = "KWAVE_DELIVERY_MAX_ATTEMPTS";
pub const ENV_DELIVERY_BACKOFF_SECS: &str = "KWAVE_DELIVERY_BACKOFF_SECS";
pub const ENV_SHUFFLE_PRACTICE: &str = "KWAVE_SHUFFLE_PRACTICE";

const DEFAULT_API_TIMEOUT_SECS: u64 = 15;

/// Runtime settings for the services layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Backend base URL. `None` runs offline: content comes from storage and results stay queued.
    pub api_base_url: Option<Url>,
    pub api_timeout: Duration,
    pub delivery: DeliveryPolicy,
    pub shuffle_practice: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_base_url: None,
            api_timeout: Duration::from_secs(DEFAULT_API_TIMEOUT_SECS),
            delivery: DeliveryPolicy::default(),
            shuffle_practice: true,
        }
    }
}

impl ServiceConfig {
    /// Read settings from `KWAVE_*` environment variables. Unset or blank values keep defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when a variable is set to something unparsable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`ServiceConfig::from_env`] with an injectable lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when a value is set to something unparsable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| normalize_optional(lookup(key));
        let defaults = Self::default();

        let api_base_url = get(ENV_API_BASE_URL)
            .map(|raw| {
                Url::parse(&raw).map_err(|_| ConfigError::InvalidUrl {
                    key: ENV_API_BASE_URL,
                    raw,
                })
            })
            .transpose()?;

        let api_timeout = match get(ENV_API_TIMEOUT_SECS) {
            Some(raw) => Duration::from_secs(parse_positive(ENV_API_TIMEOUT_SECS, raw)?.into()),
            None => defaults.api_timeout,
        };

        let max_attempts = match get(ENV_DELIVERY_MAX_ATTEMPTS) {
            Some(raw) => parse_positive(ENV_DELIVERY_MAX_ATTEMPTS, raw)?,
            None => defaults.delivery.max_attempts,
        };
        let base_backoff_secs = match get(ENV_DELIVERY_BACKOFF_SECS) {
            Some(raw) => parse_positive(ENV_DELIVERY_BACKOFF_SECS, raw)?,
            None => defaults.delivery.base_backoff_secs,
        };

        let shuffle_practice = match get(ENV_SHUFFLE_PRACTICE) {
            Some(raw) => parse_bool(ENV_SHUFFLE_PRACTICE, raw)?,
            None => defaults.shuffle_practice,
        };

        Ok(Self {
            api_base_url,
            api_timeout,
            delivery: DeliveryPolicy {
                max_attempts,
                base_backoff_secs,
            },
            shuffle_practice,
        })
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.api_base_url.is_some()
    }
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn parse_positive(key: &'static str, raw: String) -> Result<u32, ConfigError> {
    match raw.parse::<u32>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(ConfigError::InvalidNumber { key, raw }),
    }
}

fn parse_bool(key: &'static str, raw: String) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool { key, raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = ServiceConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ServiceConfig::default());
        assert!(!config.is_online());
        assert_eq!(config.delivery.max_attempts, 8);
        assert_eq!(config.delivery.base_backoff_secs, 30);
    }

    #[test]
    fn reads_all_values() {
        let config = ServiceConfig::from_lookup(lookup(&[
            (ENV_API_BASE_URL, " https://api.kwave.test/v1 "),
            (ENV_API_TIMEOUT_SECS, "5"),
            (ENV_DELIVERY_MAX_ATTEMPTS, "3"),
            (ENV_DELIVERY_BACKOFF_SECS, "10"),
            (ENV_SHUFFLE_PRACTICE, "off"),
        ]))
        .unwrap();

        assert_eq!(
            config.api_base_url.as_ref().map(Url::as_str),
            Some("https://api.kwave.test/v1")
        );
        assert_eq!(config.api_timeout, Duration::from_secs(5));
        assert_eq!(config.delivery.max_attempts, 3);
        assert_eq!(config.delivery.base_backoff_secs, 10);
        assert!(!config.shuffle_practice);
    }

    #[test]
    fn blank_values_are_ignored() {
        let config = ServiceConfig::from_lookup(lookup(&[(ENV_API_BASE_URL, "   ")])).unwrap();
        assert!(config.api_base_url.is_none());
    }

    #[test]
    fn rejects_bad_values() {
        let err = ServiceConfig::from_lookup(lookup(&[(ENV_API_BASE_URL, "not a url")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl { .. }));

        let err = ServiceConfig::from_lookup(lookup(&[(ENV_DELIVERY_MAX_ATTEMPTS, "0")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidNumber {
                key: ENV_DELIVERY_MAX_ATTEMPTS,
                raw: "0".into()
            }
        );

        let err =
            ServiceConfig::from_lookup(lookup(&[(ENV_SHUFFLE_PRACTICE, "maybe")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBool { .. }));
    }
}
