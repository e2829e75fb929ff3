use std::{env, fmt::Display, str::FromStr, time::Duration};

use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
#[error("Invalid {key} value {value:?}: {reason}")]
pub struct ConfigError {
    key: &'static str,
    value: String,
    reason: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub redis_url: String,
    pub db_retry_interval: Duration,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            port: try_load(&lookup, "PORT", "5000")?,
            redis_url: try_load(&lookup, "REDIS_URL", "redis://127.0.0.1:6379")?,
            db_retry_interval: Duration::from_secs(try_load(&lookup, "DB_RETRY_SECS", "5")?),
        })
    }
}

fn try_load<T, F>(lookup: &F, key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    value.trim().parse().map_err(|e: T::Err| {
        warn!("Invalid {key} value: {e}");
        ConfigError {
            key,
            value: value.clone(),
            reason: e.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();

        assert_eq!(config.port, 5000);
        assert_eq!(config.redis_url, "redis://127.0.0.1:6379");
        assert_eq!(config.db_retry_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("PORT", "8080"),
            ("REDIS_URL", "redis://cache:6379/2"),
            ("DB_RETRY_SECS", " 12 "),
        ])
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.redis_url, "redis://cache:6379/2");
        assert_eq!(config.db_retry_interval, Duration::from_secs(12));
    }

    #[test]
    fn test_invalid_port() {
        let err = load(&[("PORT", "eighty")]).unwrap_err();

        assert!(err.to_string().contains("PORT"));
    }
}
