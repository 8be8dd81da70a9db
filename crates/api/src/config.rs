//! Process configuration, read once from the environment at startup.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} must be set when USE_PERSISTENT_STORES=true")]
    Missing(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    /// Postgres store + Redis bus/channel instead of in-memory ones.
    pub use_persistent_stores: bool,
    pub database_url: Option<String>,
    pub redis_url: String,
    /// Topic customers subscribe to and notifications are published on.
    pub notify_topic: String,
    /// Dispatcher skips recipients without an active subscription.
    pub require_subscription: bool,
    /// Worker retry budget for retryable dispatch failures.
    pub notify_max_attempts: u32,
    /// Run the supplier simulator on this interval.
    pub simulator_interval: Option<Duration>,
    /// Insert the bakery catalog at zero stock when starting in memory.
    pub seed_catalog: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            use_persistent_stores: false,
            database_url: None,
            redis_url: "redis://localhost:6379".to_string(),
            notify_topic: "item-available".to_string(),
            require_subscription: false,
            notify_max_attempts: 5,
            simulator_interval: None,
            seed_catalog: true,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value source; unset keys fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let bind_addr = parse_or("BIND_ADDR", &lookup, defaults.bind_addr)?;
        let use_persistent_stores =
            parse_bool_or("USE_PERSISTENT_STORES", &lookup, defaults.use_persistent_stores)?;
        let database_url = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty());
        if use_persistent_stores && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let simulator_interval = match lookup("SIMULATOR_INTERVAL_SECS") {
            None => None,
            Some(raw) => {
                let secs: u64 = parse_value("SIMULATOR_INTERVAL_SECS", &raw)?;
                if secs == 0 {
                    return Err(invalid("SIMULATOR_INTERVAL_SECS", &raw, "must be at least 1"));
                }
                Some(Duration::from_secs(secs))
            }
        };

        Ok(Self {
            bind_addr,
            use_persistent_stores,
            database_url,
            redis_url: lookup("REDIS_URL").unwrap_or(defaults.redis_url),
            notify_topic: lookup("NOTIFY_TOPIC").unwrap_or(defaults.notify_topic),
            require_subscription: parse_bool_or(
                "REQUIRE_SUBSCRIPTION",
                &lookup,
                defaults.require_subscription,
            )?,
            notify_max_attempts: parse_or("NOTIFY_MAX_ATTEMPTS", &lookup, defaults.notify_max_attempts)?,
            simulator_interval,
            seed_catalog: parse_bool_or("SEED_CATALOG", &lookup, defaults.seed_catalog)?,
        })
    }
}

fn invalid(key: &'static str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_value<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e| invalid(key, raw, e))
}

fn parse_or<T>(
    key: &'static str,
    lookup: &impl Fn(&str) -> Option<String>,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_bool_or(
    key: &'static str,
    lookup: &impl Fn(&str) -> Option<String>,
    default: bool,
) -> Result<bool, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(invalid(key, &raw, "expected true or false")),
        },
    }
}
