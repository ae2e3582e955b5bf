//! Configuration management for the simulator services.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Both binaries read the same [`Config`]; each uses the sections it needs.

use parking_sim_redis::RedisSettings;
use parking_sim_runtime::generator::{DEFAULT_EXIT_BIAS, GeneratorMode};
use parking_sim_runtime::retry::RetryPolicy;
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Invalid configuration value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `GENERATOR_MODE` is neither `entry` nor `exit`.
    #[error("GENERATOR_MODE must be \"entry\" or \"exit\", got {0:?}")]
    UnknownMode(String),

    /// `EXIT_BIAS` is outside `[0, 1]`.
    #[error("EXIT_BIAS must lie in [0, 1], got {0}")]
    ExitBiasOutOfRange(String),

    /// `METRICS_ADDR` is not a socket address.
    #[error("METRICS_ADDR {0:?} is not a valid socket address")]
    MetricsAddr(String),

    /// `SUMMARY_API_URL` is empty.
    #[error("SUMMARY_API_URL must not be empty")]
    EmptyCollectorUrl,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Broker and topic configuration
    pub redpanda: RedpandaConfig,
    /// Redis connection (password redacted in `Debug`)
    pub redis: RedisSettings,
    /// Generator behaviour
    pub generator: GeneratorConfig,
    /// Summary collector endpoint
    pub collector: CollectorConfig,
    /// Logging and metrics
    pub server: ServerConfig,
    /// Startup connection retries
    pub bootstrap: BootstrapConfig,
}

/// RedPanda/Kafka configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedpandaConfig {
    /// Broker addresses (comma-separated)
    pub brokers: String,
    /// Topic for entry events
    pub entry_topic: String,
    /// Topic for exit events
    pub exit_topic: String,
    /// Consumer group prefix for the record keeper
    pub consumer_group: String,
    /// Where a new consumer group starts reading
    pub auto_offset_reset: String,
}

/// Generator configuration
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorConfig {
    /// Raw `GENERATOR_MODE` value; see [`GeneratorConfig::mode`]
    pub mode: String,
    /// Probability that an exit targets a parked vehicle
    pub exit_bias: f64,
    /// Upper bound (exclusive) of the pause between iterations, in seconds
    pub max_sleep_secs: u64,
}

/// Summary collector configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorConfig {
    /// Endpoint summaries are POSTed to
    pub url: String,
    /// Request timeout; `None` waits indefinitely
    pub timeout_secs: Option<u64>,
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Fallback log filter when `RUST_LOG` is unset
    pub log_level: String,
    /// Prometheus listener address
    pub metrics_addr: String,
}

/// Connection bootstrap configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapConfig {
    /// Total connection attempts per dependency
    pub max_attempts: usize,
    /// Delay after the first failed attempt, in milliseconds
    pub initial_delay_ms: u64,
    /// Cap on the delay between attempts, in milliseconds
    pub max_delay_ms: u64,
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key).and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}

fn string_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    lookup(key).unwrap_or_else(|| default.to_string())
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unparsable numbers fall back to their defaults; call
    /// [`Config::validate`] before using the result.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            redpanda: RedpandaConfig {
                brokers: string_or(&lookup, "REDPANDA_BROKERS", "localhost:9092"),
                entry_topic: string_or(&lookup, "ENTRY_QUEUE_NAME", "entry_events_queue"),
                exit_topic: string_or(&lookup, "EXIT_QUEUE_NAME", "exit_events_queue"),
                consumer_group: string_or(&lookup, "CONSUMER_GROUP", "parking-record-keeper"),
                auto_offset_reset: string_or(&lookup, "REDPANDA_AUTO_OFFSET_RESET", "earliest"),
            },
            redis: RedisSettings::new(string_or(&lookup, "REDIS_ADDR", "localhost:6379"))
                .password(string_or(&lookup, "REDIS_PASSWORD", ""))
                .db(parse_or(&lookup, "REDIS_DB", 0)),
            generator: GeneratorConfig {
                mode: string_or(&lookup, "GENERATOR_MODE", "entry"),
                exit_bias: parse_or(&lookup, "EXIT_BIAS", DEFAULT_EXIT_BIAS),
                max_sleep_secs: parse_or(&lookup, "MAX_SLEEP_SECS", 5),
            },
            collector: CollectorConfig {
                url: string_or(&lookup, "SUMMARY_API_URL", "http://localhost:8000/parkinglog"),
                timeout_secs: lookup("SUMMARY_API_TIMEOUT_SECS").and_then(|s| s.trim().parse().ok()),
            },
            server: ServerConfig {
                log_level: string_or(&lookup, "LOG_LEVEL", "info"),
                metrics_addr: string_or(&lookup, "METRICS_ADDR", "0.0.0.0:2112"),
            },
            bootstrap: BootstrapConfig {
                max_attempts: parse_or(&lookup, "BOOTSTRAP_MAX_ATTEMPTS", 5),
                initial_delay_ms: parse_or(&lookup, "BOOTSTRAP_INITIAL_DELAY_MS", 2000),
                max_delay_ms: parse_or(&lookup, "BOOTSTRAP_MAX_DELAY_MS", 30_000),
            },
        }
    }

    /// Check values that have no sensible fallback.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.generator.mode()?;
        if !(0.0..=1.0).contains(&self.generator.exit_bias) {
            return Err(ConfigError::ExitBiasOutOfRange(self.generator.exit_bias.to_string()));
        }
        self.server.metrics_addr()?;
        if self.collector.url.trim().is_empty() {
            return Err(ConfigError::EmptyCollectorUrl);
        }
        Ok(())
    }

    /// Log the effective configuration. The Redis password is never logged.
    pub fn log(&self) {
        tracing::info!(
            redpanda_brokers = %self.redpanda.brokers,
            entry_topic = %self.redpanda.entry_topic,
            exit_topic = %self.redpanda.exit_topic,
            consumer_group = %self.redpanda.consumer_group,
            redis = ?self.redis,
            generator_mode = %self.generator.mode,
            exit_bias = self.generator.exit_bias,
            max_sleep_secs = self.generator.max_sleep_secs,
            summary_api_url = %self.collector.url,
            summary_api_timeout_secs = ?self.collector.timeout_secs,
            metrics_addr = %self.server.metrics_addr,
            "Configuration loaded"
        );
    }
}

impl GeneratorConfig {
    /// Parsed generator mode.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownMode`] for anything but `entry`/`exit`.
    pub fn mode(&self) -> Result<GeneratorMode, ConfigError> {
        self.mode
            .parse()
            .map_err(|_| ConfigError::UnknownMode(self.mode.clone()))
    }
}

impl CollectorConfig {
    /// Request timeout, if configured.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl ServerConfig {
    /// Parsed metrics listener address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MetricsAddr`] if the value does not parse.
    pub fn metrics_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.metrics_addr
            .parse()
            .map_err(|_| ConfigError::MetricsAddr(self.metrics_addr.clone()))
    }
}

impl BootstrapConfig {
    /// Retry policy for connecting to Redpanda and Redis.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_attempts(self.max_attempts)
            .initial_delay(Duration::from_millis(self.initial_delay_ms))
            .max_delay(Duration::from_millis(self.max_delay_ms))
            .build()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = config(&[]);
        assert_eq!(config.redpanda.brokers, "localhost:9092");
        assert_eq!(config.redpanda.entry_topic, "entry_events_queue");
        assert_eq!(config.redpanda.exit_topic, "exit_events_queue");
        assert_eq!(config.redpanda.consumer_group, "parking-record-keeper");
        assert_eq!(config.redis.url(), "redis://localhost:6379/0");
        assert_eq!(config.generator.mode().unwrap(), GeneratorMode::Entry);
        assert!((config.generator.exit_bias - 0.8).abs() < f64::EPSILON);
        assert_eq!(config.generator.max_sleep_secs, 5);
        assert_eq!(config.collector.url, "http://localhost:8000/parkinglog");
        assert_eq!(config.collector.timeout(), None);
        assert_eq!(config.server.log_level, "info");
        assert_eq!(
            config.server.metrics_addr().unwrap(),
            "0.0.0.0:2112".parse::<SocketAddr>().unwrap()
        );

        let policy = config.bootstrap.retry_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_delay, Duration::from_secs(2));
        assert_eq!(policy.max_delay, Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn overrides() {
        let config = config(&[
            ("REDPANDA_BROKERS", "broker-1:9092,broker-2:9092"),
            ("REDIS_ADDR", "redis:6379"),
            ("REDIS_PASSWORD", "hunter2"),
            ("REDIS_DB", "3"),
            ("GENERATOR_MODE", "Exit"),
            ("EXIT_BIAS", "0.25"),
            ("MAX_SLEEP_SECS", "0"),
            ("SUMMARY_API_TIMEOUT_SECS", "10"),
        ]);
        assert_eq!(config.redpanda.brokers, "broker-1:9092,broker-2:9092");
        assert_eq!(config.redis.url(), "redis://:hunter2@redis:6379/3");
        assert_eq!(config.generator.mode().unwrap(), GeneratorMode::Exit);
        assert!((config.generator.exit_bias - 0.25).abs() < f64::EPSILON);
        assert_eq!(config.generator.max_sleep_secs, 0);
        assert_eq!(config.collector.timeout(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn unparsable_numbers_fall_back() {
        let config = config(&[("REDIS_DB", "two"), ("MAX_SLEEP_SECS", "-1")]);
        assert_eq!(config.redis.db, 0);
        assert_eq!(config.generator.max_sleep_secs, 5);
    }

    #[test]
    fn validation_errors() {
        assert_eq!(
            config(&[("GENERATOR_MODE", "both")]).validate(),
            Err(ConfigError::UnknownMode("both".to_string()))
        );
        assert!(matches!(
            config(&[("EXIT_BIAS", "1.5")]).validate(),
            Err(ConfigError::ExitBiasOutOfRange(_))
        ));
        assert!(matches!(
            config(&[("EXIT_BIAS", "NaN")]).validate(),
            Err(ConfigError::ExitBiasOutOfRange(_))
        ));
        assert!(matches!(
            config(&[("METRICS_ADDR", ":2112")]).validate(),
            Err(ConfigError::MetricsAddr(_))
        ));
        assert_eq!(
            config(&[("SUMMARY_API_URL", " ")]).validate(),
            Err(ConfigError::EmptyCollectorUrl)
        );
    }

    #[test]
    fn debug_output_hides_redis_password() {
        let config = config(&[("REDIS_PASSWORD", "hunter2")]);
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
